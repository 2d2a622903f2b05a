//! ToolDispatcher - routes protocol operations to their tools

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::builtin::{AdvanceThinkingTool, AnalyzeResultTool, CompleteThinkingTool, StartThinkingTool};
use super::context::ToolContext;
use super::envelope::ToolEnvelope;
use super::traits::{Tool, ToolDefinition, ToolError};

/// Routes tool calls by name
pub struct ToolDispatcher {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolDispatcher {
    /// Dispatcher with the four protocol operations registered
    pub fn standard() -> Self {
        debug!("ToolDispatcher::standard: called");
        let mut dispatcher = Self::empty();
        dispatcher.add_tool(Box::new(StartThinkingTool));
        dispatcher.add_tool(Box::new(AdvanceThinkingTool));
        dispatcher.add_tool(Box::new(AnalyzeResultTool));
        dispatcher.add_tool(Box::new(CompleteThinkingTool));
        dispatcher
    }

    /// An empty dispatcher (tests)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolDispatcher::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool definitions for the transport layer
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Execute a tool call by name
    pub async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> Result<ToolEnvelope, ToolError> {
        debug!(tool_name = %name, "ToolDispatcher::execute: called");
        match self.tools.get(name) {
            Some(tool) => tool.execute(input, ctx).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::context;

    #[test]
    fn test_standard_dispatcher_has_protocol_tools() {
        let dispatcher = ToolDispatcher::standard();
        assert!(dispatcher.has_tool("start_thinking"));
        assert!(dispatcher.has_tool("advance_thinking"));
        assert!(dispatcher.has_tool("analyze_result"));
        assert!(dispatcher.has_tool("complete_thinking"));
        assert_eq!(dispatcher.tool_names().len(), 4);
    }

    #[test]
    fn test_definitions_are_complete() {
        let dispatcher = ToolDispatcher::standard();
        let definitions = dispatcher.definitions();
        assert_eq!(definitions.len(), 4);
        assert!(definitions.iter().all(|d| !d.description.is_empty()));
        assert!(definitions.iter().all(|d| d.input_schema.is_object()));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let dispatcher = ToolDispatcher::standard();
        let ctx = context();

        let err = dispatcher
            .execute("no_such_tool", serde_json::json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }
}
