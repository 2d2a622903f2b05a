//! Tool trait definition

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::flow::FlowError;
use crate::state::StateError;

use super::context::ToolContext;
use super::envelope::ToolEnvelope;

/// Errors from tool execution
///
/// Only genuinely broken calls end up here (bad input shape, unknown flow,
/// write conflict). Conditions the caller corrects by re-prompting come back
/// inside the envelope instead.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Tool metadata handed to the transport layer
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A protocol operation exposed by the dispatcher
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the wire tool_use name)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolEnvelope, ToolError>;
}

/// Deserialize a tool's input payload
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}
