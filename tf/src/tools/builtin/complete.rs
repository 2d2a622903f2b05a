//! complete_thinking - client-initiated completion
//!
//! Forces the Complete path regardless of dependency state. Useful when the
//! caller has what it needs and wants to wrap up early; `final_insights`
//! is recorded on the session when supplied.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::tools::context::ToolContext;
use crate::tools::envelope::ToolEnvelope;
use crate::tools::traits::{Tool, ToolError, parse_input};

/// Finish a thinking session
pub struct CompleteThinkingTool;

#[derive(Debug, Deserialize)]
struct CompleteInput {
    session_id: String,
    #[serde(default)]
    final_insights: Option<Value>,
}

#[async_trait]
impl Tool for CompleteThinkingTool {
    fn name(&self) -> &'static str {
        "complete_thinking"
    }

    fn description(&self) -> &'static str {
        "Mark a thinking session complete, optionally recording final insights."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session returned by start_thinking"
                },
                "final_insights": {
                    "description": "Closing insights to record on the session"
                }
            },
            "required": ["session_id"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolEnvelope, ToolError> {
        let input: CompleteInput = parse_input(input)?;
        debug!(session_id = %input.session_id, "CompleteThinkingTool::execute: called");

        let Some(versioned) = ctx.store.get(&input.session_id)? else {
            return Ok(ctx.recovery_envelope(self.name(), &input.session_id));
        };

        let flow = ctx.registry.get(&versioned.state.flow_type)?;
        let resolution = ctx
            .resolver
            .resolve_completion(&versioned.state, versioned.version, input.final_insights);

        let state = if resolution.mutation.is_empty() {
            versioned.state
        } else {
            ctx.store.apply(&input.session_id, &resolution.mutation)?
        };
        info!(session_id = %state.session_id, "Thinking session completed");

        Ok(ctx.envelope_for_directive(self.name(), flow, &state, &resolution.directive))
    }
}
