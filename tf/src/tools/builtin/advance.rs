//! advance_thinking - record a step result and serve the next directive

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::flow::QualityFeedback;
use crate::tools::context::ToolContext;
use crate::tools::envelope::ToolEnvelope;
use crate::tools::traits::{Tool, ToolError, parse_input};

/// Record a step result and get the next prompt
pub struct AdvanceThinkingTool;

#[derive(Debug, Deserialize)]
struct AdvanceInput {
    session_id: String,
    step_result: Value,
    #[serde(default)]
    quality_feedback: Option<QualityFeedback>,
}

#[async_trait]
impl Tool for AdvanceThinkingTool {
    fn name(&self) -> &'static str {
        "advance_thinking"
    }

    fn description(&self) -> &'static str {
        "Record the result of the current step and receive the next thinking prompt."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session returned by start_thinking"
                },
                "step_result": {
                    "description": "Result produced for the current step (text or structured data)"
                },
                "quality_feedback": {
                    "type": "object",
                    "description": "Optional quality score in [0,1] plus free-text feedback",
                    "properties": {
                        "score": {"type": "number"},
                        "feedback": {"type": "string"}
                    },
                    "required": ["score"]
                }
            },
            "required": ["session_id", "step_result"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolEnvelope, ToolError> {
        let input: AdvanceInput = parse_input(input)?;
        debug!(session_id = %input.session_id, "AdvanceThinkingTool::execute: called");

        // A lost session is a client desync, not a workflow failure
        let Some(versioned) = ctx.store.get(&input.session_id)? else {
            return Ok(ctx.recovery_envelope(self.name(), &input.session_id));
        };

        let flow = ctx.registry.get(&versioned.state.flow_type)?;
        let resolution = ctx.resolver.resolve_advance(
            flow,
            &versioned.state,
            versioned.version,
            input.step_result,
            input.quality_feedback,
        )?;

        let state = if resolution.mutation.is_empty() {
            versioned.state
        } else {
            ctx.store.apply(&input.session_id, &resolution.mutation)?
        };

        Ok(ctx.envelope_for_directive(self.name(), flow, &state, &resolution.directive))
    }
}
