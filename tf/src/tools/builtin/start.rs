//! start_thinking - create a session and serve its first step

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::domain::SessionState;
use crate::flow::NextDirective;
use crate::tools::context::ToolContext;
use crate::tools::envelope::ToolEnvelope;
use crate::tools::traits::{Tool, ToolError, parse_input};

/// Begin a structured thinking session
pub struct StartThinkingTool;

#[derive(Debug, Deserialize)]
struct StartInput {
    topic: String,
    #[serde(default = "default_flow_type")]
    flow_type: String,
}

fn default_flow_type() -> String {
    "comprehensive_analysis".to_string()
}

#[async_trait]
impl Tool for StartThinkingTool {
    fn name(&self) -> &'static str {
        "start_thinking"
    }

    fn description(&self) -> &'static str {
        "Begin a structured thinking session on a topic. Returns the first step's prompt."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "The topic or question to think through"
                },
                "flow_type": {
                    "type": "string",
                    "description": "Flow definition to run (default: comprehensive_analysis)"
                }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolEnvelope, ToolError> {
        let input: StartInput = parse_input(input)?;
        debug!(topic = %input.topic, flow_type = %input.flow_type, "StartThinkingTool::execute: called");

        if input.topic.trim().is_empty() {
            return Err(ToolError::InvalidInput("topic must not be empty".to_string()));
        }

        let flow = ctx.registry.get(&input.flow_type)?;
        let first = ctx.resolver.initial_step(flow)?;

        let session = SessionState::new(input.topic, &flow.flow_type, &first.step_id);
        ctx.store.create(&session)?;
        info!(session_id = %session.session_id, flow_type = %flow.flow_type, "Started thinking session");

        let directive = NextDirective::Advance {
            next_step_id: first.step_id.clone(),
        };
        Ok(ctx.envelope_for_directive(self.name(), flow, &session, &directive))
    }
}
