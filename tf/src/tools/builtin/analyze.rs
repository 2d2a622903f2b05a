//! analyze_result - re-derive the validation verdict for a step result
//!
//! Read-mostly: never advances flow position and never mutates the session.
//! A parseable result gets an `analyze_<step>` prompt; an unparseable one
//! gets `format_validation_<step>` so the caller can render format guidance.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::flow::{FlowError, flow_progress, validate_result};
use crate::tools::context::ToolContext;
use crate::tools::envelope::{EnvelopeMetadata, NextAction, ToolEnvelope};
use crate::tools::traits::{Tool, ToolError, parse_input};

/// Analyze a step result without advancing the session
pub struct AnalyzeResultTool;

#[derive(Debug, Deserialize)]
struct AnalyzeInput {
    session_id: String,
    step_name: String,
    step_result: Value,
    #[serde(default = "default_analysis_type")]
    analysis_type: String,
}

fn default_analysis_type() -> String {
    "general".to_string()
}

#[async_trait]
impl Tool for AnalyzeResultTool {
    fn name(&self) -> &'static str {
        "analyze_result"
    }

    fn description(&self) -> &'static str {
        "Analyze a step result (or its format) without advancing the session."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session returned by start_thinking"
                },
                "step_name": {
                    "type": "string",
                    "description": "Step the result belongs to"
                },
                "step_result": {
                    "description": "Result to analyze"
                },
                "analysis_type": {
                    "type": "string",
                    "description": "Lens for the analysis (default: general)"
                }
            },
            "required": ["session_id", "step_name", "step_result"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolEnvelope, ToolError> {
        let input: AnalyzeInput = parse_input(input)?;
        debug!(session_id = %input.session_id, step_name = %input.step_name, "AnalyzeResultTool::execute: called");

        let Some(versioned) = ctx.store.get(&input.session_id)? else {
            return Ok(ctx.recovery_envelope(self.name(), &input.session_id));
        };
        let session = versioned.state;

        let flow = ctx.registry.get(&session.flow_type)?;
        let step = flow.step(&input.step_name).ok_or_else(|| FlowError::UnknownStep {
            flow_type: flow.flow_type.clone(),
            step_id: input.step_name.clone(),
        })?;

        let mut params = HashMap::from([
            ("topic".to_string(), session.topic.clone()),
            ("flow_type".to_string(), session.flow_type.clone()),
            ("step".to_string(), step.step_id.clone()),
        ]);

        let (step_label, template_ref, instructions, next_action, gate_passed) =
            match validate_result(step, &input.step_result) {
                Ok(_) => {
                    params.insert("analysis_type".to_string(), input.analysis_type.clone());
                    (
                        format!("analyze_{}", step.step_id),
                        "analyze".to_string(),
                        "Analyze the result, then continue the flow with advance_thinking.".to_string(),
                        NextAction::ContinueThinking,
                        true,
                    )
                }
                Err(reason) => {
                    params.insert("reason".to_string(), reason);
                    (
                        format!("format_validation_{}", step.step_id),
                        "format_validation".to_string(),
                        "Resubmit the step result as valid structured data.".to_string(),
                        NextAction::FixFormat,
                        false,
                    )
                }
            };

        let prompt_text = ctx.render_or_fallback(&template_ref, &params);
        Ok(ToolEnvelope {
            tool_name: self.name().to_string(),
            session_id: session.session_id.clone(),
            step: step_label,
            prompt_template: template_ref,
            prompt_text,
            instructions,
            context: params,
            next_action,
            metadata: EnvelopeMetadata {
                step_number: session.step_number,
                flow_progress: flow_progress(flow, &session),
                quality_gate_passed: gate_passed,
            },
        })
    }
}
