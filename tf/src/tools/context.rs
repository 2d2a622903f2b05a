//! ToolContext - shared collaborators for tool execution
//!
//! Holds the flow registry, the session store, the renderer, and the
//! resolver, plus the envelope construction shared by every tool. Tools
//! stay thin: parse input, call the resolver, hand the directive here.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{COMPLETED_STEP, SessionState};
use crate::flow::{FlowDefinition, FlowRegistry, NextDirective, StepResolver, completed_step_count, flow_progress};
use crate::prompts::{RenderError, Renderer};
use crate::state::SessionStore;

use super::envelope::{EnvelopeMetadata, NextAction, ToolEnvelope};

/// Shared state handed to every tool execution
pub struct ToolContext {
    pub registry: Arc<FlowRegistry>,
    pub store: Arc<dyn SessionStore>,
    pub renderer: Arc<dyn Renderer>,
    pub resolver: StepResolver,
}

impl ToolContext {
    pub fn new(
        registry: Arc<FlowRegistry>,
        store: Arc<dyn SessionStore>,
        renderer: Arc<dyn Renderer>,
        resolver: StepResolver,
    ) -> Self {
        debug!("ToolContext::new: called");
        Self {
            registry,
            store,
            renderer,
            resolver,
        }
    }

    /// Render a template, substituting a minimal instruction when the
    /// renderer cannot serve it
    ///
    /// A missing template is a deployment gap, not a workflow failure; the
    /// conversation keeps moving either way.
    pub fn render_or_fallback(&self, template_ref: &str, params: &HashMap<String, String>) -> String {
        match self.renderer.render(template_ref, params) {
            Ok(text) => text,
            Err(RenderError::NotFound(name)) => {
                warn!(template = %name, "render_or_fallback: template not found, using fallback");
                fallback_instruction(params)
            }
            Err(e) => {
                warn!(error = %e, "render_or_fallback: render failed, using fallback");
                fallback_instruction(params)
            }
        }
    }

    /// Envelope for a session id the store does not know
    pub fn recovery_envelope(&self, tool_name: &str, session_id: &str) -> ToolEnvelope {
        debug!(%tool_name, %session_id, "ToolContext::recovery_envelope: called");
        let params = HashMap::from([("session_id".to_string(), session_id.to_string())]);
        ToolEnvelope {
            tool_name: tool_name.to_string(),
            session_id: session_id.to_string(),
            step: "session_recovery".to_string(),
            prompt_template: "session_recovery".to_string(),
            prompt_text: self.render_or_fallback("session_recovery", &params),
            instructions: "Call start_thinking with your topic to begin a fresh session.".to_string(),
            context: params,
            next_action: NextAction::RestartRequired,
            metadata: EnvelopeMetadata {
                step_number: 0,
                flow_progress: "0/0".to_string(),
                quality_gate_passed: true,
            },
        }
    }

    /// Build the envelope for a resolved directive
    ///
    /// `session` must already reflect the applied mutation so progress
    /// metadata matches what the caller will see on the next read.
    pub fn envelope_for_directive(
        &self,
        tool_name: &str,
        flow: &FlowDefinition,
        session: &SessionState,
        directive: &NextDirective,
    ) -> ToolEnvelope {
        debug!(%tool_name, session_id = %session.session_id, ?directive, "ToolContext::envelope_for_directive: called");

        let mut params = HashMap::from([
            ("topic".to_string(), session.topic.clone()),
            ("flow_type".to_string(), session.flow_type.clone()),
        ]);

        let quality_gate_passed = !matches!(
            directive,
            NextDirective::Improve { .. } | NextDirective::FormatInvalid { .. }
        );

        let (step, template_ref, instructions, next_action) = match directive {
            NextDirective::Advance { next_step_id } => {
                let template_ref = flow
                    .step(next_step_id)
                    .map(|s| s.template_ref.clone())
                    .unwrap_or_else(|| next_step_id.clone());
                params.insert("step".to_string(), next_step_id.clone());
                (
                    next_step_id.clone(),
                    template_ref,
                    "Work through the prompt, then call advance_thinking with your result.".to_string(),
                    NextAction::ContinueThinking,
                )
            }

            NextDirective::Improve {
                step_id,
                score,
                feedback,
            } => {
                params.insert("step".to_string(), step_id.clone());
                params.insert("score".to_string(), format!("{score:.2}"));
                if let Some(feedback) = feedback {
                    params.insert("feedback".to_string(), feedback.clone());
                }
                (
                    step_id.clone(),
                    "improve".to_string(),
                    "Revise your result for this step, then call advance_thinking again.".to_string(),
                    NextAction::ImproveResult,
                )
            }

            NextDirective::FormatInvalid { step_id, reason } => {
                params.insert("step".to_string(), step_id.clone());
                params.insert("reason".to_string(), reason.clone());
                (
                    step_id.clone(),
                    "format_validation".to_string(),
                    "Resubmit the step result as valid structured data.".to_string(),
                    NextAction::FixFormat,
                )
            }

            NextDirective::FanOutNext {
                step_id,
                iteration_index,
                item,
            } => {
                let template_ref = flow
                    .step(step_id)
                    .map(|s| s.template_ref.clone())
                    .unwrap_or_else(|| step_id.clone());
                let total_items = session
                    .fan_out_cursor
                    .as_ref()
                    .filter(|c| &c.step_id == step_id)
                    .map(|c| c.items.len())
                    .unwrap_or(iteration_index + 1);
                params.insert("step".to_string(), step_id.clone());
                params.insert("item".to_string(), value_display(item));
                params.insert("iteration".to_string(), (iteration_index + 1).to_string());
                params.insert("total_items".to_string(), total_items.to_string());
                (
                    step_id.clone(),
                    template_ref,
                    "Answer for this item only, then call advance_thinking with the result.".to_string(),
                    NextAction::ContinueThinking,
                )
            }

            NextDirective::Complete => {
                params.insert(
                    "steps_completed".to_string(),
                    completed_step_count(flow, session).to_string(),
                );
                (
                    COMPLETED_STEP.to_string(),
                    "completion".to_string(),
                    "Present the final synthesis to the user.".to_string(),
                    NextAction::SessionComplete,
                )
            }

            NextDirective::SessionRecovery => {
                return self.recovery_envelope(tool_name, &session.session_id);
            }
        };

        let prompt_text = self.render_or_fallback(&template_ref, &params);
        ToolEnvelope {
            tool_name: tool_name.to_string(),
            session_id: session.session_id.clone(),
            step,
            prompt_template: template_ref,
            prompt_text,
            instructions,
            context: params,
            next_action,
            metadata: EnvelopeMetadata {
                step_number: session.step_number,
                flow_progress: flow_progress(flow, session),
                quality_gate_passed,
            },
        }
    }
}

/// Minimal instruction used when no template can be rendered
fn fallback_instruction(params: &HashMap<String, String>) -> String {
    let step = params.get("step").map(String::as_str).unwrap_or("the current step");
    match params.get("topic") {
        Some(topic) => format!(
            "Continue with step '{step}' on topic '{topic}'. Provide your best result and call advance_thinking."
        ),
        None => format!("Continue with step '{step}'. Provide your best result and call advance_thinking."),
    }
}

/// Render a fan-out item for prompt text
fn value_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptLoader;
    use crate::state::MemorySessionStore;

    fn context() -> ToolContext {
        ToolContext::new(
            Arc::new(FlowRegistry::builtin().unwrap()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(PromptLoader::embedded_only()),
            StepResolver::default(),
        )
    }

    #[test]
    fn test_advance_envelope() {
        let ctx = context();
        let flow = ctx.registry.get("quick_analysis").unwrap();
        let session = SessionState::with_id("s1", "why is the sky blue", "quick_analysis", "clarify");

        let envelope = ctx.envelope_for_directive(
            "start_thinking",
            flow,
            &session,
            &NextDirective::Advance {
                next_step_id: "clarify".into(),
            },
        );

        assert_eq!(envelope.step, "clarify");
        assert_eq!(envelope.prompt_template, "clarify");
        assert!(envelope.prompt_text.contains("why is the sky blue"));
        assert_eq!(envelope.next_action, NextAction::ContinueThinking);
        assert_eq!(envelope.metadata.flow_progress, "1/3");
        assert!(envelope.metadata.quality_gate_passed);
    }

    #[test]
    fn test_improve_envelope_carries_feedback() {
        let ctx = context();
        let flow = ctx.registry.get("quick_analysis").unwrap();
        let session = SessionState::with_id("s1", "t", "quick_analysis", "clarify");

        let envelope = ctx.envelope_for_directive(
            "advance_thinking",
            flow,
            &session,
            &NextDirective::Improve {
                step_id: "clarify".into(),
                score: 0.35,
                feedback: Some("name the ambiguity explicitly".into()),
            },
        );

        assert_eq!(envelope.next_action, NextAction::ImproveResult);
        assert!(!envelope.metadata.quality_gate_passed);
        assert!(envelope.prompt_text.contains("0.35"));
        assert!(envelope.prompt_text.contains("name the ambiguity explicitly"));
    }

    #[test]
    fn test_fallback_when_template_missing() {
        let ctx = context();
        let flow = ctx.registry.get("quick_analysis").unwrap();
        let session = SessionState::with_id("s1", "t", "quick_analysis", "clarify");

        let envelope = ctx.envelope_for_directive(
            "advance_thinking",
            flow,
            &session,
            &NextDirective::Advance {
                next_step_id: "no_such_step".into(),
            },
        );

        // Unknown step falls back to the step id as template, which the
        // renderer does not know; the call still returns usable text
        assert!(envelope.prompt_text.contains("no_such_step"));
        assert!(envelope.prompt_text.contains("advance_thinking"));
    }

    #[test]
    fn test_recovery_envelope() {
        let ctx = context();
        let envelope = ctx.recovery_envelope("advance_thinking", "ghost-id");
        assert_eq!(envelope.next_action, NextAction::RestartRequired);
        assert_eq!(envelope.step, "session_recovery");
        assert!(envelope.prompt_text.contains("ghost-id"));
    }
}
