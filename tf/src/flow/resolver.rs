//! StepResolver - the next-step decision state machine
//!
//! Pure decision logic: given a session's persisted state, the result just
//! produced for its current step, and optional quality feedback, produce
//! exactly one `NextDirective` plus the `SessionMutation` that must persist
//! with it. The resolver never touches the store and never calls a model.
//!
//! Decision order: structural validation, record, quality gate, open fan-out
//! cursor, eligible-step selection, completion. Conditions the caller can
//! correct (bad format, low quality, lost session) come back as directives;
//! a broken flow definition comes back as a hard `FlowError`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::{COMPLETED_STEP, FanOutCursor, SessionState, SessionStatus};
use crate::state::SessionMutation;

use super::definition::{FlowDefinition, ForEachRef, ResultFormat, StepDefinition};
use super::error::FlowError;

/// Canonical quality gate default; flow definitions may override
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;

/// Quality feedback supplied alongside a step result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityFeedback {
    /// Score in [0, 1]
    pub score: f64,

    /// Free-text guidance to hand back on a retry
    #[serde(default)]
    pub feedback: Option<String>,
}

/// The resolver's single decided output for one call
#[derive(Debug, Clone, PartialEq)]
pub enum NextDirective {
    /// Proceed normally to the next step
    Advance { next_step_id: String },
    /// Redo the same step; the score fell below the quality gate
    Improve {
        step_id: String,
        score: f64,
        feedback: Option<String>,
    },
    /// Redo the same step; the payload failed structural validation
    FormatInvalid { step_id: String, reason: String },
    /// Serve the next fan-out item for the step
    FanOutNext {
        step_id: String,
        iteration_index: usize,
        item: Value,
    },
    /// Flow finished
    Complete,
    /// The referenced session does not exist in the store
    SessionRecovery,
}

/// A directive plus the session changes that must persist with it
#[derive(Debug)]
pub struct Resolution {
    pub directive: NextDirective,
    pub mutation: SessionMutation,
}

/// The next-step decision engine
#[derive(Debug, Clone, Copy)]
pub struct StepResolver {
    default_threshold: f64,
}

impl Default for StepResolver {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY_THRESHOLD)
    }
}

impl StepResolver {
    /// Create a resolver with the given default quality threshold
    pub fn new(default_threshold: f64) -> Self {
        debug!(default_threshold, "StepResolver::new: called");
        Self { default_threshold }
    }

    /// Effective quality gate for a flow
    pub fn threshold_for(&self, flow: &FlowDefinition) -> f64 {
        flow.quality_threshold.unwrap_or(self.default_threshold)
    }

    /// The step a fresh session starts on (first step with no dependencies)
    pub fn initial_step<'a>(&self, flow: &'a FlowDefinition) -> Result<&'a StepDefinition, FlowError> {
        flow.steps
            .iter()
            .find(|s| s.dependencies.is_empty())
            .ok_or_else(|| FlowError::Stalled {
                flow_type: flow.flow_type.clone(),
            })
    }

    /// Decide the next directive for an advance call
    pub fn resolve_advance(
        &self,
        flow: &FlowDefinition,
        session: &SessionState,
        expected_version: i64,
        step_result: Value,
        quality_feedback: Option<QualityFeedback>,
    ) -> Result<Resolution, FlowError> {
        debug!(
            session_id = %session.session_id,
            current_step = %session.current_step,
            has_feedback = quality_feedback.is_some(),
            "StepResolver::resolve_advance: called"
        );

        let mut mutation = SessionMutation::new(expected_version);

        // A finished session gets a stable terminal answer, not an error
        if session.is_completed() || session.current_step == COMPLETED_STEP {
            debug!(session_id = %session.session_id, "resolve_advance: session already completed");
            return Ok(Resolution {
                directive: NextDirective::Complete,
                mutation,
            });
        }

        let current = flow.step(&session.current_step).ok_or_else(|| FlowError::UnknownStep {
            flow_type: flow.flow_type.clone(),
            step_id: session.current_step.clone(),
        })?;

        // Structural validation; nothing persists on failure
        let normalized = match validate_result(current, &step_result) {
            Ok(value) => value,
            Err(reason) => {
                debug!(step_id = %current.step_id, %reason, "resolve_advance: format invalid");
                return Ok(Resolution {
                    directive: NextDirective::FormatInvalid {
                        step_id: current.step_id.clone(),
                        reason,
                    },
                    mutation,
                });
            }
        };

        mutation.record_result(&current.step_id, normalized);
        mutation.increment_step();
        if let Some(feedback) = &quality_feedback {
            mutation.record_score(&current.step_id, feedback.score);
        }

        // Quality gate: the recorded result and score stay visible, but the
        // session does not move
        let threshold = self.threshold_for(flow);
        if let Some(feedback) = &quality_feedback
            && feedback.score < threshold
        {
            debug!(
                step_id = %current.step_id,
                score = feedback.score,
                threshold,
                "resolve_advance: below quality gate"
            );
            return Ok(Resolution {
                directive: NextDirective::Improve {
                    step_id: current.step_id.clone(),
                    score: feedback.score,
                    feedback: feedback.feedback.clone(),
                },
                mutation,
            });
        }

        // An open cursor on the current step takes priority over moving on
        if let Some(cursor) = &session.fan_out_cursor
            && cursor.step_id == session.current_step
            && !cursor.is_exhausted()
        {
            let mut advanced = cursor.clone();
            advanced.advance();

            if let Some(item) = advanced.current_item().cloned() {
                let iteration_index = advanced.next_index;
                debug!(
                    step_id = %cursor.step_id,
                    iteration_index,
                    "resolve_advance: serving next fan-out item"
                );
                mutation.set_cursor(advanced);
                return Ok(Resolution {
                    directive: NextDirective::FanOutNext {
                        step_id: session.current_step.clone(),
                        iteration_index,
                        item,
                    },
                    mutation,
                });
            }

            // Last item consumed; the fan-out step is now complete
            debug!(step_id = %cursor.step_id, "resolve_advance: fan-out exhausted");
            mutation.clear_cursor();
        }

        self.select_next(flow, session, mutation)
    }

    /// Force the completion path (client-initiated early termination)
    pub fn resolve_completion(
        &self,
        session: &SessionState,
        expected_version: i64,
        final_insights: Option<Value>,
    ) -> Resolution {
        debug!(session_id = %session.session_id, has_insights = final_insights.is_some(), "StepResolver::resolve_completion: called");
        let mut mutation = SessionMutation::new(expected_version);

        if let Some(insights) = final_insights {
            mutation.record_result("final_insights", insights);
        }
        if !session.is_completed() {
            mutation
                .set_status(SessionStatus::Completed)
                .set_current_step(COMPLETED_STEP)
                .clear_cursor();
        }

        Resolution {
            directive: NextDirective::Complete,
            mutation,
        }
    }

    /// Pick the first eligible step, expand fan-out, or complete the flow
    fn select_next(
        &self,
        flow: &FlowDefinition,
        session: &SessionState,
        mut mutation: SessionMutation,
    ) -> Result<Resolution, FlowError> {
        'scan: loop {
            let preview = mutation.preview(session);

            for step in &flow.steps {
                if step_complete(step, &preview) || !deps_satisfied(flow, step, &preview) {
                    continue;
                }

                if let Some(for_each) = step.for_each_ref() {
                    let items = resolve_fan_out_items(step, &for_each, &preview)?;

                    if items.is_empty() {
                        // Zero items means zero FanOutNext directives; the
                        // step completes with an empty result
                        debug!(step_id = %step.step_id, "select_next: empty fan-out source");
                        mutation.record_result(&step.step_id, Value::Array(Vec::new()));
                        continue 'scan;
                    }

                    let item = items[0].clone();
                    debug!(step_id = %step.step_id, item_count = items.len(), "select_next: starting fan-out");
                    mutation
                        .set_cursor(FanOutCursor::new(&step.step_id, &for_each.source, items))
                        .set_current_step(&step.step_id);
                    return Ok(Resolution {
                        directive: NextDirective::FanOutNext {
                            step_id: step.step_id.clone(),
                            iteration_index: 0,
                            item,
                        },
                        mutation,
                    });
                }

                debug!(step_id = %step.step_id, "select_next: advancing");
                mutation.set_current_step(&step.step_id);
                return Ok(Resolution {
                    directive: NextDirective::Advance {
                        next_step_id: step.step_id.clone(),
                    },
                    mutation,
                });
            }

            // Nothing eligible: either done, or the definition is broken
            if flow.steps.iter().all(|s| step_complete(s, &preview)) {
                debug!(flow_type = %flow.flow_type, "select_next: flow complete");
                mutation
                    .set_status(SessionStatus::Completed)
                    .set_current_step(COMPLETED_STEP)
                    .clear_cursor();
                return Ok(Resolution {
                    directive: NextDirective::Complete,
                    mutation,
                });
            }

            return Err(FlowError::Stalled {
                flow_type: flow.flow_type.clone(),
            });
        }
    }
}

/// Validate a payload against the step's declared format
///
/// Structured steps persist the parsed form, so later fan-out resolution
/// reads real JSON rather than a string that happens to contain it.
pub fn validate_result(step: &StepDefinition, payload: &Value) -> Result<Value, String> {
    match step.format {
        ResultFormat::Text => Ok(payload.clone()),
        ResultFormat::Structured => match payload {
            Value::Object(_) | Value::Array(_) => Ok(payload.clone()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Ok(parsed),
                Ok(_) => Err(format!(
                    "step '{}' requires structured data, got a scalar",
                    step.step_id
                )),
                Err(e) => Err(format!("step '{}' requires structured data: {}", step.step_id, e)),
            },
            other => Err(format!(
                "step '{}' requires structured data, got {}",
                step.step_id,
                json_kind(other)
            )),
        },
    }
}

/// The step has a complete recorded result for dependency purposes
///
/// A fan-out step only counts once its cursor is exhausted (or was resolved
/// to an empty list); a mid-iteration step is not complete even though item
/// results are already recorded.
pub fn step_complete(step: &StepDefinition, state: &SessionState) -> bool {
    if !state.has_result(&step.step_id) {
        return false;
    }
    if step.is_fan_out()
        && let Some(cursor) = &state.fan_out_cursor
        && cursor.step_id == step.step_id
    {
        return cursor.is_exhausted();
    }
    true
}

/// Every dependency has a complete recorded result
fn deps_satisfied(flow: &FlowDefinition, step: &StepDefinition, state: &SessionState) -> bool {
    step.dependencies
        .iter()
        .all(|dep| flow.step(dep).is_some_and(|d| step_complete(d, state)))
}

/// Number of steps with complete results
pub fn completed_step_count(flow: &FlowDefinition, state: &SessionState) -> usize {
    flow.steps.iter().filter(|s| step_complete(s, state)).count()
}

/// Progress display string: "n/total"
pub fn flow_progress(flow: &FlowDefinition, state: &SessionState) -> String {
    let total = flow.total_steps();
    let n = if state.is_completed() {
        total
    } else {
        (completed_step_count(flow, state) + 1).min(total)
    };
    format!("{n}/{total}")
}

/// Resolve the fan-out item list from the source step's recorded result
///
/// Failure here is a flow-definition bug, not a user error: it fails loudly
/// rather than silently serving a truncated iteration.
fn resolve_fan_out_items(
    step: &StepDefinition,
    for_each: &ForEachRef,
    state: &SessionState,
) -> Result<Vec<Value>, FlowError> {
    let fail = |reason: String| FlowError::FanOutResolution {
        step_id: step.step_id.clone(),
        reason,
    };

    let source_result = state
        .result(&for_each.source)
        .ok_or_else(|| fail(format!("source step '{}' has no recorded result", for_each.source)))?;

    let parsed = match source_result {
        Value::Object(_) | Value::Array(_) => source_result.clone(),
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(|v| v.is_object() || v.is_array())
            .ok_or_else(|| fail(format!("result of source step '{}' is not structured data", for_each.source)))?,
        other => {
            return Err(fail(format!(
                "result of source step '{}' is not structured data, got {}",
                for_each.source,
                json_kind(other)
            )));
        }
    };

    let items = parsed
        .get(&for_each.field)
        .ok_or_else(|| {
            fail(format!(
                "field '{}' missing from result of source step '{}'",
                for_each.field, for_each.source
            ))
        })?
        .as_array()
        .ok_or_else(|| {
            fail(format!(
                "field '{}' of source step '{}' is not a list",
                for_each.field, for_each.source
            ))
        })?;

    Ok(items.clone())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
