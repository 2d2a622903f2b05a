//! Session mutation
//!
//! The bundle of changes one resolution persists: step result, quality
//! score, cursor update, current step, status. Carries the version the
//! resolver's read was based on so the store can reject a concurrent writer
//! instead of silently merging over it.

use serde_json::Value;
use tracing::debug;

use crate::domain::{FanOutCursor, SessionState, SessionStatus};

/// Changes to apply atomically to one session
#[derive(Debug, Clone)]
pub struct SessionMutation {
    /// Version the underlying read was based on; stale → conflict
    pub expected_version: i64,

    results: Vec<(String, Value)>,
    scores: Vec<(String, f64)>,
    current_step: Option<String>,
    cursor: Option<Option<FanOutCursor>>,
    status: Option<SessionStatus>,
    increment_step: bool,
}

impl SessionMutation {
    /// An empty mutation based on the given read version
    pub fn new(expected_version: i64) -> Self {
        Self {
            expected_version,
            results: Vec::new(),
            scores: Vec::new(),
            current_step: None,
            cursor: None,
            status: None,
            increment_step: false,
        }
    }

    /// Record a step result (last-write-wins on apply)
    pub fn record_result(&mut self, step_id: impl Into<String>, payload: Value) -> &mut Self {
        self.results.push((step_id.into(), payload));
        self
    }

    /// Record a quality score
    pub fn record_score(&mut self, step_id: impl Into<String>, score: f64) -> &mut Self {
        self.scores.push((step_id.into(), score));
        self
    }

    /// Move the session to a different step
    pub fn set_current_step(&mut self, step_id: impl Into<String>) -> &mut Self {
        self.current_step = Some(step_id.into());
        self
    }

    /// Replace the fan-out cursor
    pub fn set_cursor(&mut self, cursor: FanOutCursor) -> &mut Self {
        self.cursor = Some(Some(cursor));
        self
    }

    /// Clear the fan-out cursor
    pub fn clear_cursor(&mut self) -> &mut Self {
        self.cursor = Some(None);
        self
    }

    /// Update the session status
    pub fn set_status(&mut self, status: SessionStatus) -> &mut Self {
        self.status = Some(status);
        self
    }

    /// Bump the advance counter
    pub fn increment_step(&mut self) -> &mut Self {
        self.increment_step = true;
        self
    }

    /// No changes recorded; applying would only bump the version
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
            && self.scores.is_empty()
            && self.current_step.is_none()
            && self.cursor.is_none()
            && self.status.is_none()
            && !self.increment_step
    }

    /// Apply the recorded changes to a session
    pub fn apply_to(&self, session: &mut SessionState) {
        debug!(session_id = %session.session_id, "SessionMutation::apply_to: called");
        for (step_id, payload) in &self.results {
            session.record_result(step_id.clone(), payload.clone());
        }
        for (step_id, score) in &self.scores {
            session.record_score(step_id.clone(), *score);
        }
        if let Some(step_id) = &self.current_step {
            session.set_current_step(step_id.clone());
        }
        if let Some(cursor) = &self.cursor {
            session.set_cursor(cursor.clone());
        }
        if let Some(status) = self.status {
            session.set_status(status);
        }
        if self.increment_step {
            session.increment_step();
        }
    }

    /// The session as it will look after apply (resolver scratch state)
    pub fn preview(&self, session: &SessionState) -> SessionState {
        let mut preview = session.clone();
        self.apply_to(&mut preview);
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> SessionState {
        SessionState::new("topic", "quick_analysis", "clarify")
    }

    #[test]
    fn test_empty_mutation() {
        let mutation = SessionMutation::new(1);
        assert!(mutation.is_empty());

        let mut mutation = SessionMutation::new(1);
        mutation.increment_step();
        assert!(!mutation.is_empty());
    }

    #[test]
    fn test_apply_records_and_moves() {
        let mut session = session();
        let mut mutation = SessionMutation::new(1);
        mutation
            .record_result("clarify", json!("the question is narrow"))
            .record_score("clarify", 0.85)
            .set_current_step("analyze")
            .increment_step();

        mutation.apply_to(&mut session);

        assert_eq!(session.result("clarify"), Some(&json!("the question is narrow")));
        assert_eq!(session.quality_scores.get("clarify"), Some(&0.85));
        assert_eq!(session.current_step, "analyze");
        assert_eq!(session.step_number, 2);
    }

    #[test]
    fn test_apply_cursor_and_status() {
        let mut session = session();
        let mut mutation = SessionMutation::new(1);
        mutation.set_cursor(FanOutCursor::new("b", "a", vec![json!(1), json!(2)]));
        mutation.apply_to(&mut session);
        assert!(session.fan_out_cursor.is_some());

        let mut mutation = SessionMutation::new(2);
        mutation.clear_cursor().set_status(SessionStatus::Completed);
        mutation.apply_to(&mut session);
        assert!(session.fan_out_cursor.is_none());
        assert!(session.is_completed());
    }

    #[test]
    fn test_preview_leaves_original_untouched() {
        let session = session();
        let mut mutation = SessionMutation::new(1);
        mutation.record_result("clarify", json!("x"));

        let preview = mutation.preview(&session);
        assert!(preview.has_result("clarify"));
        assert!(!session.has_result("clarify"));
    }
}
