//! Session domain type
//!
//! Tracks one run of a flow definition: which step the caller answers next,
//! every recorded step result and quality score, and, for a step that fans
//! out over a list, the durable iteration cursor. The cursor lives on the
//! persisted record and is updated in the same mutation as everything else;
//! iteration state is never held only in call context.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sessionstore::{IndexValue, Record, now_ms};
use tracing::debug;

use super::id::generate_id;

/// Synthetic `current_step` value once a session has finished
pub const COMPLETED_STEP: &str = "completed";

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting advance calls
    #[default]
    Active,
    /// Flow finished or client-terminated
    Completed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Durable fan-out iteration state
///
/// `next_index` is the index currently being served; the item list is frozen
/// at cursor creation from the source step's recorded result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutCursor {
    /// The fan-out step being iterated
    pub step_id: String,

    /// Step whose result the item list was resolved from
    pub source_step: String,

    /// Resolved item list, in source order
    pub items: Vec<Value>,

    /// Index currently being served (== items.len() once exhausted)
    pub next_index: usize,
}

impl FanOutCursor {
    /// Create a fresh cursor serving index 0
    pub fn new(step_id: impl Into<String>, source_step: impl Into<String>, items: Vec<Value>) -> Self {
        let step_id = step_id.into();
        let source_step = source_step.into();
        debug!(%step_id, %source_step, item_count = items.len(), "FanOutCursor::new: called");
        Self {
            step_id,
            source_step,
            items,
            next_index: 0,
        }
    }

    /// The item at the served index, if any remain
    pub fn current_item(&self) -> Option<&Value> {
        self.items.get(self.next_index)
    }

    /// Consume the served index and move to the next
    pub fn advance(&mut self) {
        debug!(step_id = %self.step_id, next_index = self.next_index, "FanOutCursor::advance: called");
        self.next_index += 1;
    }

    /// Every item has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.items.len()
    }
}

/// Persisted state of one flow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Unique identifier, immutable once created
    pub session_id: String,

    /// Topic the caller is thinking about
    pub topic: String,

    /// Flow definition this session runs (FlowRegistry key)
    pub flow_type: String,

    /// Step the caller is expected to answer next
    pub current_step: String,

    /// Monotonic advance counter, for progress display
    pub step_number: u32,

    /// Last recorded result per step (last-write-wins, not append-only)
    #[serde(default)]
    pub step_results: HashMap<String, Value>,

    /// Last recorded quality score per step
    #[serde(default)]
    pub quality_scores: HashMap<String, f64>,

    /// Iteration state for a step currently fanning out
    #[serde(default)]
    pub fan_out_cursor: Option<FanOutCursor>,

    /// Current status
    pub status: SessionStatus,

    /// Creation timestamp (unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (unix milliseconds)
    pub updated_at: i64,
}

impl SessionState {
    /// Create a new active session positioned at the flow's first step
    pub fn new(topic: impl Into<String>, flow_type: impl Into<String>, first_step: impl Into<String>) -> Self {
        let topic = topic.into();
        let flow_type = flow_type.into();
        debug!(%topic, %flow_type, "SessionState::new: called");
        let now = now_ms();

        Self {
            session_id: generate_id("session", &topic),
            topic,
            flow_type,
            current_step: first_step.into(),
            step_number: 1,
            step_results: HashMap::new(),
            quality_scores: HashMap::new(),
            fan_out_cursor: None,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with a specific id (tests)
    pub fn with_id(
        id: impl Into<String>,
        topic: impl Into<String>,
        flow_type: impl Into<String>,
        first_step: impl Into<String>,
    ) -> Self {
        let mut session = Self::new(topic, flow_type, first_step);
        session.session_id = id.into();
        session
    }

    /// Record a step result (last-write-wins)
    pub fn record_result(&mut self, step_id: impl Into<String>, payload: Value) {
        let step_id = step_id.into();
        debug!(session_id = %self.session_id, %step_id, "SessionState::record_result: called");
        self.step_results.insert(step_id, payload);
        self.updated_at = now_ms();
    }

    /// Record a quality score (last-write-wins)
    pub fn record_score(&mut self, step_id: impl Into<String>, score: f64) {
        let step_id = step_id.into();
        debug!(session_id = %self.session_id, %step_id, score, "SessionState::record_score: called");
        self.quality_scores.insert(step_id, score);
        self.updated_at = now_ms();
    }

    /// Move to a different step
    pub fn set_current_step(&mut self, step_id: impl Into<String>) {
        let step_id = step_id.into();
        debug!(session_id = %self.session_id, %step_id, "SessionState::set_current_step: called");
        self.current_step = step_id;
        self.updated_at = now_ms();
    }

    /// Replace (or clear) the fan-out cursor
    pub fn set_cursor(&mut self, cursor: Option<FanOutCursor>) {
        debug!(session_id = %self.session_id, has_cursor = cursor.is_some(), "SessionState::set_cursor: called");
        self.fan_out_cursor = cursor;
        self.updated_at = now_ms();
    }

    /// Update the status
    pub fn set_status(&mut self, status: SessionStatus) {
        debug!(session_id = %self.session_id, %status, "SessionState::set_status: called");
        self.status = status;
        self.updated_at = now_ms();
    }

    /// Increment the advance counter
    pub fn increment_step(&mut self) {
        debug!(session_id = %self.session_id, step_number = self.step_number, "SessionState::increment_step: called");
        self.step_number += 1;
        self.updated_at = now_ms();
    }

    /// A result has been recorded for the step (fan-out completeness is the
    /// resolver's concern, not this accessor's)
    pub fn has_result(&self, step_id: &str) -> bool {
        self.step_results.contains_key(step_id)
    }

    /// The recorded result for a step
    pub fn result(&self, step_id: &str) -> Option<&Value> {
        self.step_results.get(step_id)
    }

    /// Session still accepts advance calls
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Session has finished
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

impl Record for SessionState {
    fn id(&self) -> &str {
        &self.session_id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "sessions"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("flow_type".to_string(), IndexValue::String(self.flow_type.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_new() {
        let session = SessionState::new("grid stability", "comprehensive_analysis", "decompose");
        assert!(session.session_id.contains("-session-"));
        assert_eq!(session.current_step, "decompose");
        assert_eq!(session.step_number, 1);
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.fan_out_cursor.is_none());
    }

    #[test]
    fn test_record_result_last_write_wins() {
        let mut session = SessionState::new("t", "quick_analysis", "clarify");
        session.record_result("clarify", json!("first pass"));
        session.record_result("clarify", json!("second pass"));

        assert_eq!(session.result("clarify"), Some(&json!("second pass")));
        assert_eq!(session.step_results.len(), 1);
    }

    #[test]
    fn test_record_score() {
        let mut session = SessionState::new("t", "quick_analysis", "clarify");
        session.record_score("clarify", 0.4);
        session.record_score("clarify", 0.9);
        assert_eq!(session.quality_scores.get("clarify"), Some(&0.9));
    }

    #[test]
    fn test_status_transitions() {
        let mut session = SessionState::new("t", "quick_analysis", "clarify");
        assert!(session.is_active());

        session.set_status(SessionStatus::Completed);
        assert!(session.is_completed());
        assert!(!session.is_active());
    }

    #[test]
    fn test_cursor_serves_in_order() {
        let items = vec![json!({"id": "SQ1"}), json!({"id": "SQ2"}), json!({"id": "SQ3"})];
        let mut cursor = FanOutCursor::new("collect_evidence", "decompose", items);

        assert_eq!(cursor.next_index, 0);
        assert_eq!(cursor.current_item(), Some(&json!({"id": "SQ1"})));

        cursor.advance();
        assert_eq!(cursor.current_item(), Some(&json!({"id": "SQ2"})));
        assert!(!cursor.is_exhausted());

        cursor.advance();
        cursor.advance();
        assert!(cursor.is_exhausted());
        assert!(cursor.current_item().is_none());
    }

    #[test]
    fn test_cursor_survives_serde_round_trip() {
        let mut session = SessionState::new("t", "comprehensive_analysis", "collect_evidence");
        let mut cursor = FanOutCursor::new("collect_evidence", "decompose", vec![json!("a"), json!("b")]);
        cursor.advance();
        session.set_cursor(Some(cursor));

        let blob = serde_json::to_string(&session).unwrap();
        let reloaded: SessionState = serde_json::from_str(&blob).unwrap();

        let cursor = reloaded.fan_out_cursor.expect("cursor should persist");
        assert_eq!(cursor.next_index, 1);
        assert_eq!(cursor.current_item(), Some(&json!("b")));
    }

    #[test]
    fn test_indexed_fields() {
        let session = SessionState::new("t", "quick_analysis", "clarify");
        let fields = session.indexed_fields();
        assert_eq!(fields.get("status"), Some(&IndexValue::String("active".into())));
        assert_eq!(
            fields.get("flow_type"),
            Some(&IndexValue::String("quick_analysis".into()))
        );
    }

    #[test]
    fn test_status_serialization() {
        let mut session = SessionState::new("t", "quick_analysis", "clarify");
        session.set_status(SessionStatus::Completed);

        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"status\":\"completed\""));
    }
}
