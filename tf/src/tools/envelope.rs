//! Dispatcher response envelope
//!
//! Every tool returns the same shape regardless of outcome, so the transport
//! layer never branches on directive internals. `metadata` always carries
//! `step_number`, `flow_progress`, and `quality_gate_passed`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What the caller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// Work through the served prompt and advance
    ContinueThinking,
    /// Redo the same step with the attached feedback
    ImproveResult,
    /// Resubmit the same step result as valid structured data
    FixFormat,
    /// The flow is finished; present the synthesis
    SessionComplete,
    /// The session id is unknown; start a fresh session
    RestartRequired,
}

impl std::fmt::Display for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::ContinueThinking => "continue_thinking",
            Self::ImproveResult => "improve_result",
            Self::FixFormat => "fix_format",
            Self::SessionComplete => "session_complete",
            Self::RestartRequired => "restart_required",
        };
        write!(f, "{label}")
    }
}

/// Progress metadata attached to every envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Monotonic advance counter for the session
    pub step_number: u32,

    /// "n/total" over declared steps (fan-out steps count once)
    pub flow_progress: String,

    /// False when the result was rejected (quality gate or format)
    pub quality_gate_passed: bool,
}

/// Uniform response returned by every dispatcher operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub tool_name: String,
    pub session_id: String,

    /// Step the caller should answer next (or a synthetic state)
    pub step: String,

    /// Template the prompt text was rendered from
    pub prompt_template: String,

    /// Rendered prompt text for the caller to execute
    pub prompt_text: String,

    /// Short procedural guidance alongside the prompt
    pub instructions: String,

    /// Session context echoed back to the caller
    pub context: HashMap<String, String>,

    pub next_action: NextAction,
    pub metadata: EnvelopeMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_action_serializes_snake_case() {
        let json = serde_json::to_string(&NextAction::ContinueThinking).unwrap();
        assert_eq!(json, "\"continue_thinking\"");
        assert_eq!(NextAction::RestartRequired.to_string(), "restart_required");
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = ToolEnvelope {
            tool_name: "advance_thinking".into(),
            session_id: "s1".into(),
            step: "evaluate".into(),
            prompt_template: "evaluate".into(),
            prompt_text: "weigh the evidence".into(),
            instructions: "answer and advance".into(),
            context: HashMap::from([("topic".to_string(), "t".to_string())]),
            next_action: NextAction::ContinueThinking,
            metadata: EnvelopeMetadata {
                step_number: 3,
                flow_progress: "3/4".into(),
                quality_gate_passed: true,
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["next_action"], "continue_thinking");
        assert_eq!(json["metadata"]["flow_progress"], "3/4");
    }
}
