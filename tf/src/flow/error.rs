//! Flow-level error types
//!
//! Everything here is a hard failure: a broken flow definition or a broken
//! deployment, not a bad user turn. Conditions a caller can correct by
//! changing the next prompt (format problems, quality-gate failures, lost
//! sessions) are `NextDirective` variants instead and never surface as errors.

use thiserror::Error;

/// Errors from flow definition loading and resolution
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("unknown flow type: {0}")]
    UnknownFlowType(String),

    #[error("unknown step '{step_id}' in flow '{flow_type}'")]
    UnknownStep { flow_type: String, step_id: String },

    #[error("invalid flow definition '{flow_type}': {reason}")]
    InvalidDefinition { flow_type: String, reason: String },

    #[error("fan-out resolution failed for step '{step_id}': {reason}")]
    FanOutResolution { step_id: String, reason: String },

    #[error("flow '{flow_type}' stalled: no eligible step but flow is incomplete")]
    Stalled { flow_type: String },

    #[error("failed to parse flow definitions: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read flows file: {0}")]
    Io(#[from] std::io::Error),
}
