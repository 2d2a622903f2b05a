//! Domain types for ThinkFlow
//!
//! Core domain types: SessionState, SessionStatus, FanOutCursor.
//! SessionState implements the Record trait for sessionstore persistence.

mod id;
mod session;

pub use id::generate_id;
pub use session::{COMPLETED_STEP, FanOutCursor, SessionState, SessionStatus};

// Re-export sessionstore types for convenience
pub use sessionstore::{Filter, FilterOp, IndexValue, Record, Store, now_ms};
