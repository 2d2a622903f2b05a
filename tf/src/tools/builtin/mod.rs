//! Builtin protocol tools
//!
//! The four operations the external protocol exposes: start, advance,
//! analyze, complete. Each is a thin adapter over the resolver.

mod advance;
mod analyze;
mod complete;
mod start;

pub use advance::AdvanceThinkingTool;
pub use analyze::AnalyzeResultTool;
pub use complete::CompleteThinkingTool;
pub use start::StartThinkingTool;
