//! ThinkFlow - structured thinking prompt flow engine
//!
//! ThinkFlow generates and sequences structured thinking prompts that an
//! external language model executes. The engine never reasons itself: it
//! tracks a multi-step flow, decides which prompt to hand back next, and
//! persists per-session progress.
//!
//! # Core Concepts
//!
//! - **Flows as data**: a flow is a small step dependency graph defined in
//!   YAML, possibly with one-to-many fan-out over an earlier step's result
//! - **Durable iteration**: fan-out position lives on the persisted session
//!   record, never in call context, so a restart resumes mid-iteration
//! - **Correctable conditions are data**: bad formats, failed quality gates,
//!   and lost sessions come back as directives, never as errors
//! - **One directive per call**: each dispatcher call reads, decides,
//!   persists, and returns exactly one next action
//!
//! # Modules
//!
//! - [`flow`] - flow definitions, the registry, and the step resolver
//! - [`domain`] - session state and the durable fan-out cursor
//! - [`state`] - the session store interface and its implementations
//! - [`tools`] - the dispatcher exposing the four protocol operations
//! - [`prompts`] - prompt template loading and rendering
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod flow;
pub mod prompts;
pub mod state;
pub mod tools;

// Re-export commonly used types
pub use config::Config;
pub use domain::{COMPLETED_STEP, FanOutCursor, SessionState, SessionStatus};
pub use flow::{
    DEFAULT_QUALITY_THRESHOLD, FlowDefinition, FlowError, FlowRegistry, NextDirective, QualityFeedback, Resolution,
    StepDefinition, StepResolver, flow_progress,
};
pub use prompts::{PromptLoader, RenderError, Renderer};
pub use state::{
    MemorySessionStore, SessionMutation, SessionStore, SqliteSessionStore, StateError, VersionedSession,
};
pub use tools::{NextAction, Tool, ToolContext, ToolDefinition, ToolDispatcher, ToolEnvelope, ToolError};
