//! Tool system
//!
//! The dispatcher exposes the four protocol operations (start, advance,
//! analyze, complete) as tools with JSON Schema inputs. Every tool returns
//! the uniform `ToolEnvelope`; correctable conditions ride inside it while
//! broken calls surface as `ToolError`.

mod context;
mod dispatcher;
mod envelope;
mod traits;

pub mod builtin;

pub use context::ToolContext;
pub use dispatcher::ToolDispatcher;
pub use envelope::{EnvelopeMetadata, NextAction, ToolEnvelope};
pub use traits::{Tool, ToolDefinition, ToolError};

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures for tool tests

    use std::sync::Arc;

    use serde_json::json;

    use crate::flow::{FlowRegistry, StepResolver};
    use crate::prompts::PromptLoader;
    use crate::state::MemorySessionStore;

    use super::builtin::StartThinkingTool;
    use super::{Tool, ToolContext};

    /// Context over builtin flows, an in-memory store, embedded prompts
    pub fn context() -> ToolContext {
        ToolContext::new(
            Arc::new(FlowRegistry::builtin().expect("builtin flows load")),
            Arc::new(MemorySessionStore::new()),
            Arc::new(PromptLoader::embedded_only()),
            StepResolver::default(),
        )
    }

    /// Start a session through the real tool and return its id
    pub async fn start_session(ctx: &ToolContext, flow_type: &str, topic: &str) -> String {
        let envelope = StartThinkingTool
            .execute(json!({"topic": topic, "flow_type": flow_type}), ctx)
            .await
            .expect("start_thinking succeeds");
        envelope.session_id
    }
}
