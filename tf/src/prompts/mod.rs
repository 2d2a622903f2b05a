//! Prompt template system
//!
//! Loads and renders `.pmt` (prompt template) files for every step the
//! engine can serve.
//!
//! Template loading chain:
//! 1. `.thinkflow/prompts/{name}.pmt` (user override)
//! 2. `prompts/{name}.pmt` (repo default)
//! 3. Embedded fallback in the binary
//!
//! Templates use Handlebars syntax for variable substitution. The engine
//! treats prompt content as opaque; a missing template is non-fatal and the
//! dispatcher substitutes a minimal fallback instruction.

pub mod embedded;
mod loader;

pub use loader::{PromptLoader, RenderError, Renderer};
