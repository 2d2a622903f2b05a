//! Prompt loader
//!
//! Loads prompt templates from files or falls back to embedded defaults,
//! then renders them with Handlebars. `PromptLoader` is the production
//! implementation of the `Renderer` interface the dispatcher consumes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use thiserror::Error;
use tracing::debug;

use super::embedded;

/// Errors from template loading and rendering
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("prompt template not found: {0}")]
    NotFound(String),

    #[error("failed to render template {template}: {reason}")]
    Render { template: String, reason: String },
}

/// The rendering collaborator the engine consumes
///
/// Production (`PromptLoader`) and test implementations satisfy the same
/// trait; the engine never cares where text comes from.
pub trait Renderer: Send + Sync {
    fn render(&self, template_ref: &str, params: &HashMap<String, String>) -> Result<String, RenderError>;
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g. `.thinkflow/prompts/`)
    user_dir: Option<PathBuf>,
    /// Repo default directory (e.g. `prompts/`)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader rooted at the given directory
    ///
    /// Checks `{root}/.thinkflow/prompts/` and `{root}/prompts/` for `.pmt`
    /// overrides; embedded templates are always available as the fallback.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        debug!(root = %root.display(), "PromptLoader::new: called");
        let user_dir = root.join(".thinkflow/prompts");
        let repo_dir = root.join("prompts");

        Self {
            hbs: Handlebars::new(),
            user_dir: user_dir.exists().then_some(user_dir),
            repo_dir: repo_dir.exists().then_some(repo_dir),
        }
    }

    /// Create a loader that only uses embedded prompts (tests)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Handlebars::new(),
            user_dir: None,
            repo_dir: None,
        }
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `.thinkflow/prompts/{name}.pmt`
    /// 2. Repo default: `prompts/{name}.pmt`
    /// 3. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String, RenderError> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{name}.pmt"));
            if path.exists() {
                debug!(path = %path.display(), "PromptLoader::load_template: found on disk");
                return std::fs::read_to_string(&path).map_err(|e| RenderError::Render {
                    template: name.to_string(),
                    reason: format!("failed to read {}: {}", path.display(), e),
                });
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(RenderError::NotFound(name.to_string()))
    }
}

impl Renderer for PromptLoader {
    fn render(&self, template_ref: &str, params: &HashMap<String, String>) -> Result<String, RenderError> {
        debug!(%template_ref, param_count = params.len(), "PromptLoader::render: called");
        let template = self.load_template(template_ref)?;

        self.hbs
            .render_template(&template, params)
            .map_err(|e| RenderError::Render {
                template: template_ref.to_string(),
                reason: e.to_string(),
            })
    }
}
