//! ThinkFlow configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::flow::DEFAULT_QUALITY_THRESHOLD;

/// Main ThinkFlow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Flow definition sources
    pub flows: FlowsConfig,

    /// Quality gate configuration
    pub quality: QualityConfig,

    /// Prompt template sources
    pub prompts: PromptsConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quality.threshold) {
            return Err(eyre::eyre!(
                "quality threshold {} is outside [0, 1]",
                self.quality.threshold
            ));
        }
        if let Some(file) = &self.flows.file
            && !file.exists()
        {
            return Err(eyre::eyre!("flows file does not exist: {}", file.display()));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .thinkflow.yml
        let local_config = PathBuf::from(".thinkflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/thinkflow/thinkflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("thinkflow").join("thinkflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the session store
    #[serde(rename = "store-dir")]
    pub store_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/thinkflow on Linux)
        let store_dir = dirs::data_dir()
            .map(|d| d.join("thinkflow"))
            .unwrap_or_else(|| PathBuf::from(".thinkflow-store"));
        Self { store_dir }
    }
}

/// Flow definition sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowsConfig {
    /// YAML file of additional flow definitions (overrides builtins by name)
    pub file: Option<PathBuf>,
}

/// Quality gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Default gate threshold; flow definitions may override per flow
    pub threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }
}

/// Prompt template sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Root directory for the template loading chain (default: cwd)
    pub root: Option<PathBuf>,
}
