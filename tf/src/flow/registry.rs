//! Flow definition registry
//!
//! Holds the immutable flow graphs. Builtin definitions are embedded in the
//! binary; a user flows file (YAML map of flow type to definition) may add to
//! or override them by name. The registry is built once at startup and then
//! shared read-only; there is no runtime mutation API.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use super::definition::{FlowDefinition, FlowSpec};
use super::error::FlowError;

/// Builtin flow definitions (embedded in binary)
const BUILTIN_COMPREHENSIVE_ANALYSIS: &str = include_str!("builtin_flows/comprehensive_analysis.yml");
const BUILTIN_PROBLEM_SOLVING: &str = include_str!("builtin_flows/problem_solving.yml");
const BUILTIN_QUICK_ANALYSIS: &str = include_str!("builtin_flows/quick_analysis.yml");

/// Registry of validated flow definitions, keyed by flow type
pub struct FlowRegistry {
    flows: HashMap<String, FlowDefinition>,
}

impl FlowRegistry {
    /// An empty registry (tests)
    pub fn empty() -> Self {
        Self { flows: HashMap::new() }
    }

    /// Registry holding the builtin flows
    pub fn builtin() -> Result<Self, FlowError> {
        debug!("FlowRegistry::builtin: called");
        let mut registry = Self::empty();
        for (flow_type, yaml) in [
            ("comprehensive_analysis", BUILTIN_COMPREHENSIVE_ANALYSIS),
            ("problem_solving", BUILTIN_PROBLEM_SOLVING),
            ("quick_analysis", BUILTIN_QUICK_ANALYSIS),
        ] {
            let spec: FlowSpec = serde_yaml::from_str(yaml)?;
            registry.insert(FlowDefinition::from_spec(flow_type, spec)?);
        }
        Ok(registry)
    }

    /// Add a definition, replacing any existing one with the same flow type
    pub fn insert(&mut self, definition: FlowDefinition) {
        debug!(flow_type = %definition.flow_type, "FlowRegistry::insert: called");
        self.flows.insert(definition.flow_type.clone(), definition);
    }

    /// Merge definitions from a user flows file (overrides by flow type)
    pub fn load_flows_file(&mut self, path: impl AsRef<Path>) -> Result<(), FlowError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "FlowRegistry::load_flows_file: called");
        let content = std::fs::read_to_string(path)?;
        let specs: HashMap<String, FlowSpec> = serde_yaml::from_str(&content)?;

        let mut flow_types: Vec<_> = specs.into_iter().collect();
        flow_types.sort_by(|a, b| a.0.cmp(&b.0));
        for (flow_type, spec) in flow_types {
            info!(%flow_type, "Loaded flow definition from {}", path.display());
            self.insert(FlowDefinition::from_spec(flow_type, spec)?);
        }
        Ok(())
    }

    /// Look up a flow definition
    pub fn get(&self, flow_type: &str) -> Result<&FlowDefinition, FlowError> {
        self.flows
            .get(flow_type)
            .ok_or_else(|| FlowError::UnknownFlowType(flow_type.to_string()))
    }

    /// Declared step count for a flow (fan-out steps count once)
    pub fn total_steps(&self, flow_type: &str) -> Result<usize, FlowError> {
        Ok(self.get(flow_type)?.total_steps())
    }

    /// Registered flow types, sorted
    pub fn flow_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.flows.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
