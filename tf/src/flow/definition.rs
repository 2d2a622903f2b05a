//! Flow and step definitions
//!
//! A flow definition is a small ordered step graph loaded from YAML. Steps
//! name their dependencies by id and may fan out over a list field of an
//! earlier step's result. Definitions are validated once at load time;
//! everything the resolver assumes about a definition (known deps, acyclic
//! graph, well-formed `for-each` references) is enforced here so resolution
//! never has to guess.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::COMPLETED_STEP;

use super::error::FlowError;

/// Expected shape of a step's result payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    /// Free text; anything goes
    #[default]
    Text,
    /// Must parse to a JSON object or array
    Structured,
}

/// A parsed `for-each` reference: `<step_id>.<field>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForEachRef {
    pub source: String,
    pub field: String,
}

impl ForEachRef {
    /// Parse a `<step_id>.<field>` reference
    pub fn parse(raw: &str) -> Option<Self> {
        let (source, field) = raw.split_once('.')?;
        if source.is_empty() || field.is_empty() {
            return None;
        }
        Some(Self {
            source: source.to_string(),
            field: field.to_string(),
        })
    }
}

/// One unit of work in a flow, bound to an opaque prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique id within the flow
    #[serde(rename = "step-id")]
    pub step_id: String,

    /// Free-form tag (e.g. "analysis", "research")
    #[serde(rename = "step-kind", default)]
    pub step_kind: String,

    /// Opaque template name handed to the renderer
    #[serde(rename = "template-ref")]
    pub template_ref: String,

    /// Step ids that must have complete results before this step runs
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Execute once per element of `<step_id>.<field>` in the source result
    #[serde(rename = "for-each", default)]
    pub for_each: Option<String>,

    /// Result payload shape
    #[serde(default)]
    pub format: ResultFormat,
}

impl StepDefinition {
    /// The parsed fan-out reference, if this step declares one
    ///
    /// Malformed references are rejected at definition load, so a `None`
    /// here genuinely means "not a fan-out step".
    pub fn for_each_ref(&self) -> Option<ForEachRef> {
        self.for_each.as_deref().and_then(ForEachRef::parse)
    }

    /// This step executes once per source list item
    pub fn is_fan_out(&self) -> bool {
        self.for_each.is_some()
    }
}

/// A flow definition as it appears in YAML (the flow type key lives outside)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    #[serde(default)]
    pub description: String,

    /// Per-flow quality gate override
    #[serde(rename = "quality-threshold", default)]
    pub quality_threshold: Option<f64>,

    pub steps: Vec<StepDefinition>,
}

/// The static, named step graph for one workflow type
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub flow_type: String,
    pub description: String,
    pub quality_threshold: Option<f64>,
    pub steps: Vec<StepDefinition>,
}

impl FlowDefinition {
    /// Build and validate a definition from its YAML spec
    pub fn from_spec(flow_type: impl Into<String>, spec: FlowSpec) -> Result<Self, FlowError> {
        let flow_type = flow_type.into();
        debug!(%flow_type, step_count = spec.steps.len(), "FlowDefinition::from_spec: called");
        let definition = Self {
            flow_type,
            description: spec.description,
            quality_threshold: spec.quality_threshold,
            steps: spec.steps,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Look up a step by id
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Declared step count; fan-out steps count once
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    fn invalid(&self, reason: impl Into<String>) -> FlowError {
        FlowError::InvalidDefinition {
            flow_type: self.flow_type.clone(),
            reason: reason.into(),
        }
    }

    /// Check every structural rule the resolver relies on
    pub fn validate(&self) -> Result<(), FlowError> {
        debug!(flow_type = %self.flow_type, "FlowDefinition::validate: called");
        if self.steps.is_empty() {
            return Err(self.invalid("flow has no steps"));
        }

        if let Some(threshold) = self.quality_threshold
            && !(0.0..=1.0).contains(&threshold)
        {
            return Err(self.invalid(format!("quality threshold {threshold} is outside [0, 1]")));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.step_id.is_empty() {
                return Err(self.invalid("step with empty id"));
            }
            if step.step_id == COMPLETED_STEP {
                return Err(self.invalid(format!("step id '{COMPLETED_STEP}' is reserved")));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(self.invalid(format!("duplicate step id '{}'", step.step_id)));
            }
            if step.template_ref.is_empty() {
                return Err(self.invalid(format!("step '{}' has an empty template-ref", step.step_id)));
            }
        }

        for step in &self.steps {
            for dep in &step.dependencies {
                if dep == &step.step_id {
                    return Err(self.invalid(format!("step '{}' depends on itself", step.step_id)));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(self.invalid(format!("step '{}' depends on unknown step '{}'", step.step_id, dep)));
                }
            }

            if let Some(raw) = &step.for_each {
                let for_each = ForEachRef::parse(raw)
                    .ok_or_else(|| self.invalid(format!("step '{}' has malformed for-each '{}'", step.step_id, raw)))?;
                if for_each.source == step.step_id {
                    return Err(self.invalid(format!("step '{}' fans out over itself", step.step_id)));
                }
                if !seen.contains(for_each.source.as_str()) {
                    return Err(self.invalid(format!(
                        "step '{}' fans out over unknown step '{}'",
                        step.step_id, for_each.source
                    )));
                }
                // The source list must exist before the step becomes
                // eligible, so the source has to be a declared dependency.
                if !step.dependencies.contains(&for_each.source) {
                    return Err(self.invalid(format!(
                        "step '{}' fans out over '{}' but does not depend on it",
                        step.step_id, for_each.source
                    )));
                }
            }
        }

        validate_dependency_graph(&self.flow_type, &self.steps)?;
        Ok(())
    }
}

/// Reject cyclic dependency graphs
pub fn validate_dependency_graph(flow_type: &str, steps: &[StepDefinition]) -> Result<(), FlowError> {
    topological_sort(flow_type, steps).map(|_| ())
}

/// Kahn's algorithm over the step graph, ties broken by declaration order
pub fn topological_sort<'a>(flow_type: &str, steps: &'a [StepDefinition]) -> Result<Vec<&'a str>, FlowError> {
    debug!(%flow_type, step_count = steps.len(), "topological_sort: called");
    let mut in_degree: HashMap<&str, usize> = steps
        .iter()
        .map(|s| (s.step_id.as_str(), s.dependencies.len()))
        .collect();
    let mut order = Vec::with_capacity(steps.len());

    while order.len() < steps.len() {
        let next = steps
            .iter()
            .map(|s| s.step_id.as_str())
            .find(|id| in_degree.get(id) == Some(&0));

        let Some(id) = next else {
            return Err(FlowError::InvalidDefinition {
                flow_type: flow_type.to_string(),
                reason: "dependency cycle detected".to_string(),
            });
        };

        in_degree.remove(id);
        order.push(id);

        for step in steps {
            if step.dependencies.iter().any(|d| d == id)
                && let Some(degree) = in_degree.get_mut(step.step_id.as_str())
            {
                *degree -= 1;
            }
        }
    }

    Ok(order)
}
