//! Flow definitions and the step resolution engine
//!
//! A flow is a small ordered step graph; the resolver walks it one advance
//! call at a time, expanding fan-out steps over a durable cursor and holding
//! results behind the quality gate.

mod definition;
mod error;
mod registry;
mod resolver;

pub use definition::{
    FlowDefinition, FlowSpec, ForEachRef, ResultFormat, StepDefinition, topological_sort, validate_dependency_graph,
};
pub use error::FlowError;
pub use registry::FlowRegistry;
pub use resolver::{
    DEFAULT_QUALITY_THRESHOLD, NextDirective, QualityFeedback, Resolution, StepResolver, completed_step_count,
    flow_progress, step_complete, validate_result,
};
