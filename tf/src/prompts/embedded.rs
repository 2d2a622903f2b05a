//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files and serve as the last
//! level of the template loading chain.

use tracing::debug;

pub const DECOMPOSE: &str = include_str!("../../prompts/decompose.pmt");
pub const COLLECT_EVIDENCE: &str = include_str!("../../prompts/collect_evidence.pmt");
pub const EVALUATE: &str = include_str!("../../prompts/evaluate.pmt");
pub const REFLECT: &str = include_str!("../../prompts/reflect.pmt");
pub const FRAME: &str = include_str!("../../prompts/frame.pmt");
pub const GENERATE_OPTIONS: &str = include_str!("../../prompts/generate_options.pmt");
pub const ASSESS_OPTION: &str = include_str!("../../prompts/assess_option.pmt");
pub const DECIDE: &str = include_str!("../../prompts/decide.pmt");
pub const CLARIFY: &str = include_str!("../../prompts/clarify.pmt");
pub const ANALYZE_STEP: &str = include_str!("../../prompts/analyze_step.pmt");
pub const CONCLUDE: &str = include_str!("../../prompts/conclude.pmt");
pub const IMPROVE: &str = include_str!("../../prompts/improve.pmt");
pub const FORMAT_VALIDATION: &str = include_str!("../../prompts/format_validation.pmt");
pub const ANALYZE: &str = include_str!("../../prompts/analyze.pmt");
pub const SESSION_RECOVERY: &str = include_str!("../../prompts/session_recovery.pmt");
pub const COMPLETION: &str = include_str!("../../prompts/completion.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "decompose" => Some(DECOMPOSE),
        "collect_evidence" => Some(COLLECT_EVIDENCE),
        "evaluate" => Some(EVALUATE),
        "reflect" => Some(REFLECT),
        "frame" => Some(FRAME),
        "generate_options" => Some(GENERATE_OPTIONS),
        "assess_option" => Some(ASSESS_OPTION),
        "decide" => Some(DECIDE),
        "clarify" => Some(CLARIFY),
        "analyze_step" => Some(ANALYZE_STEP),
        "conclude" => Some(CONCLUDE),
        "improve" => Some(IMPROVE),
        "format_validation" => Some(FORMAT_VALIDATION),
        "analyze" => Some(ANALYZE),
        "session_recovery" => Some(SESSION_RECOVERY),
        "completion" => Some(COMPLETION),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowRegistry;

    #[test]
    fn test_every_builtin_step_has_an_embedded_template() {
        let registry = FlowRegistry::builtin().unwrap();
        for flow_type in registry.flow_types() {
            let flow = registry.get(flow_type).unwrap();
            for step in &flow.steps {
                assert!(
                    get_embedded(&step.template_ref).is_some(),
                    "missing embedded template '{}' for step '{}'",
                    step.template_ref,
                    step.step_id
                );
            }
        }
    }

    #[test]
    fn test_get_embedded_known() {
        assert!(get_embedded("decompose").unwrap().contains("sub_questions"));
        assert!(get_embedded("improve").unwrap().contains("quality gate"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("nonexistent-template").is_none());
    }
}
