//! Dependency extraction from formula strings.
//!
//! Finds the schema fields a formula reads. Used to order formula evaluation
//! and to reject circular formulas. References inside string literals are
//! ignored.

use super::preprocess::{FieldBindings, Segment, split_segments};

/// Fields referenced by `formula`, deduplicated, in order of first appearance.
pub fn extract_dependencies(formula: &str, bindings: &FieldBindings) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    for segment in split_segments(formula) {
        let Segment::Code(code) = segment else {
            continue;
        };
        for field in bindings.referenced(code) {
            if !deps.contains(&field) {
                deps.push(field);
            }
        }
    }
    deps
}
