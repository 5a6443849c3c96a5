//! Validation rule for the reported targets.

use crate::store::VarRef;
use crate::validation::error::{ValidationError, ValidationErrorType};

/// Every target must name one fixed value: plain (`y`) or absolutely indexed (`X[5]`).
pub(crate) fn validate_targets(targets: &[VarRef]) -> Vec<ValidationError> {
    if targets.is_empty() {
        return vec![ValidationError {
            subject: "simulation.target".into(),
            error_type: ValidationErrorType::NoTargets,
            message: "No target defined".into(),
        }];
    }

    targets
        .iter()
        .filter_map(|target| {
            let error_type = if target.is_relative() {
                ValidationErrorType::RelativeTarget
            } else if target.is_sliced() {
                ValidationErrorType::SlicedTarget
            } else {
                return None;
            };
            Some(ValidationError {
                subject: target.to_string(),
                message: format!("Target '{}' must be absolutely indexed or not indexed at all", target),
                error_type,
            })
        })
        .collect()
}
