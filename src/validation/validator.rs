//! The central validator that orchestrates the execution of all validation rules.
use super::error::ValidationError;
use super::rules::{cycles, targets};
use crate::store::{Registry, VarRef};

/// Runs every static check over a loaded model, collecting all errors before
/// any evaluation happens.
pub struct Validator<'a> {
    registry: &'a Registry,
    targets: &'a [VarRef],
    declared: &'a [VarRef],
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a Registry, targets: &'a [VarRef], declared: &'a [VarRef]) -> Self {
        Self { registry, targets, declared }
    }

    /// # Returns
    /// - `Ok(())` if no validation errors are found.
    /// - `Err(Vec<ValidationError>)` containing every error discovered.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = targets::validate_targets(self.targets);
        errors.extend(cycles::validate_definitions(self.registry, self.declared));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
