//! Defines the error types for model loading and validation.
use crate::compute::parser::CompileError;
use crate::config::ConfigError;
use crate::store::ReferenceError;
use std::path::PathBuf;
use thiserror::Error;

/// The specific category of a validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorType {
    /// The model names no target.
    NoTargets,
    /// A target is relatively indexed (`X[t]`) and has no fixed step to report.
    RelativeTarget,
    /// A target is sliced; the line protocol only reports single numbers.
    SlicedTarget,
    /// A definition depends on itself.
    CyclicDefinition,
}

/// A structured error report from the static checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The reference (or equation) where the error was detected.
    pub subject: String,
    pub error_type: ValidationErrorType,
    pub message: String,
}

fn summarize(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ")
}

/// Every failure that prevents a model from being built.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot compile equation '{equation}': {source}")]
    Equation {
        equation: String,
        #[source]
        source: CompileError,
    },
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("Model validation failed: {}", summarize(.0))]
    Validation(Vec<ValidationError>),
    #[error("No initial condition found for variable '{0}'")]
    NoInitialCondition(String),
    #[error("Simulation timeline [{start}, {end}] is empty or too wide")]
    InfeasibleSimulation { start: i64, end: i64 },
    #[error("No time-indexed variable to schedule among the targets or their inputs")]
    NoLeaves,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Cannot read external source '{path}': {source}")]
    External {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl ModelError {
    /// The validation report, when this is a validation failure.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ModelError::Validation(errors) => errors,
            _ => &[],
        }
    }
}
