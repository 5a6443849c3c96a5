//! ledger.rs
//! The series store: one float column per base name over the simulation
//! timeline, plus the value type flowing through evaluation.

use crate::store::ReferenceError;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use self::error::ComputationError;
mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum ComputationError {
        #[error("Math error: {0}")]
        MathError(String),
        #[error("Division by zero")]
        DivisionByZero,
        #[error("Power overflow: operands ({base}, {exponent}) exceed the allowed magnitude")]
        PowerOverflow { base: f64, exponent: f64 },
        #[error("Type mismatch: {0}")]
        TypeMismatch(String),
        #[error("Builtin '{name}' failed: {message}")]
        Builtin { name: &'static str, message: String },
        #[error("Variable '{reference}' is not evaluable at step {step}")]
        Unevaluable { reference: String, step: i64 },
        #[error("Cycle detected while evaluating '{reference}' at step {step}")]
        CycleDetected { reference: String, step: i64 },
        #[error("Evaluation deeper than {limit} levels at '{reference}', step {step}")]
        RecursionLimit { reference: String, step: i64, limit: usize },
        #[error("No value for declared input '{0}'")]
        MissingInput(String),
        #[error("Input exhausted: '{input}' needs {needed} value(s), {available} left")]
        InputExhausted { input: String, needed: usize, available: usize },
        #[error("Invalid input value '{0}'")]
        InvalidInput(String),
        #[error(transparent)]
        Reference(#[from] ReferenceError),
    }
}

impl ComputationError {
    /// Input exhaustion ends a run instead of failing a single line.
    pub fn is_input_exhausted(&self) -> bool {
        matches!(self, ComputationError::InputExhausted { .. })
    }
}

/// The atomic unit of data in evaluation.
/// Sliced references and vector inputs produce a `Series`; everything else is scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Series(Arc<Vec<f64>>),
}

impl Value {
    pub fn series(values: Vec<f64>) -> Self { Value::Series(Arc::new(values)) }

    pub fn as_scalar(&self) -> Result<f64, ComputationError> {
        match self {
            Value::Scalar(s) => Ok(*s),
            Value::Series(_) => Err(ComputationError::TypeMismatch(
                "a range of values was used where a single number is required".into(),
            )),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Value::Scalar(s) => vec![*s],
            Value::Series(s) => s.to_vec(),
        }
    }
}

/// Widest timeline a ledger allocates columns for.
pub const MAX_STEPS: usize = 1 << 24;

/// Columnar time-series storage. `NaN` marks an unknown cell.
///
/// A ledger with an empty span belongs to a static model: every lookup misses
/// and every write is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    origin: i64,
    len: usize,
    columns: BTreeMap<String, Vec<f64>>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    /// A ledger covering the inclusive step range `[start, end]`. A range
    /// wider than [`MAX_STEPS`] is treated as empty.
    pub fn for_span(start: i64, end: i64) -> Self {
        let len = end
            .checked_sub(start)
            .filter(|width| *width >= 0)
            .and_then(|width| usize::try_from(width).ok())
            .and_then(|width| width.checked_add(1))
            .filter(|len| *len <= MAX_STEPS)
            .unwrap_or(0);
        Self { origin: start, len, columns: BTreeMap::new() }
    }

    pub fn span(&self) -> Option<(i64, i64)> {
        if self.len == 0 {
            None
        } else {
            Some((self.origin, self.origin + self.len as i64 - 1))
        }
    }

    #[inline(always)]
    fn offset(&self, step: i64) -> Option<usize> {
        let off = usize::try_from(step.checked_sub(self.origin)?).ok()?;
        (off < self.len).then_some(off)
    }

    pub fn contains_step(&self, step: i64) -> bool { self.offset(step).is_some() }

    /// Adds a NaN-filled column if `name` is not tracked yet.
    pub fn ensure_column(&mut self, name: &str) -> &mut Vec<f64> {
        let len = self.len;
        self.columns.entry(name.to_string()).or_insert_with(|| vec![f64::NAN; len])
    }

    /// The known (finite) value of `name` at `step`.
    #[inline(always)]
    pub fn get(&self, name: &str, step: i64) -> Option<f64> {
        let off = self.offset(step)?;
        self.columns.get(name).map(|c| c[off]).filter(|v| v.is_finite())
    }

    /// Writes `value` at `step`. Returns false when the step is outside the span.
    pub fn insert(&mut self, name: &str, step: i64, value: f64) -> bool {
        match self.offset(step) {
            Some(off) => {
                self.ensure_column(name)[off] = value;
                true
            }
            None => false,
        }
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}
