//! Recursive, memoizing evaluation of references at a given step.

use super::ledger::{ComputationError, Ledger, Value};
use crate::store::{IndexKind, Registry, VarRef};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use tracing::trace;

pub const DEFAULT_MAX_DEPTH: usize = 2048;

/// Offsets tried, in order, when a relative reference has no equation of its own.
const LAG_SEARCH: [i64; 9] = [-1, 1, -2, 2, -3, 3, -4, 4, -5];

/// Evaluation context for one transaction.
///
/// The cursor is passed explicitly: `calculate(target, step)` evaluates
/// `target` as seen from absolute step `step`.
pub struct Engine<'a> {
    registry: &'a Registry,
    declared: &'a [VarRef],
    cache: &'a HashMap<VarRef, Value>,
    ledger: &'a mut Ledger,
    in_progress: HashSet<(VarRef, i64)>,
    depth: usize,
    max_depth: usize,
}

impl<'a> Engine<'a> {
    pub fn new(
        registry: &'a Registry,
        declared: &'a [VarRef],
        cache: &'a HashMap<VarRef, Value>,
        ledger: &'a mut Ledger,
    ) -> Self {
        Self {
            registry,
            declared,
            cache,
            ledger,
            in_progress: HashSet::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Stores a value computed for `reference` at absolute step `index`.
    pub fn record(&mut self, reference: &VarRef, index: i64, value: f64) {
        self.ledger.insert(reference.name(), index, value);
    }

    pub fn calculate(&mut self, target: &VarRef, step: i64) -> Result<Value, ComputationError> {
        let key = (target.clone(), step);
        if self.in_progress.contains(&key) {
            return Err(ComputationError::CycleDetected { reference: target.to_string(), step });
        }
        if self.depth >= self.max_depth {
            return Err(ComputationError::RecursionLimit {
                reference: target.to_string(),
                step,
                limit: self.max_depth,
            });
        }

        self.in_progress.insert(key.clone());
        self.depth += 1;
        let result = self.resolve(target, step);
        self.depth -= 1;
        self.in_progress.remove(&key);
        result
    }

    fn resolve(&mut self, target: &VarRef, step: i64) -> Result<Value, ComputationError> {
        // 1. Declared inputs come from the caller.
        if self.declared.contains(target) {
            return self
                .cache
                .get(target)
                .cloned()
                .ok_or_else(|| ComputationError::MissingInput(target.to_string()));
        }

        if let IndexKind::Sliced { lower, upper } = target.kind() {
            return self.slice(target, lower, upper, step);
        }

        // 2. Memo.
        if let Some(index) = target.resolve(step) {
            if let Some(v) = self.ledger.get(target.name(), index) {
                return Ok(Value::Scalar(v));
            }
        }

        // 3. A relative reference landing on a cell with its own equation
        //    (an initial condition) takes that equation.
        if target.is_relative() {
            let actual = target.actualize(step)?;
            if self.registry.has_equation(&actual) {
                return self.calculate(&actual, step);
            }
        }

        // 4. Exact equation.
        if self.registry.has_equation(target) {
            return self.evaluate_equation(target, step).map(Value::Scalar);
        }

        match target.kind() {
            IndexKind::Absolute(k) => {
                // An absolute cell is computed through the relative form defining it.
                if self.ledger.contains_step(k) {
                    if let Some(canonical) = self.registry.canonical_form(target.name()).cloned() {
                        let delay = canonical.delay().unwrap_or(0);
                        if let Some(at) = k.checked_sub(delay) {
                            trace!(target = %target, via = %canonical, "Absolute reference through canonical form");
                            return self.calculate(&canonical, at);
                        }
                    }
                }
            }
            IndexKind::Relative(delay) => {
                // 5. Lag search. Cells before the timeline start have nothing
                //    left to recurse into.
                let address = target.resolve(step);
                let before_start = match (self.ledger.span(), address) {
                    (Some((start, _)), Some(address)) => address < start,
                    _ => address.is_none(),
                };
                if !before_start {
                    for offset in LAG_SEARCH {
                        let Some(candidate_delay) = delay.checked_add(offset) else { continue };
                        let Some(at) = step.checked_sub(offset) else { continue };
                        let candidate = VarRef::relative(target.name(), candidate_delay);
                        if self.registry.has_equation(&candidate) {
                            trace!(target = %target, candidate = %candidate, step, "Lag search hit");
                            return self.calculate(&candidate, at);
                        }
                    }
                }
            }
            IndexKind::None | IndexKind::Sliced { .. } => {}
        }

        // 6. The time symbol.
        if target.is_time_symbol() {
            return Ok(Value::Scalar(step as f64));
        }

        Err(ComputationError::Unevaluable { reference: target.to_string(), step })
    }

    fn evaluate_equation(&mut self, target: &VarRef, step: i64) -> Result<f64, ComputationError> {
        let registry = self.registry;
        let equation = registry
            .equation_for(target)
            .ok_or_else(|| ComputationError::Unevaluable { reference: target.to_string(), step })?;

        let mut slots: SmallVec<[Value; 8]> = SmallVec::with_capacity(equation.inputs.len());
        for input in &equation.inputs {
            let value = self.calculate(input, step)?;
            if let (Value::Scalar(v), Some(index)) = (&value, input.resolve(step)) {
                if self.ledger.get(input.name(), index).is_none() {
                    self.ledger.insert(input.name(), index, *v);
                }
            }
            slots.push(value);
        }

        equation.calculate(&slots)
    }

    fn slice(
        &mut self,
        target: &VarRef,
        lower: Option<i64>,
        upper: Option<i64>,
        step: i64,
    ) -> Result<Value, ComputationError> {
        let span = self.ledger.span();
        let unevaluable = || ComputationError::Unevaluable { reference: target.to_string(), step };
        let lower = match lower {
            Some(l) => l,
            None => span.ok_or_else(unevaluable)?.0,
        };
        let upper = match upper {
            Some(u) => u,
            None => span.ok_or_else(unevaluable)?.1.saturating_add(1),
        };

        let mut values = Vec::new();
        for index in lower..upper {
            let cell = VarRef::absolute(target.name(), index);
            values.push(self.calculate(&cell, step)?.as_scalar()?);
        }
        Ok(Value::series(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::equation::Equation;
    use crate::store::ReferenceError;

    fn registry(lines: &[&str]) -> Registry {
        let mut reg = Registry::new();
        for line in lines {
            reg.add_equation(Equation::parse(line).unwrap());
        }
        reg
    }

    fn r(text: &str) -> VarRef { VarRef::parse(text).unwrap() }

    #[test]
    fn test_lag_search_reaches_forward_cell() {
        let reg = registry(&["X[t] = X[t-1] * 2", "X[0] = 1"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::for_span(0, 5);
        let mut engine = Engine::new(&reg, &[], &cache, &mut ledger);
        assert_eq!(engine.calculate(&r("X[t+2]"), 0), Ok(Value::Scalar(4.0)));
        assert_eq!(ledger.get("X", 0), Some(1.0));
        assert_eq!(ledger.get("X", 1), Some(2.0));
    }

    #[test]
    fn test_calculate_is_idempotent() {
        let reg = registry(&["F[0] = 0", "F[1] = 1", "F[t] = F[t-1] + F[t-2]"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::for_span(0, 12);
        let first = Engine::new(&reg, &[], &cache, &mut ledger).calculate(&r("F[12]"), 0);
        assert_eq!(first, Ok(Value::Scalar(144.0)));
        let snapshot = format!("{:?}", ledger);
        let second = Engine::new(&reg, &[], &cache, &mut ledger).calculate(&r("F[12]"), 0);
        assert_eq!(second, first);
        assert_eq!(format!("{:?}", ledger), snapshot);
    }

    #[test]
    fn test_declared_input_and_time_symbol() {
        let reg = registry(&["y = x * t"]);
        let declared = vec![r("x")];
        let cache = HashMap::from([(r("x"), Value::Scalar(3.0))]);
        let mut ledger = Ledger::new();
        let mut engine = Engine::new(&reg, &declared, &cache, &mut ledger);
        assert_eq!(engine.calculate(&r("y"), 4), Ok(Value::Scalar(12.0)));
    }

    #[test]
    fn test_missing_declared_input() {
        let reg = registry(&["y = x + 1"]);
        let declared = vec![r("x")];
        let cache = HashMap::new();
        let mut ledger = Ledger::new();
        let mut engine = Engine::new(&reg, &declared, &cache, &mut ledger);
        assert_eq!(engine.calculate(&r("y"), 0), Err(ComputationError::MissingInput("x".into())));
    }

    #[test]
    fn test_slice_evaluates_each_cell() {
        let reg = registry(&["X[t] = X[t-1] + 1", "X[0] = 1", "s = sum(X[0:3])", "m = max(X[:])"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::for_span(0, 4);
        let mut engine = Engine::new(&reg, &[], &cache, &mut ledger);
        assert_eq!(engine.calculate(&r("s"), 0), Ok(Value::Scalar(6.0)));
        assert_eq!(engine.calculate(&r("m"), 0), Ok(Value::Scalar(5.0)));
    }

    #[test]
    fn test_unevaluable_reference() {
        let reg = registry(&["y = z + 1"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::new();
        let mut engine = Engine::new(&reg, &[], &cache, &mut ledger);
        assert_eq!(
            engine.calculate(&r("y"), 0),
            Err(ComputationError::Unevaluable { reference: "z".into(), step: 0 })
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let reg = registry(&["a = b + 1", "b = a * 2"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::new();
        let mut engine = Engine::new(&reg, &[], &cache, &mut ledger);
        assert!(matches!(engine.calculate(&r("a"), 0), Err(ComputationError::CycleDetected { .. })));
    }

    #[test]
    fn test_recursion_limit() {
        let reg = registry(&["X[t] = X[t-1] + 1", "X[0] = 0"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::for_span(0, 100);
        let mut engine = Engine::new(&reg, &[], &cache, &mut ledger).with_max_depth(16);
        assert!(matches!(
            engine.calculate(&r("X[100]"), 0),
            Err(ComputationError::RecursionLimit { limit: 16, .. })
        ));
    }

    #[test]
    fn test_lag_search_stops_before_the_timeline() {
        let reg = registry(&["X[t] = X[t-1] + 1"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::for_span(0, 3);
        let mut engine = Engine::new(&reg, &[], &cache, &mut ledger);
        assert!(matches!(engine.calculate(&r("X[t]"), 2), Err(ComputationError::Unevaluable { .. })));
    }

    #[test]
    fn test_lag_search_reaches_past_the_timeline_end() {
        let reg = registry(&["Y[0] = 0", "Y[t] = Z[t+1]", "Z[t] = t * 2"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::for_span(0, 3);
        let mut engine = Engine::new(&reg, &[], &cache, &mut ledger);
        assert_eq!(engine.calculate(&r("Y[3]"), 0), Ok(Value::Scalar(8.0)));
        assert_eq!(engine.calculate(&r("Z[t+1]"), 3), Ok(Value::Scalar(8.0)));
    }

    #[test]
    fn test_overflowing_lag_is_an_error() {
        let reg = registry(&["y = X[t+9223372036854775807]"]);
        let cache = HashMap::new();
        let mut ledger = Ledger::for_span(0, 3);
        let mut engine = Engine::new(&reg, &[], &cache, &mut ledger);
        assert!(matches!(
            engine.calculate(&r("y"), 1),
            Err(ComputationError::Reference(ReferenceError::IndexOverflow { .. }))
        ));
    }
}
