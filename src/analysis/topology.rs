//! Derives the simulation plan of a model: the timeline of absolute steps and
//! the per-step work list of relatively-indexed references.

use crate::compute::MAX_STEPS;
use crate::store::{Registry, VarRef};
use crate::validation::ModelError;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Inclusive range of absolute steps covered by a dynamic model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub start: i64,
    pub end: i64,
}

impl Timeline {
    pub fn steps(&self) -> std::ops::RangeInclusive<i64> { self.start..=self.end }
    pub fn len(&self) -> usize {
        usize::try_from(self.end.saturating_sub(self.start)).map_or(0, |width| width.saturating_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationPlan {
    /// `None` for a static model.
    pub timeline: Option<Timeline>,
    /// References evaluated at every step, in schedule order.
    pub step_work_list: Vec<VarRef>,
    /// Spread between the largest and smallest delay of the work list.
    pub clock_period: i64,
}

impl SimulationPlan {
    pub fn build(registry: &Registry, targets: &[VarRef], declared: &[VarRef]) -> Result<Self, ModelError> {
        let timeline = build_timeline(registry, targets, declared)?;
        let step_work_list = match timeline {
            Some(_) => build_step_work_list(registry, targets)?,
            None => Vec::new(),
        };
        let clock_period = clock_period(&step_work_list);
        debug!(?timeline, work_list = step_work_list.len(), clock_period, "Simulation plan built");
        Ok(Self { timeline, step_work_list, clock_period })
    }

    pub fn is_static(&self) -> bool { self.timeline.is_none() }
}

/// Finds the absolute anchors reachable from the targets, expanding through
/// equation inputs until some appear. A model with none is static.
pub fn build_timeline(
    registry: &Registry,
    targets: &[VarRef],
    declared: &[VarRef],
) -> Result<Option<Timeline>, ModelError> {
    let mut candidates: Vec<VarRef> = targets.to_vec();
    let mut seen: HashSet<VarRef> = candidates.iter().cloned().collect();

    let end = loop {
        if let Some(max) = candidates.iter().flat_map(VarRef::anchors).max() {
            break max;
        }
        let mut next = Vec::new();
        for candidate in &candidates {
            let Some(equation) = registry.equation_for(candidate) else { continue };
            for input in &equation.inputs {
                if !declared.contains(input) && seen.insert(input.clone()) {
                    next.push(input.clone());
                }
            }
        }
        if next.is_empty() {
            return Ok(None);
        }
        candidates = next;
    };

    let start = declared
        .iter()
        .chain(registry.outputs())
        .flat_map(VarRef::anchors)
        .min()
        .ok_or_else(|| {
            let subject = candidates.iter().find(|c| !c.anchors().is_empty()).unwrap_or(&candidates[0]);
            ModelError::NoInitialCondition(subject.name().to_string())
        })?;

    let too_wide = end
        .checked_sub(start)
        .and_then(|width| usize::try_from(width).ok())
        .map_or(true, |width| width >= MAX_STEPS);
    if start > end || too_wide {
        return Err(ModelError::InfeasibleSimulation { start, end });
    }
    Ok(Some(Timeline { start, end }))
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Schedules every relatively-indexed equation reachable from the targets'
/// time-indexed variables.
pub fn build_step_work_list(registry: &Registry, targets: &[VarRef]) -> Result<Vec<VarRef>, ModelError> {
    let mut leaves = Vec::new();
    for target in targets.iter().filter(|t| t.is_indexed()) {
        push_unique(&mut leaves, target.name());
    }
    if leaves.is_empty() {
        for target in targets {
            let Some(equation) = registry.equation_for(target) else { continue };
            for input in equation.inputs.iter().filter(|i| i.is_indexed()) {
                push_unique(&mut leaves, input.name());
            }
        }
    }
    if leaves.is_empty() {
        return Err(ModelError::NoLeaves);
    }

    let mut work_list: Vec<VarRef> = Vec::new();
    let mut seen: HashSet<VarRef> = HashSet::new();
    let mut stack: Vec<VarRef> = Vec::new();

    let push_relative_inputs = |reference: &VarRef, seen: &mut HashSet<VarRef>, stack: &mut Vec<VarRef>| {
        if let Some(equation) = registry.equation_for(reference) {
            for input in equation.inputs.iter().filter(|i| i.is_relative()) {
                if seen.insert(input.clone()) {
                    stack.push(input.clone());
                }
            }
        }
    };

    for leaf in &leaves {
        for reference in registry.references_named(leaf) {
            if reference.is_relative() && registry.has_equation(reference) && seen.insert(reference.clone()) {
                stack.push(reference.clone());
                push_relative_inputs(reference, &mut seen, &mut stack);
            }
        }

        while let Some(reference) = stack.pop() {
            if !registry.has_equation(&reference) {
                continue;
            }
            push_relative_inputs(&reference, &mut seen, &mut stack);
            if !work_list.contains(&reference) {
                work_list.push(reference);
            }
        }
    }

    Ok(work_list)
}

pub fn clock_period(work_list: &[VarRef]) -> i64 {
    let delays = work_list.iter().filter_map(VarRef::delay);
    match (delays.clone().max(), delays.min()) {
        (Some(max), Some(min)) => max.saturating_sub(min),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::equation::Equation;

    fn registry(lines: &[&str]) -> Registry {
        let mut reg = Registry::new();
        for line in lines {
            reg.add_equation(Equation::parse(line).unwrap());
        }
        reg
    }

    fn refs(texts: &[&str]) -> Vec<VarRef> {
        texts.iter().map(|t| VarRef::parse(t).unwrap()).collect()
    }

    fn texts(list: &[VarRef]) -> Vec<&str> { list.iter().map(VarRef::text).collect() }

    const FIBONACCI: &[&str] = &["F[0] = 0", "F[1] = 1", "F[t] = F[t-1] + F[t-2]"];

    #[test]
    fn test_fibonacci_plan() {
        let reg = registry(FIBONACCI);
        let plan = SimulationPlan::build(&reg, &refs(&["F[12]", "F[11]"]), &[]).unwrap();
        assert_eq!(plan.timeline, Some(Timeline { start: 0, end: 12 }));
        assert_eq!(texts(&plan.step_work_list), vec!["F[t]"]);
        assert_eq!(plan.clock_period, 0);
    }

    #[test]
    fn test_static_model_has_no_timeline() {
        let reg = registry(&["y1 = x1 + x2"]);
        let plan = SimulationPlan::build(&reg, &refs(&["y1"]), &refs(&["x1", "x2"])).unwrap();
        assert!(plan.is_static());
        assert!(plan.step_work_list.is_empty());
    }

    #[test]
    fn test_anchors_found_through_equation_inputs() {
        let reg = registry(&["y = X[5] * 2", "X[t] = X[t-1] + u", "X[0] = 1"]);
        let timeline = build_timeline(&reg, &refs(&["y"]), &refs(&["u"])).unwrap();
        assert_eq!(timeline, Some(Timeline { start: 0, end: 5 }));
    }

    #[test]
    fn test_declared_inputs_start_the_timeline() {
        let reg = registry(&["X[t] = X[t-1] + 1"]);
        let timeline = build_timeline(&reg, &refs(&["X[4]"]), &refs(&["X[-2]"])).unwrap();
        assert_eq!(timeline, Some(Timeline { start: -2, end: 4 }));
    }

    #[test]
    fn test_missing_initial_condition() {
        let reg = registry(&["X[t] = X[t-1] + 1"]);
        let err = build_timeline(&reg, &refs(&["X[5]"]), &[]).unwrap_err();
        assert!(matches!(err, ModelError::NoInitialCondition(name) if name == "X"));
    }

    #[test]
    fn test_inverted_range_is_infeasible() {
        let reg = registry(&["X[5] = 1", "X[t] = X[t-1] + 1"]);
        let err = build_timeline(&reg, &refs(&["X[2]"]), &[]).unwrap_err();
        assert!(matches!(err, ModelError::InfeasibleSimulation { start: 5, end: 2 }));
    }

    #[test]
    fn test_unaddressable_range_is_infeasible() {
        let reg = registry(&["X[-9223372036854775808] = 1", "X[t] = X[t-1] + 1"]);
        let err = build_timeline(&reg, &refs(&["X[9223372036854775807]"]), &[]).unwrap_err();
        assert!(matches!(err, ModelError::InfeasibleSimulation { start: i64::MIN, end: i64::MAX }));

        let reg = registry(&["X[0] = 1", "X[t] = X[t-1] + 1"]);
        assert!(build_timeline(&reg, &refs(&["X[100000000]"]), &[]).is_err());
    }

    #[test]
    fn test_work_list_schedules_dependencies_and_period() {
        let reg = registry(&["Y[t] = X[t-1] + Z[t+1]", "X[t] = X[t-1] * 2", "Z[t+1] = t", "X[0] = 1"]);
        let list = build_step_work_list(&reg, &refs(&["Y[3]"])).unwrap();
        assert_eq!(texts(&list), vec!["Z[t+1]", "Y[t]"]);
        assert_eq!(clock_period(&list), 1);
    }

    #[test]
    fn test_leaves_from_target_inputs() {
        let reg = registry(&["y = X[3] + 1", "X[t] = X[t-1] + 1", "X[0] = 0"]);
        let list = build_step_work_list(&reg, &refs(&["y"])).unwrap();
        assert_eq!(texts(&list), vec!["X[t]"]);
    }

    #[test]
    fn test_no_leaves() {
        let reg = registry(&["y = x + 1"]);
        assert!(matches!(build_step_work_list(&reg, &refs(&["y"])), Err(ModelError::NoLeaves)));
    }

    #[test]
    fn test_plan_serializes_reference_texts() {
        let reg = registry(FIBONACCI);
        let plan = SimulationPlan::build(&reg, &refs(&["F[12]"]), &[]).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["timeline"]["start"], 0);
        assert_eq!(json["step_work_list"][0], "F[t]");
    }
}
