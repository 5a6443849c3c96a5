use super::types::VarRef;
use crate::compute::equation::Equation;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EquationId(pub u32);

impl EquationId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// The equation library of a model.
///
/// Several outputs may share one equation (`a b = x + 1`), so equations are
/// stored once and outputs map to their id.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub equations: Vec<Equation>,
    by_output: HashMap<VarRef, EquationId>,

    // Base name -> every reference to it, in first-seen order.
    name_index: BTreeMap<String, Vec<VarRef>>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.equations.len() }

    pub fn add_equation(&mut self, equation: Equation) -> EquationId {
        let id = EquationId::new(self.equations.len());

        for r in equation.inputs.iter().chain(equation.outputs.iter()) {
            let known = self.name_index.entry(r.name().to_string()).or_default();
            if !known.contains(r) {
                known.push(r.clone());
            }
        }

        for output in &equation.outputs {
            if let Some(previous) = self.by_output.insert(output.clone(), id) {
                warn!(
                    output = %output,
                    replaced = %self.equations[previous.index()].text,
                    by = %equation.text,
                    "Output defined twice; the later equation wins"
                );
            }
        }

        self.equations.push(equation);
        id
    }

    /// The equation defining exactly this reference, if any.
    #[inline(always)]
    pub fn equation_for(&self, reference: &VarRef) -> Option<&Equation> {
        self.by_output.get(reference).map(|id| &self.equations[id.index()])
    }

    pub fn has_equation(&self, reference: &VarRef) -> bool {
        self.by_output.contains_key(reference)
    }

    /// Every known reference sharing `name`, in first-seen order.
    pub fn references_named(&self, name: &str) -> &[VarRef] {
        self.name_index.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first relatively-indexed form of `name` that has its own equation.
    /// Absolute references without an equation are computed through it.
    pub fn canonical_form(&self, name: &str) -> Option<&VarRef> {
        self.references_named(name)
            .iter()
            .find(|r| r.is_relative() && self.has_equation(r))
    }

    /// All defined outputs, in definition order.
    pub fn outputs(&self) -> impl Iterator<Item = &VarRef> {
        self.equations.iter().flat_map(|e| e.outputs.iter())
    }

    pub fn base_names(&self) -> impl Iterator<Item = &str> {
        self.name_index.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(lines: &[&str]) -> Registry {
        let mut reg = Registry::new();
        for line in lines {
            reg.add_equation(Equation::parse(line).unwrap());
        }
        reg
    }

    #[test]
    fn test_name_index_keeps_first_seen_order() {
        let reg = registry(&["F[0] = 0", "F[1] = 1", "F[t] = F[t-1] + F[t-2]"]);
        let texts: Vec<&str> = reg.references_named("F").iter().map(VarRef::text).collect();
        assert_eq!(texts, vec!["F[0]", "F[1]", "F[t-1]", "F[t-2]", "F[t]"]);
        assert!(reg.references_named("G").is_empty());
    }

    #[test]
    fn test_shared_outputs_map_to_one_equation() {
        let reg = registry(&["a b = x + 1"]);
        assert_eq!(reg.count(), 1);
        let a = reg.equation_for(&VarRef::parse("a").unwrap()).unwrap();
        let b = reg.equation_for(&VarRef::parse("b").unwrap()).unwrap();
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn test_canonical_form_skips_forms_without_equation() {
        let reg = registry(&["X[0] = 1", "X[t] = X[t-1] * 2"]);
        assert_eq!(reg.canonical_form("X").unwrap().text(), "X[t]");
        assert!(reg.canonical_form("Y").is_none());
    }

    #[test]
    fn test_redefinition_replaces_mapping() {
        let reg = registry(&["y = 1", "y = 2"]);
        let eq = reg.equation_for(&VarRef::parse("y").unwrap()).unwrap();
        assert_eq!(eq.text, "y = 2");
    }
}
