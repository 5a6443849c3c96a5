use crate::compute::{Equation, Value};
use crate::model::Model;
use crate::store::VarRef;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the dependency tree of `target` as seen from the model's current
/// step, with the values currently stored. Cells reached twice are printed
/// once and referenced afterwards.
pub fn format_trace(model: &Model, target: &VarRef) -> String {
    let mut tracer = Tracer { model, visited_at_level: HashMap::new(), output: String::new() };

    let _ = writeln!(tracer.output, "AUDIT TRACE for '{}' at t={}:", target, model.current_step());
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    tracer.trace_node(target, model.current_step(), 1, "");
    tracer.output
}

struct Tracer<'a> {
    model: &'a Model,
    visited_at_level: HashMap<String, usize>,
    output: String,
}

/// The equation producing a reference, the form it was found under, and the
/// step it is evaluated at.
struct Definition<'a> {
    equation: &'a Equation,
    via: Option<VarRef>,
    step: i64,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, reference: &VarRef, step: i64, level: usize, prefix: &str) {
        let key = match reference.resolve(step) {
            Some(index) => format!("{}[{}]", reference.name(), index),
            None => format!("{}@{}", reference, step),
        };
        if let Some(&first_seen) = self.visited_at_level.get(&key) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(key, level);

        let line_header = format!("[L{}] {}{}", level, reference, self.format_value(reference, step));

        if self.model.declared_inputs().contains(reference) {
            let _ = writeln!(self.output, "{}{} -> Input", prefix, line_header);
            return;
        }
        if reference.is_time_symbol() {
            let _ = writeln!(self.output, "{}{} -> Time", prefix, line_header);
            return;
        }
        if reference.is_sliced() {
            let _ = writeln!(self.output, "{}{} -> Range", prefix, line_header);
            return;
        }

        match self.definition(reference, step) {
            Some(def) => {
                let rhs = def.equation.text.split_once('=').map_or("", |(_, r)| r.trim());
                match &def.via {
                    Some(via) => {
                        let _ = writeln!(self.output, "{}{} = {}  (via {} at t={})", prefix, line_header, rhs, via, def.step);
                    }
                    None => {
                        let _ = writeln!(self.output, "{}{} = {}", prefix, line_header, rhs);
                    }
                }
                self.recurse_children(prefix, &def.equation.inputs, def.step, level);
            }
            None => {
                let _ = writeln!(self.output, "{}{}", prefix, line_header);
            }
        }
    }

    fn recurse_children(&mut self, prefix: &str, children: &[VarRef], step: i64, level: usize) {
        let stem = self.build_child_stem(prefix);
        for (i, child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            let full_prefix = format!("{}{}", stem, connector);
            self.trace_node(child, step, level + 1, &full_prefix);
        }
    }

    fn definition(&self, reference: &VarRef, step: i64) -> Option<Definition<'a>> {
        let registry = self.model.registry();
        if reference.is_relative() {
            let actual = reference.actualize(step).ok()?;
            if let Some(equation) = registry.equation_for(&actual) {
                return Some(Definition { equation, via: Some(actual), step });
            }
        }
        if let Some(equation) = registry.equation_for(reference) {
            return Some(Definition { equation, via: None, step });
        }

        let index = reference.resolve(step)?;
        if !self.model.ledger().contains_step(index) {
            return None;
        }
        let canonical = registry.canonical_form(reference.name())?;
        let equation = registry.equation_for(canonical)?;
        let at = index.checked_sub(canonical.delay().unwrap_or(0))?;
        Some(Definition { equation, via: Some(canonical.clone()), step: at })
    }

    fn format_value(&self, reference: &VarRef, step: i64) -> String {
        if let Some(value) = self.model.input_value(reference) {
            return match value {
                Value::Scalar(s) => format!(" [{:.3}]", s),
                Value::Series(vec) => format!(" [len={}]", vec.len()),
            };
        }
        if reference.is_time_symbol() {
            return format!(" [{}]", step);
        }
        match reference.resolve(step).and_then(|index| self.model.ledger().get(reference.name(), index)) {
            Some(v) => format!(" [{:.3}]", v),
            None => " [?]".to_string(),
        }
    }

    fn build_child_stem(&self, current_prefix: &str) -> String {
        current_prefix.replace("`--", "   ").replace("|--", "|  ")
    }
}
