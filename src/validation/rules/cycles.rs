//! Validation rule for self-referencing definitions.

use crate::store::{Registry, VarRef};
use crate::validation::error::{ValidationError, ValidationErrorType};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Builds the dependency graph over exact reference texts (input -> output)
/// and reports every strongly connected component, including self-loops.
///
/// Links through time (`X[t]` reading `X[t-1]`) are different references and
/// never form a cycle here. Declared inputs are read from the caller, so their
/// equations never run and contribute no edges.
pub(crate) fn validate_definitions(registry: &Registry, declared: &[VarRef]) -> Vec<ValidationError> {
    let mut graph: DiGraph<&VarRef, ()> = DiGraph::new();
    let mut nodes: HashMap<&VarRef, NodeIndex> = HashMap::new();

    for equation in &registry.equations {
        for output in &equation.outputs {
            // Only the equation currently defining the output counts.
            if registry.equation_for(output).map(|e| e.text.as_str()) != Some(equation.text.as_str()) {
                continue;
            }
            if declared.contains(output) {
                continue;
            }
            let to = *nodes.entry(output).or_insert_with(|| graph.add_node(output));
            for input in &equation.inputs {
                let from = *nodes.entry(input).or_insert_with(|| graph.add_node(input));
                graph.update_edge(from, to, ());
            }
        }
    }

    tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|mut scc| {
            scc.sort();
            let members: Vec<&str> = scc.iter().map(|&n| graph[n].text()).collect();
            ValidationError {
                subject: members[0].to_string(),
                error_type: ValidationErrorType::CyclicDefinition,
                message: format!("Cyclic definition: {}", members.join(" -> ")),
            }
        })
        .collect()
}
