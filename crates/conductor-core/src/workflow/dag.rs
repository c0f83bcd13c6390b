//! DAG builder, cycle detection, and parallel wave computation.
//!
//! Uses `petgraph` to model step dependencies as a directed graph. Topological
//! sort detects cycles, and depth-based grouping produces parallel execution
//! waves where all steps in a wave can run concurrently. The engine schedules
//! from a ready set rather than waves; waves are used for plan previews.

use std::collections::{BTreeSet, HashMap};

use conductor_types::workflow::{StepDefinition, StepId, WorkflowDefinition};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::definition::DefinitionError;

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

/// Build a directed graph with an edge from each dependency to its dependent.
///
/// Fails on dependency entries that name a step not in the definition.
fn build_graph(
    def: &WorkflowDefinition,
) -> Result<(DiGraph<&str, ()>, HashMap<&str, NodeIndex>), DefinitionError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let id_to_idx: HashMap<&str, NodeIndex> = def
        .steps
        .iter()
        .map(|s| (s.id.as_str(), graph.add_node(s.id.as_str())))
        .collect();

    for (step_id, deps) in &def.dependencies {
        let to_idx = *id_to_idx.get(step_id.as_str()).ok_or_else(|| {
            DefinitionError::UnknownDependency(format!(
                "dependencies declared for unknown step '{step_id}'"
            ))
        })?;
        for dep in deps {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                DefinitionError::UnknownDependency(format!(
                    "step '{step_id}' depends on unknown step '{dep}'"
                ))
            })?;
            graph.add_edge(*from_idx, to_idx, ());
        }
    }

    Ok((graph, id_to_idx))
}

fn sorted_nodes<'a>(graph: &DiGraph<&'a str, ()>) -> Result<Vec<NodeIndex>, DefinitionError> {
    toposort(graph, None).map_err(|cycle| {
        let node_id = graph[cycle.node_id()];
        DefinitionError::CycleDetected(format!("cycle detected involving step '{node_id}'"))
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that the dependency map forms a DAG over existing steps.
pub fn validate_dag(def: &WorkflowDefinition) -> Result<(), DefinitionError> {
    let (graph, _) = build_graph(def)?;
    sorted_nodes(&graph)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Execution plan (wave computation)
// ---------------------------------------------------------------------------

/// Group a definition's steps into parallel waves.
///
/// Wave 0 holds the roots; every other step sits one wave after its deepest
/// dependency. Within a wave, steps keep their definition order.
pub fn build_execution_plan(
    def: &WorkflowDefinition,
) -> Result<Vec<Vec<&StepDefinition>>, DefinitionError> {
    if def.steps.is_empty() {
        return Ok(vec![]);
    }

    let (graph, _) = build_graph(def)?;
    let sorted = sorted_nodes(&graph)?;

    let mut depths: HashMap<&str, usize> = HashMap::new();
    for node_idx in sorted {
        let step_id = graph[node_idx];
        let depth = def
            .dependencies
            .get(step_id)
            .into_iter()
            .flatten()
            .map(|dep| depths.get(dep.as_str()).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depths.insert(step_id, depth);
    }

    let max_depth = depths.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&StepDefinition>> = vec![vec![]; max_depth + 1];
    for step in &def.steps {
        waves[depths[step.id.as_str()]].push(step);
    }

    Ok(waves)
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// Reverse adjacency: step id -> steps that directly depend on it.
pub fn dependents_map(def: &WorkflowDefinition) -> HashMap<StepId, Vec<StepId>> {
    let mut map: HashMap<StepId, Vec<StepId>> = HashMap::new();
    for (step_id, deps) in &def.dependencies {
        for dep in deps {
            map.entry(dep.clone()).or_default().push(step_id.clone());
        }
    }
    map
}

/// Every step that transitively depends on `step_id`.
pub fn transitive_dependents(def: &WorkflowDefinition, step_id: &StepId) -> BTreeSet<StepId> {
    let dependents = dependents_map(def);
    let mut visited = BTreeSet::new();
    let mut stack = vec![step_id.clone()];

    while let Some(current) = stack.pop() {
        for next in dependents.get(&current).into_iter().flatten() {
            if visited.insert(next.clone()) {
                stack.push(next.clone());
            }
        }
    }

    visited
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
