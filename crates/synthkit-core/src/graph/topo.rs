use std::cmp::Reverse;
use std::collections::BinaryHeap;

use petgraph::Direction;

use crate::error::Result;
use crate::graph::cycle::circular_dependency_error;
use crate::graph::dag::DependencyGraph;
use crate::schema::types::ExperimentSchema;

/// Tables in the order they must be generated and loaded (parents first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOrder {
    pub tables: Vec<String>,
}

/// Resolve the generation order of an experiment's tables.
pub fn resolve_order(schema: &ExperimentSchema) -> Result<GenerationOrder> {
    let graph = DependencyGraph::from_schema(schema);
    topological_sort(&graph)
}

/// Kahn's algorithm over the dependency graph.
///
/// Ready tables are taken lowest schema position first, so the order is
/// stable across runs. If tables remain once nothing is ready, the required
/// foreign keys among them form a cycle and no order exists.
pub fn topological_sort(graph: &DependencyGraph) -> Result<GenerationOrder> {
    let mut in_degree: Vec<usize> = graph
        .graph
        .node_indices()
        .map(|n| graph.graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    // Node indices follow schema order, so a min-heap on the index is the
    // tie-breaker.
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut tables = Vec::with_capacity(graph.table_count());
    while let Some(Reverse(idx)) = ready.pop() {
        let node = petgraph::graph::NodeIndex::new(idx);
        tables.push(graph.table_name(node).to_string());

        // One decrement per edge: parallel FK edges between the same pair of
        // tables each counted towards the in-degree.
        for child in graph.graph.neighbors_directed(node, Direction::Outgoing) {
            let d = &mut in_degree[child.index()];
            *d -= 1;
            if *d == 0 {
                ready.push(Reverse(child.index()));
            }
        }
    }

    if tables.len() < graph.table_count() {
        let remaining: Vec<_> = graph
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] > 0)
            .collect();
        return Err(circular_dependency_error(graph, &remaining));
    }

    Ok(GenerationOrder { tables })
}
