use std::collections::HashSet;

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::error::SynthKitError;
use crate::graph::dag::DependencyGraph;

/// Build a `CircularDependency` error for the tables Kahn's algorithm could
/// not place.
///
/// Leftover nodes include tables that merely depend on a cycle; only the
/// members of non-trivial strongly connected components (and required
/// self-references) are named, in schema order.
pub fn circular_dependency_error(
    graph: &DependencyGraph,
    remaining: &[NodeIndex],
) -> SynthKitError {
    let mut cyclic = cyclic_nodes(graph);
    cyclic.retain(|n| remaining.contains(n));
    if cyclic.is_empty() {
        cyclic = remaining.to_vec();
    }
    cyclic.sort_by_key(|n| n.index());

    let tables: Vec<&str> = cyclic.iter().map(|&n| graph.table_name(n)).collect();
    SynthKitError::CircularDependency {
        tables: tables.join(", "),
    }
}

/// All nodes that sit on a cycle of required foreign keys.
pub fn cyclic_nodes(graph: &DependencyGraph) -> Vec<NodeIndex> {
    let mut nodes: HashSet<NodeIndex> = HashSet::new();

    for scc in tarjan_scc(&graph.graph) {
        if scc.len() > 1 {
            nodes.extend(scc);
        }
    }

    // Single-node SCCs only count when the table references itself.
    for edge in graph.graph.edge_references() {
        if edge.source() == edge.target() {
            nodes.insert(edge.source());
        }
    }

    nodes.into_iter().collect()
}
