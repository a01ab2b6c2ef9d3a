use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::schema::types::ExperimentSchema;

/// A directed graph of hard generation dependencies between tables.
/// Edges point from parent to child: A → B means B holds a required
/// foreign key into A, so A must be generated first.
pub struct DependencyGraph {
    pub graph: DiGraph<String, EdgeInfo>,
    pub node_indices: HashMap<String, NodeIndex>,
}

/// Information about an edge (a required foreign key).
#[derive(Debug, Clone)]
pub struct EdgeInfo {
    /// FK column in the dependent (child) table
    pub source_column: String,
    /// Referenced column in the parent table
    pub referenced_column: String,
}

impl DependencyGraph {
    /// Build the dependency graph from an experiment schema.
    ///
    /// Nodes are added in declaration order, so `NodeIndex::index()` equals the
    /// table's schema position. Nullable foreign keys are left out entirely.
    pub fn from_schema(schema: &ExperimentSchema) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for table in &schema.tables {
            let idx = graph.add_node(table.name.clone());
            node_indices.insert(table.name.clone(), idx);
        }

        for table in &schema.tables {
            for (column, fk) in table.foreign_keys() {
                if fk.nullable {
                    continue;
                }
                if let (Some(&parent), Some(&child)) = (
                    node_indices.get(&fk.table),
                    node_indices.get(&table.name),
                ) {
                    graph.add_edge(
                        parent,
                        child,
                        EdgeInfo {
                            source_column: column.name.clone(),
                            referenced_column: fk.column.clone(),
                        },
                    );
                }
            }
        }

        Self {
            graph,
            node_indices,
        }
    }

    /// Get the table name for a node index.
    pub fn table_name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx]
    }

    /// Get node index for a table name.
    pub fn node_index(&self, table_name: &str) -> Option<NodeIndex> {
        self.node_indices.get(table_name).copied()
    }

    /// Get the number of tables.
    pub fn table_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of required FK edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
