//! DAG validation and scheduling — run this before executing a workflow.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the graph.
//! 2. Every edge must reference valid node IDs (both `source` and `target`).
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! Ordering uses Kahn's algorithm with a FIFO queue. Ties are broken by the
//! nodes' declared order: roots are seeded in that order, and successors
//! released by the same node are enqueued in that order too. An unchanged
//! graph therefore always yields the same order.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::ValidationError;
use crate::models::WorkflowGraph;

/// Index form of a validated graph. Node indices follow declaration order.
#[derive(Debug, Clone)]
pub struct Dag {
    ids: Vec<String>,
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    order: Vec<usize>,
}

impl Dag {
    /// Validate the graph and compute its execution order.
    ///
    /// # Errors
    /// - [`ValidationError::DuplicateNodeId`] if two nodes share an ID.
    /// - [`ValidationError::UnknownNodeReference`] if an edge references a missing node.
    /// - [`ValidationError::CycleDetected`] if the graph is not acyclic.
    pub fn build(graph: &WorkflowGraph) -> Result<Self, ValidationError> {
        // -------------------------------------------------------------------
        // 1. Ensure node IDs are unique
        // -------------------------------------------------------------------
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(graph.nodes.len());
        for (i, node) in graph.nodes.iter().enumerate() {
            if index.insert(node.id.as_str(), i).is_some() {
                return Err(ValidationError::DuplicateNodeId(node.id.clone()));
            }
        }

        // -------------------------------------------------------------------
        // 2. Validate edge endpoints, building adjacency as we go
        // -------------------------------------------------------------------
        let n = graph.nodes.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree: Vec<usize> = vec![0; n];

        for edge in &graph.edges {
            let from = *index.get(edge.source.as_str()).ok_or_else(|| {
                ValidationError::UnknownNodeReference {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                    side: "source",
                }
            })?;
            let to = *index.get(edge.target.as_str()).ok_or_else(|| {
                ValidationError::UnknownNodeReference {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.clone(),
                    side: "target",
                }
            })?;
            successors[from].push(to);
            in_degree[to] += 1;
        }
        for next in &mut successors {
            next.sort_unstable();
        }

        // -------------------------------------------------------------------
        // 3. Topological sort (Kahn's algorithm)
        // -------------------------------------------------------------------
        let mut remaining = in_degree.clone();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &successors[node] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        // Anything left unvisited sits on or behind a cycle.
        if order.len() != n {
            let placed: HashSet<usize> = order.iter().copied().collect();
            let nodes = (0..n)
                .filter(|i| !placed.contains(i))
                .map(|i| graph.nodes[i].id.clone())
                .collect();
            return Err(ValidationError::CycleDetected { nodes });
        }

        Ok(Self {
            ids: graph.nodes.iter().map(|node| node.id.clone()).collect(),
            successors,
            in_degree,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Node indices in execution order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Node IDs in execution order.
    pub fn ordered_ids(&self) -> Vec<String> {
        self.order.iter().map(|&i| self.ids[i].clone()).collect()
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    /// Direct successors of `index`, in declared node order (an edge
    /// declared twice appears twice).
    pub fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    /// Number of incoming edges of `index`.
    pub fn in_degree(&self, index: usize) -> usize {
        self.in_degree[index]
    }

    /// `true` if a directed path leads from `from` to `to`.
    pub fn reaches(&self, from: usize, to: usize) -> bool {
        let mut seen = vec![false; self.ids.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            for &next in &self.successors[node] {
                if next == to {
                    return true;
                }
                if !seen[next] {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }
        false
    }
}

/// Check the graph without keeping the schedule.
pub fn validate(graph: &WorkflowGraph) -> Result<(), ValidationError> {
    Dag::build(graph).map(|_| ())
}

/// Validate the graph and return node IDs in topological execution order.
pub fn compute_execution_order(graph: &WorkflowGraph) -> Result<Vec<String>, ValidationError> {
    Dag::build(graph).map(|dag| dag.ordered_ids())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, NodeDefinition};

    fn make_node(id: &str) -> NodeDefinition {
        NodeDefinition::new(id, "mock")
    }

    fn make_graph(ids: &[&str], edges: &[(&str, &str)]) -> WorkflowGraph {
        WorkflowGraph::new(
            ids.iter().map(|id| make_node(id)).collect(),
            edges.iter().map(|(a, b)| Edge::new(*a, *b)).collect(),
        )
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // A → B → C
        let graph = make_graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        assert_eq!(compute_execution_order(&graph).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn linear_order_ignores_declaration_order() {
        let graph = make_graph(&["c", "a", "b"], &[("a", "b"), ("b", "c")]);
        assert_eq!(compute_execution_order(&graph).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn fan_out_siblings_follow_declared_node_order() {
        // A → C, A → B, with B declared before C.
        let graph = make_graph(&["a", "b", "c"], &[("a", "c"), ("a", "b")]);
        let first = compute_execution_order(&graph).unwrap();
        assert_eq!(first, vec!["a", "b", "c"]);

        for _ in 0..20 {
            assert_eq!(compute_execution_order(&graph).unwrap(), first);
        }
    }

    #[test]
    fn independent_roots_keep_insertion_order() {
        let graph = make_graph(&["z", "m", "a"], &[]);
        assert_eq!(compute_execution_order(&graph).unwrap(), vec!["z", "m", "a"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let graph = make_graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        assert_eq!(compute_execution_order(&graph).unwrap(), vec!["a", "b", "c", "d"]);

        let dag = Dag::build(&graph).unwrap();
        assert_eq!(dag.in_degree(3), 2);
        assert!(dag.reaches(0, 3));
        assert!(!dag.reaches(1, 2));
    }

    #[test]
    fn disconnected_chains_are_all_scheduled() {
        let graph = make_graph(&["a1", "b1", "a2", "b2"], &[("a1", "a2"), ("b1", "b2")]);
        assert_eq!(compute_execution_order(&graph).unwrap(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let graph = make_graph(&["a", "a"], &[]);
        assert_eq!(validate(&graph), Err(ValidationError::DuplicateNodeId("a".into())));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let graph = make_graph(&["a"], &[("a", "ghost")]);
        assert!(matches!(
            validate(&graph),
            Err(ValidationError::UnknownNodeReference { node_id, side: "target", .. }) if node_id == "ghost"
        ));

        let graph = make_graph(&["a"], &[("ghost", "a")]);
        assert!(matches!(
            validate(&graph),
            Err(ValidationError::UnknownNodeReference { side: "source", .. })
        ));
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let graph = make_graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert_eq!(
            compute_execution_order(&graph),
            Err(ValidationError::CycleDetected { nodes: vec!["a".into(), "b".into()] })
        );
    }

    #[test]
    fn cycle_is_reported_not_truncated() {
        // root → A → B → C → A, plus an unrelated node
        let graph = make_graph(
            &["root", "a", "b", "c", "solo"],
            &[("root", "a"), ("a", "b"), ("b", "c"), ("c", "a")],
        );
        match compute_execution_order(&graph) {
            Err(ValidationError::CycleDetected { nodes }) => assert_eq!(nodes, vec!["a", "b", "c"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = make_graph(&["a"], &[("a", "a")]);
        assert!(matches!(validate(&graph), Err(ValidationError::CycleDetected { .. })));
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let graph = make_graph(&["solo"], &[]);
        assert_eq!(compute_execution_order(&graph).unwrap(), vec!["solo"]);
    }

    #[test]
    fn empty_graph_is_valid() {
        let dag = Dag::build(&WorkflowGraph::default()).unwrap();
        assert!(dag.is_empty());
    }
}
