//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow graph looks like
//! in memory. They deserialize from the editor's JSON (`type`, `source`,
//! `target`, camelCase keys).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single unit of work in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this graph (referenced by edges).
    pub id: String,
    /// Maps to a registered `ExecutableNode` implementation.
    #[serde(rename = "type", alias = "node_type", alias = "nodeType")]
    pub node_type: String,
    /// Node-specific parameters, in declared order. Semantics are owned by
    /// the node type.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Display name only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: Map::new(),
            label: None,
        }
    }

    /// Replace the config with the fields of `config` (non-objects clear it).
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// "`source` must execute before `target`". Edges carry no data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "from")]
    pub source: String,
    #[serde(alias = "to")]
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{source}->{target}"),
            source,
            target,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// Nodes plus precedence edges. Read-only for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// A chain `ids[0] → ids[1] → … → ids[n-1]` of `node_type` nodes.
    pub fn linear(node_type: &str, ids: &[&str]) -> Self {
        let nodes = ids.iter().map(|id| NodeDefinition::new(*id, node_type)).collect();
        let edges = ids.windows(2).map(|w| Edge::new(w[0], w[1])).collect();
        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

// ---------------------------------------------------------------------------
// RunMetadata
// ---------------------------------------------------------------------------

/// Identifiers for one run, seeded into the context before the first node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub workflow_id: String,
    pub tenant_id: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunMetadata {
    /// Fresh metadata with a new run id, started now.
    pub fn new(workflow_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            tenant_id: tenant_id.into(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_editor_json() {
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "nodes": [
                { "id": "t", "type": "trigger-form-submit", "label": "Form", "config": { "formId": "f1" } },
                { "id": "c", "type": "create_contact" }
            ],
            "edges": [ { "id": "e1", "source": "t", "target": "c" } ]
        }))
        .unwrap();

        assert_eq!(graph.nodes[0].node_type, "trigger-form-submit");
        assert_eq!(graph.nodes[0].label.as_deref(), Some("Form"));
        assert_eq!(graph.nodes[0].config["formId"], "f1");
        assert!(graph.nodes[1].config.is_empty());
        assert_eq!(graph.edges[0], Edge { id: "e1".into(), source: "t".into(), target: "c".into() });
    }

    #[test]
    fn accepts_from_to_edges() {
        let edge: Edge = serde_json::from_value(json!({ "from": "a", "to": "b" })).unwrap();
        assert_eq!(edge.source, "a");
        assert_eq!(edge.target, "b");
        assert_eq!(edge.id, "");
    }

    #[test]
    fn config_preserves_declared_key_order() {
        let node: NodeDefinition = serde_json::from_str(
            r#"{ "id": "n", "type": "x", "config": { "zeta": 1, "alpha": 2, "mid": 3 } }"#,
        )
        .unwrap();
        let keys: Vec<&str> = node.config.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }
}
