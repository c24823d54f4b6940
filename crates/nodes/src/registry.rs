//! Node type registry: maps `node_type` strings to executor implementations.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::ExecutableNode;

/// Lookup from a node type key (and its aliases) to the executor handling it.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    executors: HashMap<String, Arc<dyn ExecutableNode>>,
    aliases: HashMap<String, String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `node` under the canonical key `node_type`, replacing any
    /// previous registration.
    pub fn register(&mut self, node_type: impl Into<String>, node: Arc<dyn ExecutableNode>) -> &mut Self {
        let node_type = node_type.into();
        debug!(node_type = %node_type, "registering node type");
        self.executors.insert(node_type, node);
        self
    }

    /// Make `alias` resolve to the executor registered as `canonical`.
    pub fn alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), canonical.into());
        self
    }

    /// The canonical key for `node_type`, following aliases.
    pub fn canonical<'a>(&'a self, node_type: &'a str) -> &'a str {
        self.aliases.get(node_type).map(String::as_str).unwrap_or(node_type)
    }

    /// Resolve `node_type` (canonical key or alias) to its executor.
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn ExecutableNode>> {
        self.executors.get(self.canonical(node_type)).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(self.canonical(node_type))
    }

    /// Canonical keys of every registered node type, sorted.
    pub fn node_types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.node_types())
            .field("aliases", &self.aliases)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;
    use serde_json::json;

    #[test]
    fn aliases_resolve_to_the_canonical_executor() {
        let mut registry = NodeRegistry::new();
        registry
            .register("create_contact", Arc::new(MockNode::returning("c", json!({}))))
            .alias("action-create-contact", "create_contact");

        assert!(registry.contains("create_contact"));
        assert!(registry.contains("action-create-contact"));
        assert_eq!(registry.canonical("action-create-contact"), "create_contact");
        assert!(registry.get("send_email").is_none());
        assert_eq!(registry.node_types(), vec!["create_contact"]);
    }
}
