//! Fallback executor for node types nothing is registered for.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

/// Echoes its input back under `data` without side effects.
///
/// The output is nested rather than flattened so merging it can never clobber
/// keys written concurrently by other branches.
pub struct UnhandledNode {
    node_type: String,
}

impl UnhandledNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
        }
    }
}

#[async_trait]
impl ExecutableNode for UnhandledNode {
    async fn execute(
        &self,
        input: &ContextMap,
        _config: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        warn!(
            node_id = %ctx.node_id,
            node_type = %self.node_type,
            "no executor registered for node type, echoing input"
        );

        let mut out = Map::new();
        out.insert("nodeType".into(), self.node_type.clone().into());
        out.insert("status".into(), "unhandled".into());
        out.insert("data".into(), Value::Object(input.clone()));
        Ok(out)
    }
}
