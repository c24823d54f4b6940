//! The `ExecutableNode` trait — the contract every node must fulfil.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::NodeError;

/// The shared key→value data threaded through a run.
pub type ContextMap = Map<String, Value>;

/// Per-node configuration, in declared key order.
pub type NodeConfig = Map<String, Value>;

/// The flat fragment a node returns; merged into the context on success.
pub type NodeOutput = Map<String, Value>;

/// Timeout applied to node types that don't declare their own.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Run-scoped information handed to every node invocation.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// ID of the workflow being run.
    pub workflow_id: String,
    /// Tenant the run belongs to.
    pub tenant_id: String,
    /// ID of the current run.
    pub run_id: Uuid,
    /// ID of the node being executed.
    pub node_id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Fires when the run is cancelled. Nodes that suspend (network calls,
    /// timers) must race their work against it.
    pub cancellation: CancellationToken,
}

impl NodeContext {
    /// A context for driving a node outside of a real run.
    pub fn detached(node_id: impl Into<String>) -> Self {
        Self {
            workflow_id: "detached".into(),
            tenant_id: "default".into(),
            run_id: Uuid::new_v4(),
            node_id: node_id.into(),
            started_at: Utc::now(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// The core node trait.
///
/// Implementations receive a read-only snapshot of the run context as it was
/// when the node started, plus the node's own config, and return the fragment
/// to merge back into the context.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    async fn execute(
        &self,
        input: &ContextMap,
        config: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError>;

    /// Whether a failure of this node type halts the rest of the run.
    fn is_critical(&self) -> bool {
        false
    }

    /// Upper bound on a single attempt of this node type.
    fn default_timeout(&self) -> Duration {
        DEFAULT_NODE_TIMEOUT
    }
}
