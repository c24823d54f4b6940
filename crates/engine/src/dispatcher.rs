//! Node dispatch: type resolution, per-attempt timeouts, panic isolation,
//! and retry of transient failures.
//!
//! Node types are resolved to executor handles once, when a run starts, so
//! the hot loop never touches the registry.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{instrument, warn};

use nodes::builtin::UnhandledNode;
use nodes::{ContextMap, ExecutableNode, NodeContext, NodeError, NodeOutput, NodeRegistry};

use crate::config::{capped_backoff, ExecutorConfig};
use crate::models::NodeDefinition;

/// A node bound to its executor and effective policy for one run.
pub(crate) struct ResolvedNode {
    pub index: usize,
    pub definition: NodeDefinition,
    pub executor: Arc<dyn ExecutableNode>,
    pub critical: bool,
    pub timeout: Duration,
    pub max_retries: u32,
    /// No executor was registered for the declared type.
    pub needs_attention: bool,
    backoff: Backoff,
}

#[derive(Debug, Clone, Copy)]
struct Backoff {
    base_ms: u64,
    max_ms: u64,
}

/// What came back from dispatching a node.
pub(crate) struct Dispatched {
    pub result: Result<NodeOutput, NodeError>,
    /// Executor invocations, retries included.
    pub attempts: u32,
}

/// Bind every node of the graph to an executor, applying `config`'s
/// per-type overrides on top of each executor's own defaults.
pub(crate) fn resolve(
    nodes: &[NodeDefinition],
    registry: &NodeRegistry,
    config: &ExecutorConfig,
) -> Vec<Arc<ResolvedNode>> {
    nodes
        .iter()
        .enumerate()
        .map(|(index, definition)| {
            let canonical = registry.canonical(&definition.node_type);
            let (executor, needs_attention) = match registry.get(canonical) {
                Some(executor) => (executor, false),
                None => {
                    let unhandled: Arc<dyn ExecutableNode> =
                        Arc::new(UnhandledNode::new(definition.node_type.clone()));
                    (unhandled, true)
                }
            };

            let policy = config.policy(canonical).cloned().unwrap_or_default();
            let timeout = policy
                .timeout_ms
                .or(config.default_timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or_else(|| executor.default_timeout());

            Arc::new(ResolvedNode {
                index,
                definition: definition.clone(),
                critical: config
                    .critical_override(canonical)
                    .unwrap_or_else(|| executor.is_critical()),
                timeout,
                max_retries: policy.max_retries.unwrap_or(config.max_retries),
                needs_attention,
                backoff: Backoff {
                    base_ms: config.retry_base_delay_ms,
                    max_ms: config.retry_max_delay_ms,
                },
                executor,
            })
        })
        .collect()
}

impl ResolvedNode {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Run the node to a final result.
    ///
    /// Transient failures are retried up to `max_retries` times with capped
    /// exponential back-off. Anything else (configuration errors, permanent
    /// HTTP statuses, timeouts, panics) is returned after the first attempt.
    /// Cancellation interrupts both an attempt and a back-off sleep.
    #[instrument(skip_all, fields(node_id = %self.definition.id, node_type = %self.definition.node_type))]
    pub async fn dispatch(&self, input: &ContextMap, ctx: &NodeContext) -> Dispatched {
        let mut attempts = 0u32;

        loop {
            if ctx.cancellation.is_cancelled() {
                return Dispatched { result: Err(NodeError::Cancelled), attempts };
            }

            attempts += 1;
            let err = match self.attempt(input, ctx).await {
                Ok(output) => return Dispatched { result: Ok(output), attempts },
                Err(err) => err,
            };

            let retry = attempts;
            if !err.is_transient() || retry > self.max_retries {
                return Dispatched { result: Err(err), attempts };
            }

            let delay = self.backoff_delay(retry);
            warn!(
                attempt = attempts,
                max_retries = self.max_retries,
                ?delay,
                error = %err,
                "transient node failure, retrying"
            );

            tokio::select! {
                biased;
                _ = ctx.cancellation.cancelled() => {
                    return Dispatched { result: Err(NodeError::Cancelled), attempts };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One executor invocation, bounded by the node's timeout. A panic inside
    /// the executor becomes an execution error.
    async fn attempt(&self, input: &ContextMap, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let call = AssertUnwindSafe(self.executor.execute(input, &self.definition.config, ctx))
            .catch_unwind();

        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Err(_) => Err(NodeError::Timeout(self.timeout)),
                Ok(Err(panic)) => Err(NodeError::fatal(format!(
                    "executor panicked: {}",
                    panic_message(panic.as_ref())
                ))),
                Ok(Ok(result)) => result,
            },
        }
    }

    fn backoff_delay(&self, retry: u32) -> Duration {
        capped_backoff(self.backoff.base_ms, self.backoff.max_ms, retry)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}
