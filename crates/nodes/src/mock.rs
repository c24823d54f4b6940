//! `MockNode` — a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return a specific output fragment.
    ReturnValue(NodeOutput),
    /// Always fail with the given error.
    Fail(NodeError),
    /// Fail with the given error for the first `n` calls, then return the value.
    FailTimes(usize, NodeError, NodeOutput),
    /// Sleep (cancellably), then return the value.
    Sleep(Duration, NodeOutput),
    /// Panic inside `execute`.
    Panic(String),
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
#[derive(Clone)]
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Whether failures of this node halt the run.
    pub critical: bool,
    /// Per-attempt timeout reported to the engine.
    pub timeout: Duration,
    /// All inputs seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<ContextMap>>>,
    /// Calls currently in progress; shared so tests can observe overlap.
    pub active: Arc<AtomicUsize>,
    /// Highest value `active` has reached.
    pub peak_active: Arc<AtomicUsize>,
}

impl MockNode {
    fn with(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            critical: false,
            timeout: crate::traits::DEFAULT_NODE_TIMEOUT,
            calls: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            peak_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock that always succeeds with the given object.
    ///
    /// Non-object values produce an empty output.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with(name, MockBehaviour::ReturnValue(into_map(value)))
    }

    /// Create a mock that always fails with a permanent execution error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::Fail(NodeError::fatal(msg)))
    }

    /// Create a mock that always fails with a transient execution error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::Fail(NodeError::retryable(msg)))
    }

    /// Create a mock that always fails with the given error.
    pub fn failing_with(name: impl Into<String>, err: NodeError) -> Self {
        Self::with(name, MockBehaviour::Fail(err))
    }

    /// Create a mock that fails transiently `times` times, then succeeds.
    pub fn flaky(name: impl Into<String>, times: usize, value: Value) -> Self {
        let err = NodeError::retryable("transient failure");
        Self::with(name, MockBehaviour::FailTimes(times, err, into_map(value)))
    }

    /// Create a mock that sleeps for `delay` before succeeding.
    pub fn sleeping(name: impl Into<String>, delay: Duration, value: Value) -> Self {
        Self::with(name, MockBehaviour::Sleep(delay, into_map(value)))
    }

    /// Create a mock that panics when executed.
    pub fn panicking(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::Panic(msg.into()))
    }

    /// Mark this mock as a critical node type.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Count concurrent calls together with `other`, so overlap between two
    /// distinct mocks shows up in [`MockNode::peak_concurrency`].
    pub fn sharing_concurrency_with(mut self, other: &MockNode) -> Self {
        self.active = Arc::clone(&other.active);
        self.peak_active = Arc::clone(&other.peak_active);
        self
    }

    /// Most calls that were ever in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Inputs seen so far, in call order.
    pub fn inputs(&self) -> Vec<ContextMap> {
        self.calls.lock().unwrap().clone()
    }

    fn output(&self, value: &NodeOutput) -> NodeOutput {
        let mut out = Map::new();
        out.insert("node".into(), Value::String(self.name.clone()));
        out.extend(value.clone());
        out
    }
}

fn into_map(value: Value) -> NodeOutput {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Decrements the active-call counter when dropped.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(
        &self,
        input: &ContextMap,
        _config: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(input.clone());
            calls.len()
        };

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(self.output(v)),
            MockBehaviour::Fail(err) => Err(err.clone()),
            MockBehaviour::FailTimes(n, err, v) => {
                if call_number <= *n {
                    Err(err.clone())
                } else {
                    Ok(self.output(v))
                }
            }
            MockBehaviour::Sleep(delay, v) => {
                tokio::select! {
                    _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
                    _ = tokio::time::sleep(*delay) => Ok(self.output(v)),
                }
            }
            MockBehaviour::Panic(msg) => panic!("{msg}"),
        }
    }

    fn is_critical(&self) -> bool {
        self.critical
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }
}
