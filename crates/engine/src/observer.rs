//! Progress notifications for step state transitions.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::report::ExecutionStep;

/// Receives a step each time it changes state (`running`, then one terminal
/// status). Calls arrive in order from the orchestrator task; an
/// implementation must not block it.
pub trait StepObserver: Send + Sync {
    fn on_step(&self, step: &ExecutionStep);
}

impl<F> StepObserver for F
where
    F: Fn(&ExecutionStep) + Send + Sync,
{
    fn on_step(&self, step: &ExecutionStep) {
        self(step)
    }
}

/// Forwards every transition into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<ExecutionStep>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<ExecutionStep>) -> Self {
        Self { tx }
    }
}

impl StepObserver for ChannelObserver {
    fn on_step(&self, step: &ExecutionStep) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(step.clone());
    }
}

/// Deliver `step` to `observer`; a panicking observer can't take the run down.
pub(crate) fn notify(observer: Option<&dyn StepObserver>, step: &ExecutionStep) {
    let Some(observer) = observer else { return };
    if catch_unwind(AssertUnwindSafe(|| observer.on_step(step))).is_err() {
        warn!(node_id = %step.node_id, status = ?step.status, "step observer panicked");
    }
}
