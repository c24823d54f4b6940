//! Execution report: per-step records and the final, immutable result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nodes::{ContextMap, ErrorKind, NodeError, NodeOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Error,
    /// The node was interrupted by run cancellation before it finished.
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Skipped)
    }
}

/// The failure recorded on a step with status `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl From<&NodeError> for StepError {
    fn from(err: &NodeError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            status_code: err.status_code(),
        }
    }
}

/// One record per attempted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    /// Monotonic within the run, assigned when the node starts (0-based).
    pub step_index: usize,
    pub node_id: String,
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub status: StepStatus,
    /// Context snapshot when the node started.
    pub input: ContextMap,
    /// Merge fragment; empty unless the step succeeded.
    pub output: NodeOutput,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    /// Present only when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    /// Number of times the executor was invoked.
    pub attempts: u32,
    /// Whether a failure of this step halts the run.
    pub critical: bool,
    /// Set when the node type had no registered executor.
    #[serde(default)]
    pub needs_attention: bool,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every node was attempted; any failures were non-critical.
    Completed,
    /// A critical node failed and the run halted.
    Failed,
    /// The run's cancellation signal fired.
    Cancelled,
}

/// The aggregate outcome of one run. Created once, when the run terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    run_id: Uuid,
    workflow_id: String,
    status: RunStatus,
    success: bool,
    steps: Vec<ExecutionStep>,
    total_duration_ms: u64,
    success_count: usize,
    error_count: usize,
    final_context: ContextMap,
}

impl ExecutionResult {
    pub(crate) fn assemble(
        run_id: Uuid,
        workflow_id: String,
        status: RunStatus,
        mut steps: Vec<ExecutionStep>,
        total_duration_ms: u64,
        final_context: ContextMap,
    ) -> Self {
        steps.sort_by_key(|s| s.step_index);
        let success_count = steps.iter().filter(|s| s.status == StepStatus::Success).count();
        let error_count = steps.iter().filter(|s| s.status == StepStatus::Error).count();
        Self {
            run_id,
            workflow_id,
            status,
            success: status == RunStatus::Completed,
            steps,
            total_duration_ms,
            success_count,
            error_count,
            final_context,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// `true` iff the run completed: no critical node failed and the run was
    /// not cancelled. Non-critical step errors don't affect it.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Step records ordered by `step_index`.
    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    /// The step recorded for `node_id`, if the node was attempted.
    pub fn step(&self, node_id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.node_id == node_id)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// The context after the last merge.
    pub fn final_context(&self) -> &ContextMap {
        &self.final_context
    }
}
