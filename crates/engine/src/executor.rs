//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Validates the DAG and produces a topological ordering.
//! 2. Resolves every node type to an executor handle.
//! 3. Dispatches nodes once all their predecessors have finished, either one
//!    at a time (sequential mode) or as a bounded pool of concurrent tasks
//!    (parallel mode).
//! 4. Merges each successful output into the run context and records a step.
//! 5. Applies the failure policy: a critical failure stops new nodes from
//!    starting, a non-critical one is recorded and the run carries on.
//!
//! The executor is stateless between runs; everything a run touches lives in
//! [`RunState`] and is dropped when [`WorkflowExecutor::run`] returns.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Instrument};

use nodes::{ContextMap, NodeContext, NodeError, NodeRegistry};

use crate::config::{ExecutionMode, ExecutorConfig};
use crate::context::{ExecutionContext, Writer};
use crate::dag::Dag;
use crate::dispatcher::{self, Dispatched, ResolvedNode};
use crate::error::EngineError;
use crate::models::{RunMetadata, WorkflowGraph};
use crate::observer::{self, StepObserver};
use crate::report::{ExecutionResult, ExecutionStep, RunStatus, StepError, StepStatus};

// ---------------------------------------------------------------------------
// Per-run options
// ---------------------------------------------------------------------------

/// Caller-supplied inputs for one run besides the graph itself.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Trigger payload merged into the context before metadata is seeded.
    pub seed: ContextMap,
    /// Fire to stop the run; in-flight nodes are interrupted.
    pub cancellation: CancellationToken,
    /// Receives every step transition.
    pub observer: Option<Arc<dyn StepObserver>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: ContextMap) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("seed_keys", &self.seed.len())
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator. Build one per process and call
/// [`WorkflowExecutor::run`] for every run; runs share nothing.
#[derive(Debug, Clone)]
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    /// # Errors
    /// Returns [`EngineError::Config`] if `config` fails validation.
    pub fn new(registry: NodeRegistry, config: ExecutorConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(registry),
            config,
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Execute `graph` to completion (or cancellation) and report every step.
    ///
    /// Node failures never surface as `Err`: they are recorded in the
    /// returned [`ExecutionResult`].
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] if the graph is malformed; no node
    /// runs in that case.
    #[instrument(
        skip_all,
        fields(workflow_id = %metadata.workflow_id, run_id = %metadata.run_id, mode = ?self.config.mode)
    )]
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        metadata: RunMetadata,
        options: RunOptions,
    ) -> Result<ExecutionResult, EngineError> {
        // ------------------------------------------------------------------
        // Validate and topologically sort the DAG.
        // ------------------------------------------------------------------
        let dag = Dag::build(graph)?;
        info!(nodes = dag.len(), order = ?dag.ordered_ids(), "DAG validated");

        // ------------------------------------------------------------------
        // Bind node types to executors once, up front.
        // ------------------------------------------------------------------
        let nodes = dispatcher::resolve(&graph.nodes, &self.registry, &self.config);

        let RunOptions { seed, cancellation, observer } = options;
        let mut state = RunState {
            context: ExecutionContext::seeded(&metadata, seed),
            metadata,
            dag,
            nodes,
            steps: Vec::new(),
            next_step: 0,
            halted: false,
            observer,
            cancellation,
        };

        let started = Instant::now();
        match self.config.mode {
            ExecutionMode::Sequential => state.run_sequential().await,
            ExecutionMode::Parallel => state.run_parallel(self.config.max_concurrency).await,
        }

        let result = state.finish(elapsed_ms(started));
        info!(
            status = ?result.status(),
            succeeded = result.success_count(),
            failed = result.error_count(),
            duration_ms = result.total_duration_ms(),
            "workflow run finished"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Run state, owned by the orchestrator task
// ---------------------------------------------------------------------------

struct RunState {
    metadata: RunMetadata,
    dag: Dag,
    nodes: Vec<Arc<ResolvedNode>>,
    context: ExecutionContext,
    steps: Vec<ExecutionStep>,
    next_step: usize,
    /// A critical node failed; nothing new may start.
    halted: bool,
    observer: Option<Arc<dyn StepObserver>>,
    cancellation: CancellationToken,
}

/// A step that has started but not yet finished.
struct InFlight {
    step: ExecutionStep,
    started: Instant,
}

impl RunState {
    fn may_start(&self) -> bool {
        !self.halted && !self.cancellation.is_cancelled()
    }

    async fn run_sequential(&mut self) {
        for position in 0..self.dag.len() {
            if !self.may_start() {
                break;
            }
            let node = Arc::clone(&self.nodes[self.dag.order()[position]]);
            let (in_flight, input, ctx) = self.start(&node);
            let dispatched = node.dispatch(&input, &ctx).await;
            self.complete(&node, in_flight, dispatched);
        }
    }

    /// Kahn's algorithm over a ready queue: a node is spawned once its last
    /// predecessor finishes, with at most `max_concurrency` nodes in flight.
    async fn run_parallel(&mut self, max_concurrency: usize) {
        let n = self.dag.len();
        let mut waiting_on: Vec<usize> = (0..n).map(|i| self.dag.in_degree(i)).collect();
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| waiting_on[i] == 0).collect();
        let mut in_flight: HashMap<usize, InFlight> = HashMap::new();
        let mut tasks: JoinSet<(usize, Dispatched)> = JoinSet::new();

        loop {
            while in_flight.len() < max_concurrency && self.may_start() {
                let Some(index) = ready.pop_front() else { break };
                let node = Arc::clone(&self.nodes[index]);
                let (started, input, ctx) = self.start(&node);
                in_flight.insert(index, started);
                tasks.spawn(
                    async move {
                        let dispatched = node.dispatch(&input, &ctx).await;
                        (node.index, dispatched)
                    }
                    .in_current_span(),
                );
            }

            let Some(joined) = tasks.join_next().await else { break };
            match joined {
                Ok((index, dispatched)) => {
                    let Some(started) = in_flight.remove(&index) else { continue };
                    let node = Arc::clone(&self.nodes[index]);
                    self.complete(&node, started, dispatched);

                    for &next in self.dag.successors(index) {
                        waiting_on[next] -= 1;
                        if waiting_on[next] == 0 {
                            ready.push_back(next);
                        }
                    }
                }
                Err(join_err) => {
                    error!(error = %join_err, "node task ended abnormally; halting run");
                    self.halted = true;
                }
            }
        }

        // Only reachable after a task was lost to a JoinError.
        let mut orphaned: Vec<usize> = in_flight.keys().copied().collect();
        orphaned.sort_unstable();
        for index in orphaned {
            if let Some(started) = in_flight.remove(&index) {
                let node = Arc::clone(&self.nodes[index]);
                let dispatched = Dispatched {
                    result: Err(NodeError::fatal("node task ended without reporting a result")),
                    attempts: 1,
                };
                self.complete(&node, started, dispatched);
            }
        }
    }

    /// Record `node` as running and hand back what its task needs.
    fn start(&mut self, node: &ResolvedNode) -> (InFlight, ContextMap, NodeContext) {
        let input = self.context.snapshot();
        let step = ExecutionStep {
            step_index: self.next_step,
            node_id: node.id().to_owned(),
            node_type: node.definition.node_type.clone(),
            label: node.definition.label.clone(),
            status: StepStatus::Running,
            input: input.clone(),
            output: ContextMap::new(),
            duration_ms: 0,
            started_at: Utc::now(),
            error: None,
            attempts: 0,
            critical: node.critical,
            needs_attention: node.needs_attention,
        };
        self.next_step += 1;
        observer::notify(self.observer.as_deref(), &step);

        let ctx = NodeContext {
            workflow_id: self.metadata.workflow_id.clone(),
            tenant_id: self.metadata.tenant_id.clone(),
            run_id: self.metadata.run_id,
            node_id: node.id().to_owned(),
            started_at: self.metadata.started_at,
            cancellation: self.cancellation.clone(),
        };
        (InFlight { step, started: Instant::now() }, input, ctx)
    }

    /// Apply a node's result: merge, record, and enforce the failure policy.
    fn complete(&mut self, node: &ResolvedNode, in_flight: InFlight, dispatched: Dispatched) {
        let InFlight { mut step, started } = in_flight;
        step.duration_ms = elapsed_ms(started);
        step.attempts = dispatched.attempts;

        let result = match dispatched.result {
            Err(NodeError::Cancelled) if !self.cancellation.is_cancelled() => Err(NodeError::fatal(
                "node reported cancellation but the run was not cancelled",
            )),
            result => result,
        };

        match result {
            Ok(output) => {
                self.merge(node.index, &output);
                step.status = StepStatus::Success;
                step.output = output;
                info!(node_id = %step.node_id, attempts = step.attempts, "node succeeded");
            }
            Err(NodeError::Cancelled) => {
                step.status = StepStatus::Skipped;
                info!(node_id = %step.node_id, "node interrupted by cancellation");
            }
            Err(err) => {
                step.status = StepStatus::Error;
                step.error = Some(StepError::from(&err));
                if node.critical {
                    error!(node_id = %step.node_id, error = %err, "critical node failed; halting run");
                    self.halted = true;
                } else {
                    warn!(node_id = %step.node_id, error = %err, "node failed; continuing");
                }
            }
        }

        observer::notify(self.observer.as_deref(), &step);
        self.steps.push(step);
    }

    fn merge(&mut self, writer: usize, output: &ContextMap) {
        for (key, previous) in self.context.merge(writer, output) {
            let Writer::Node(previous) = previous else { continue };
            if previous != writer && !self.dag.reaches(previous, writer) {
                warn!(
                    key = %key,
                    node_id = %self.dag.id(writer),
                    previous_writer = %self.dag.id(previous),
                    "unrelated branches wrote the same context key; last write wins"
                );
            }
        }
    }

    fn finish(self, total_duration_ms: u64) -> ExecutionResult {
        let interrupted = self.steps.len() < self.dag.len()
            || self.steps.iter().any(|s| s.status == StepStatus::Skipped);

        let status = if self.halted {
            RunStatus::Failed
        } else if interrupted && self.cancellation.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        ExecutionResult::assemble(
            self.metadata.run_id,
            self.metadata.workflow_id,
            status,
            self.steps,
            total_duration_ms,
            self.context.into_values(),
        )
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
