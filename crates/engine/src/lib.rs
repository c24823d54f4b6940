//! `engine` crate — workflow graph model, DAG validation and scheduling, and
//! the orchestrator that runs a graph against a node registry.

pub mod config;
pub mod context;
pub mod dag;
mod dispatcher;
pub mod error;
pub mod executor;
pub mod models;
pub mod observer;
pub mod report;

pub use config::{ExecutionMode, ExecutorConfig, NodePolicy};
pub use context::ExecutionContext;
pub use dag::{compute_execution_order, validate, Dag};
pub use error::{ConfigError, EngineError, ValidationError};
pub use executor::{RunOptions, WorkflowExecutor};
pub use models::{Edge, NodeDefinition, RunMetadata, WorkflowGraph};
pub use observer::{ChannelObserver, StepObserver};
pub use report::{ExecutionResult, ExecutionStep, RunStatus, StepError, StepStatus};
