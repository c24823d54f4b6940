//! `nodes` crate — the `ExecutableNode` trait, the node-type registry and the
//! built-in node catalog.
//!
//! Every node — built-in and custom alike — must implement [`ExecutableNode`].
//! The engine crate dispatches execution through this trait object.

pub mod builtin;
pub mod error;
pub mod fields;
pub mod mock;
pub mod registry;
pub mod traits;

pub use builtin::{builtin_registry, register_builtins, BuiltinConfig};
pub use error::{ErrorKind, NodeError};
pub use registry::NodeRegistry;
pub use traits::{ContextMap, ExecutableNode, NodeConfig, NodeContext, NodeOutput};
