//! Executor tuning, loadable from TOML.
//!
//! ```toml
//! mode = "parallel"
//! max_concurrency = 4
//! max_retries = 2
//!
//! [node_types.webhook_call]
//! timeout_ms = 10000
//! max_retries = 5
//!
//! [node_types.send_email]
//! critical = true
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How ready nodes are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Independent branches run concurrently, bounded by `max_concurrency`.
    ///
    /// A critical failure stops new nodes from starting, but nodes already
    /// in flight still finish and are recorded, even ones that come later
    /// in the topological order. Use [`ExecutionMode::Sequential`] when no
    /// node after a failed critical one may have a step record.
    #[default]
    Parallel,
    /// One node at a time, in topological order.
    Sequential,
}

/// Node types that are critical even when no executor is registered for
/// them (payment and destructive operations).
pub const CRITICAL_NODE_TYPES: &[&str] = &["send_payment", "delete_data"];

/// Per-node-type overrides. Unset fields fall back to the executor's own
/// defaults, then to the node implementation's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodePolicy {
    pub critical: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    pub mode: ExecutionMode,
    /// Maximum in-flight node executions in parallel mode.
    pub max_concurrency: usize,
    /// Maximum number of times a transient node failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay_ms: u64,
    /// Ceiling for the back-off delay.
    pub retry_max_delay_ms: u64,
    /// When set, replaces every node type's own default timeout.
    pub default_timeout_ms: Option<u64>,
    /// Overrides keyed by canonical node type.
    pub node_types: HashMap<String, NodePolicy>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            max_concurrency: 8,
            max_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5_000,
            default_timeout_ms: None,
            node_types: HashMap::new(),
        }
    }
}

impl ExecutorConfig {
    /// The strictly sequential configuration used for conformance runs.
    pub fn sequential() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed TOML or unknown keys,
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        if self.default_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("default_timeout_ms must be positive".into()));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::Invalid(
                "retry_max_delay_ms must not be below retry_base_delay_ms".into(),
            ));
        }
        for (node_type, policy) in &self.node_types {
            if policy.timeout_ms == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "node_types.{node_type}.timeout_ms must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn policy(&self, node_type: &str) -> Option<&NodePolicy> {
        self.node_types.get(node_type)
    }

    /// Criticality of `node_type` before executor defaults apply: an explicit
    /// override first, then [`CRITICAL_NODE_TYPES`].
    pub fn critical_override(&self, node_type: &str) -> Option<bool> {
        self.policy(node_type)
            .and_then(|policy| policy.critical)
            .or_else(|| CRITICAL_NODE_TYPES.contains(&node_type).then_some(true))
    }

    /// Back-off before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped at `retry_max_delay_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        capped_backoff(self.retry_base_delay_ms, self.retry_max_delay_ms, retry)
    }
}

pub(crate) fn capped_backoff(base_ms: u64, max_ms: u64, retry: u32) -> Duration {
    let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ExecutorConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExecutorConfig::default());
        assert_eq!(config.mode, ExecutionMode::Parallel);
    }

    #[test]
    fn parses_node_type_overrides() {
        let config = ExecutorConfig::from_toml_str(
            r#"
            mode = "sequential"
            max_retries = 1

            [node_types.webhook_call]
            timeout_ms = 2500
            critical = true
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, ExecutionMode::Sequential);
        assert_eq!(config.max_retries, 1);
        let policy = config.policy("webhook_call").unwrap();
        assert_eq!(policy.timeout_ms, Some(2500));
        assert_eq!(policy.critical, Some(true));
        assert_eq!(policy.max_retries, None);
    }

    #[test]
    fn rejects_zero_concurrency_and_timeouts() {
        assert!(matches!(
            ExecutorConfig::from_toml_str("max_concurrency = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ExecutorConfig::from_toml_str("[node_types.wait]\ntimeout_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            ExecutorConfig::from_toml_str("max_concurency = 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ExecutorConfig {
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 500,
            ..ExecutorConfig::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(4), Duration::from_millis(500));
        assert_eq!(config.backoff(80), Duration::from_millis(500));
    }
}
