//! Wait/delay node: a bounded, cancellable pause.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;

use crate::fields::{optional_f64, str_field, timestamp};
use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

/// Longest pause a wait node accepts unless configured otherwise.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60 * 60);

/// Milliseconds per unit; singular and plural spellings are both accepted.
fn unit_millis(unit: &str) -> Option<f64> {
    if unit == "ms" {
        return Some(1.0);
    }
    match unit.trim_end_matches('s') {
        "millisecond" => Some(1.0),
        "second" | "sec" => Some(1_000.0),
        "minute" | "min" => Some(60_000.0),
        "hour" => Some(3_600_000.0),
        "day" => Some(86_400_000.0),
        _ => None,
    }
}

pub struct WaitNode {
    max_wait: Duration,
}

impl WaitNode {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    /// Resolve `duration` + `unit` config into a pause length.
    pub fn pause_for(&self, config: &NodeConfig) -> Result<(Duration, String), NodeError> {
        let amount = optional_f64(config, "duration")?.unwrap_or(1.0);
        let unit = str_field(config, "unit").unwrap_or("seconds").to_ascii_lowercase();
        let per_unit = unit_millis(&unit)
            .ok_or_else(|| NodeError::config(format!("unknown wait unit '{unit}'")))?;

        if !amount.is_finite() || amount < 0.0 {
            return Err(NodeError::config(format!("wait duration must be non-negative, got {amount}")));
        }
        let pause = Duration::try_from_secs_f64(amount * per_unit / 1_000.0)
            .map_err(|_| NodeError::config(format!("wait of {amount} {unit} is out of range")))?;
        if pause > self.max_wait {
            return Err(NodeError::config(format!(
                "wait of {amount} {unit} exceeds the {}s maximum",
                self.max_wait.as_secs()
            )));
        }
        Ok((pause, unit))
    }
}

impl Default for WaitNode {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAIT)
    }
}

#[async_trait]
impl ExecutableNode for WaitNode {
    async fn execute(
        &self,
        _input: &ContextMap,
        config: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let (pause, unit) = self.pause_for(config)?;

        tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }

        let mut out = Map::new();
        out.insert("waitDuration".into(), optional_f64(config, "duration")?.unwrap_or(1.0).into());
        out.insert("unit".into(), unit.into());
        out.insert("waitedMs".into(), (pause.as_millis() as u64).into());
        out.insert("timestamp".into(), timestamp().into());
        Ok(out)
    }

    fn default_timeout(&self) -> Duration {
        self.max_wait + Duration::from_secs(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn cfg(v: Value) -> NodeConfig {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn units_are_converted() {
        let node = WaitNode::default();
        let (pause, _) = node.pause_for(&cfg(json!({ "duration": 2, "unit": "minutes" }))).unwrap();
        assert_eq!(pause, Duration::from_secs(120));

        let (pause, unit) = node.pause_for(&cfg(json!({}))).unwrap();
        assert_eq!(pause, Duration::from_secs(1));
        assert_eq!(unit, "seconds");

        let (pause, _) = node.pause_for(&cfg(json!({ "duration": 250, "unit": "milliseconds" }))).unwrap();
        assert_eq!(pause, Duration::from_millis(250));
    }

    #[test]
    fn oversized_and_invalid_waits_are_rejected() {
        let node = WaitNode::new(Duration::from_secs(10));
        assert!(node.pause_for(&cfg(json!({ "duration": 1, "unit": "hours" }))).is_err());
        assert!(node.pause_for(&cfg(json!({ "duration": -1 }))).is_err());
        assert!(node.pause_for(&cfg(json!({ "unit": "fortnights" }))).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_the_configured_time() {
        let out = WaitNode::default()
            .execute(&Map::new(), &cfg(json!({ "duration": 3 })), &NodeContext::detached("wait"))
            .await
            .unwrap();
        assert_eq!(out["waitedMs"], 3000);
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_pause() {
        let ctx = NodeContext::detached("wait");
        ctx.cancellation.cancel();
        let err = WaitNode::default()
            .execute(&Map::new(), &cfg(json!({ "duration": 30 })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, NodeError::Cancelled);
    }
}
