//! The shared key→value context threaded through a run.
//!
//! The orchestrator owns the context: node tasks only ever see snapshots, and
//! outputs are merged back one at a time on the orchestrator's task. That makes
//! the orchestrator the single writer, even when branches run concurrently.

use std::collections::HashMap;

use serde_json::{Map, Value};

use nodes::{ContextMap, NodeOutput};

use crate::models::RunMetadata;

/// Keys seeded from [`RunMetadata`].
pub const WORKFLOW_ID_KEY: &str = "workflowId";
pub const TENANT_ID_KEY: &str = "tenantId";
pub const RUN_ID_KEY: &str = "runId";
pub const STARTED_AT_KEY: &str = "startedAt";

/// Who last wrote a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    /// Run metadata or the caller's seed.
    Seed,
    /// The node at this index (declaration order).
    Node(usize),
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    values: Map<String, Value>,
    writers: HashMap<String, Writer>,
}

impl ExecutionContext {
    /// Seed a new context: the caller's payload first, then run metadata,
    /// which wins on conflicting keys.
    pub fn seeded(metadata: &RunMetadata, seed: ContextMap) -> Self {
        let mut values = seed;
        values.insert(WORKFLOW_ID_KEY.into(), metadata.workflow_id.clone().into());
        values.insert(TENANT_ID_KEY.into(), metadata.tenant_id.clone().into());
        values.insert(RUN_ID_KEY.into(), metadata.run_id.to_string().into());
        values.insert(STARTED_AT_KEY.into(), metadata.started_at.to_rfc3339().into());

        let writers = values.keys().map(|k| (k.clone(), Writer::Seed)).collect();
        Self { values, writers }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// A copy of the current values, handed to a node as its input.
    pub fn snapshot(&self) -> ContextMap {
        self.values.clone()
    }

    pub fn writer(&self, key: &str) -> Option<Writer> {
        self.writers.get(key).copied()
    }

    /// Merge `output` produced by node `writer`: present keys overwrite,
    /// absent keys are untouched.
    ///
    /// Returns the overwritten keys together with their previous writer, so
    /// the caller can flag writes that raced between unrelated branches.
    pub fn merge(&mut self, writer: usize, output: &NodeOutput) -> Vec<(String, Writer)> {
        let mut overwritten = Vec::new();
        for (key, value) in output {
            if let Some(previous) = self.writers.insert(key.clone(), Writer::Node(writer)) {
                overwritten.push((key.clone(), previous));
            }
            self.values.insert(key.clone(), value.clone());
        }
        overwritten
    }

    pub fn into_values(self) -> ContextMap {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn metadata_wins_over_seed() {
        let meta = RunMetadata::new("wf-1", "tenant-a");
        let ctx = ExecutionContext::seeded(&meta, map(json!({ "workflowId": "spoofed", "formData": {} })));

        assert_eq!(ctx.get(WORKFLOW_ID_KEY), Some(&json!("wf-1")));
        assert_eq!(ctx.get(TENANT_ID_KEY), Some(&json!("tenant-a")));
        assert_eq!(ctx.get(RUN_ID_KEY), Some(&json!(meta.run_id.to_string())));
        assert!(ctx.get("formData").is_some());
        assert_eq!(ctx.writer("formData"), Some(Writer::Seed));
    }

    #[test]
    fn merge_overwrites_present_keys_only() {
        let meta = RunMetadata::new("wf", "t");
        let mut ctx = ExecutionContext::seeded(&meta, map(json!({ "a": 1, "b": 2 })));

        let overwritten = ctx.merge(3, &map(json!({ "b": 20, "c": 30 })));

        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get("b"), Some(&json!(20)));
        assert_eq!(ctx.get("c"), Some(&json!(30)));
        assert_eq!(overwritten, vec![("b".to_string(), Writer::Seed)]);
        assert_eq!(ctx.writer("c"), Some(Writer::Node(3)));
    }

    #[test]
    fn snapshots_are_not_affected_by_later_merges() {
        let meta = RunMetadata::new("wf", "t");
        let mut ctx = ExecutionContext::seeded(&meta, Map::new());
        let before = ctx.snapshot();
        ctx.merge(0, &map(json!({ "late": true })));
        assert!(!before.contains_key("late"));
    }
}
