//! Form-submission trigger.
//!
//! Triggers seed the run with a synthetic event payload. They never wait for
//! a real event: the submitted fields come from the run's seed context
//! (`formData`), falling back to the node's own `sampleData`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::fields::{entity_id, str_field, timestamp};
use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

pub struct FormSubmitTrigger;

#[async_trait]
impl ExecutableNode for FormSubmitTrigger {
    async fn execute(
        &self,
        input: &ContextMap,
        config: &NodeConfig,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let submitted = match (input.get("formData"), config.get("sampleData")) {
            (Some(Value::Object(data)), _) => data.clone(),
            (_, Some(Value::Object(sample))) => sample.clone(),
            (_, Some(Value::Null) | None) => Map::new(),
            (_, Some(_)) => return Err(NodeError::config("'sampleData' must be an object")),
        };

        let form_id = str_field(config, "formId")
            .or_else(|| str_field(input, "formId"))
            .unwrap_or("default_form");

        let mut out = Map::new();
        out.insert("formId".into(), form_id.into());
        out.insert("submissionId".into(), entity_id("sub").into());
        out.insert("submittedData".into(), Value::Object(submitted));
        out.insert("timestamp".into(), timestamp().into());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn seed_form_data_wins_over_sample_data() {
        let input = json!({ "formData": { "email": "ada@example.com" } });
        let config = json!({ "formId": "contact_us", "sampleData": { "email": "sample@example.com" } });

        let out = FormSubmitTrigger
            .execute(
                input.as_object().unwrap(),
                config.as_object().unwrap(),
                &NodeContext::detached("trigger"),
            )
            .await
            .unwrap();

        assert_eq!(out["formId"], "contact_us");
        assert_eq!(out["submittedData"]["email"], "ada@example.com");
        assert!(out["submissionId"].as_str().unwrap().starts_with("sub_"));
    }

    #[tokio::test]
    async fn malformed_sample_data_is_a_configuration_error() {
        let config = json!({ "sampleData": "not an object" });
        let err = FormSubmitTrigger
            .execute(&Map::new(), config.as_object().unwrap(), &NodeContext::detached("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }
}
