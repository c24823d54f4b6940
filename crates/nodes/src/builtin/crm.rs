//! State-mutation nodes: contacts, deals and tags.
//!
//! These are deterministic: given well-formed config they always succeed and
//! report the identifier of the entity they created or touched. Contact and
//! deal creation are critical node types.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::fields::{config_or_context, entity_id, lookup, optional_f64, required_str, str_field, timestamp};
use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

/// Reads `key` from config, then the context, then the trigger's
/// `submittedData`.
fn contact_field(config: &NodeConfig, input: &ContextMap, key: &str) -> Option<String> {
    config_or_context(config, input, key).or_else(|| {
        lookup(input, &format!("submittedData.{key}"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    })
}

pub struct CreateContactNode;

#[async_trait]
impl ExecutableNode for CreateContactNode {
    async fn execute(
        &self,
        input: &ContextMap,
        config: &NodeConfig,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let name = contact_field(config, input, "name");
        let email = contact_field(config, input, "email");
        let phone = contact_field(config, input, "phone");

        if name.is_none() && email.is_none() {
            return Err(NodeError::config("a contact needs a 'name' or an 'email'"));
        }
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(NodeError::config(format!("'{email}' is not a valid email address")));
            }
        }

        let mut out = Map::new();
        out.insert("contactId".into(), entity_id("contact").into());
        out.insert("name".into(), name.map_or(Value::Null, Value::from));
        out.insert("email".into(), email.map_or(Value::Null, Value::from));
        out.insert("phone".into(), phone.map_or(Value::Null, Value::from));
        out.insert("status".into(), "created".into());
        out.insert("timestamp".into(), timestamp().into());
        Ok(out)
    }

    fn is_critical(&self) -> bool {
        true
    }
}

pub struct CreateDealNode;

#[async_trait]
impl ExecutableNode for CreateDealNode {
    async fn execute(
        &self,
        input: &ContextMap,
        config: &NodeConfig,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let value = optional_f64(config, "value")?.unwrap_or(1000.0);
        if !value.is_finite() || value < 0.0 {
            return Err(NodeError::config(format!("deal value must be a non-negative number, got {value}")));
        }

        let title = str_field(config, "title").unwrap_or("New deal");
        let stage = str_field(config, "stage").unwrap_or("prospect");
        let contact_id = config_or_context(config, input, "contactId");

        let mut out = Map::new();
        out.insert("dealId".into(), entity_id("deal").into());
        out.insert("title".into(), title.into());
        out.insert("value".into(), value.into());
        out.insert("stage".into(), stage.into());
        out.insert("contactId".into(), contact_id.map_or(Value::Null, Value::from));
        out.insert("status".into(), "created".into());
        out.insert("timestamp".into(), timestamp().into());
        Ok(out)
    }

    fn is_critical(&self) -> bool {
        true
    }
}

pub struct AddTagNode;

#[async_trait]
impl ExecutableNode for AddTagNode {
    async fn execute(
        &self,
        input: &ContextMap,
        config: &NodeConfig,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let tag = required_str(config, "tag")?;
        let contact_id = config_or_context(config, input, "contactId")
            .ok_or_else(|| NodeError::config("no 'contactId' in config or context to tag"))?;

        let mut out = Map::new();
        out.insert("taggedContactId".into(), contact_id.into());
        out.insert("tag".into(), tag.into());
        out.insert("status".into(), "tagged".into());
        out.insert("timestamp".into(), timestamp().into());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(node: &dyn ExecutableNode, input: Value, config: Value) -> Result<NodeOutput, NodeError> {
        node.execute(
            input.as_object().unwrap(),
            config.as_object().unwrap(),
            &NodeContext::detached("crm"),
        )
        .await
    }

    #[tokio::test]
    async fn contact_falls_back_to_submitted_form_fields() {
        let input = json!({ "submittedData": { "name": "Ada", "email": "ada@example.com" } });
        let out = run(&CreateContactNode, input, json!({})).await.unwrap();

        assert!(out["contactId"].as_str().unwrap().starts_with("contact_"));
        assert_eq!(out["name"], "Ada");
        assert_eq!(out["email"], "ada@example.com");
        assert_eq!(out["phone"], Value::Null);
    }

    #[tokio::test]
    async fn contact_without_identity_is_rejected() {
        let err = run(&CreateContactNode, json!({}), json!({})).await.unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));

        let err = run(&CreateContactNode, json!({}), json!({ "email": "nope" })).await.unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[tokio::test]
    async fn deal_links_contact_from_context() {
        let out = run(
            &CreateDealNode,
            json!({ "contactId": "contact_1" }),
            json!({ "title": "Gym membership", "value": "250" }),
        )
        .await
        .unwrap();

        assert_eq!(out["contactId"], "contact_1");
        assert_eq!(out["value"], 250.0);
        assert_eq!(out["stage"], "prospect");
    }

    #[tokio::test]
    async fn negative_deal_value_is_rejected() {
        let err = run(&CreateDealNode, json!({}), json!({ "value": -5 })).await.unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[tokio::test]
    async fn tag_requires_a_contact() {
        let err = run(&AddTagNode, json!({}), json!({ "tag": "vip" })).await.unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));

        let out = run(&AddTagNode, json!({ "contactId": "contact_9" }), json!({ "tag": "vip" }))
            .await
            .unwrap();
        assert_eq!(out["taggedContactId"], "contact_9");
    }

    #[test]
    fn entity_creation_is_critical() {
        assert!(CreateContactNode.is_critical());
        assert!(CreateDealNode.is_critical());
        assert!(!AddTagNode.is_critical());
    }
}
