//! Built-in node catalog.
//!
//! | canonical key       | editor alias                | family          | critical |
//! |---------------------|-----------------------------|-----------------|----------|
//! | `form_submit`       | `trigger-form-submit`       | trigger         | no       |
//! | `ai_score`          | `action-ai-score`           | AI-assisted     | no       |
//! | `create_contact`    | `action-create-contact`     | state mutation  | yes      |
//! | `create_deal`       | `action-create-deal`        | state mutation  | yes      |
//! | `add_tag`           | `action-add-tag`            | state mutation  | no       |
//! | `send_email`        | `action-send-email`         | communication   | no       |
//! | `send_notification` | `action-send-notification`  | communication   | no       |
//! | `webhook_call`      | `action-webhook-call`       | communication   | no       |
//! | `wait`              | `action-wait`, `delay`      | control flow    | no       |
//! | `condition`         | `logic-condition`           | control flow    | no       |
//!
//! `send_payment` and `delete_data` have no built-in executor; the engine
//! still treats them as critical when a workflow declares them.

use std::sync::Arc;
use std::time::Duration;

pub mod ai_score;
pub mod condition;
pub mod crm;
pub mod email;
pub mod passthrough;
pub mod trigger;
pub mod wait;
pub mod webhook;

pub use ai_score::{AiScoreNode, LeadScore, LeadScorer};
pub use condition::ConditionNode;
pub use crm::{AddTagNode, CreateContactNode, CreateDealNode};
pub use email::{EmailTransport, HttpEmailTransport, LogTransport, SendEmailNode, SendNotificationNode};
pub use passthrough::UnhandledNode;
pub use trigger::FormSubmitTrigger;
pub use wait::WaitNode;
pub use webhook::{HttpClientConfig, WebhookNode};

use crate::{NodeError, NodeRegistry};

/// Dependencies of the built-in nodes.
#[derive(Clone)]
pub struct BuiltinConfig {
    /// HTTP client settings for the webhook node.
    pub http: HttpClientConfig,
    /// Longest pause a wait node may request.
    pub max_wait: Duration,
    /// External lead scorer; `None` always uses the local heuristic.
    pub scorer: Option<Arc<dyn LeadScorer>>,
    /// Budget for one scorer call before falling back to the heuristic.
    pub scorer_timeout: Duration,
    /// Where `send_email` hands messages off.
    pub email_transport: Arc<dyn EmailTransport>,
}

impl Default for BuiltinConfig {
    fn default() -> Self {
        Self {
            http: HttpClientConfig::default(),
            max_wait: wait::DEFAULT_MAX_WAIT,
            scorer: None,
            scorer_timeout: ai_score::DEFAULT_SCORER_TIMEOUT,
            email_transport: Arc::new(LogTransport),
        }
    }
}

/// Register every built-in node type (and its aliases) into `registry`.
///
/// # Errors
/// Returns [`NodeError::Configuration`] if the HTTP client can't be built.
pub fn register_builtins(registry: &mut NodeRegistry, config: BuiltinConfig) -> Result<(), NodeError> {
    registry
        .register("form_submit", Arc::new(FormSubmitTrigger))
        .alias("trigger-form-submit", "form_submit")
        .register(
            "ai_score",
            Arc::new(AiScoreNode::new(config.scorer).with_scorer_timeout(config.scorer_timeout)),
        )
        .alias("action-ai-score", "ai_score")
        .register("create_contact", Arc::new(CreateContactNode))
        .alias("action-create-contact", "create_contact")
        .register("create_deal", Arc::new(CreateDealNode))
        .alias("action-create-deal", "create_deal")
        .register("add_tag", Arc::new(AddTagNode))
        .alias("action-add-tag", "add_tag")
        .register("send_email", Arc::new(SendEmailNode::new(config.email_transport)))
        .alias("action-send-email", "send_email")
        .register("send_notification", Arc::new(SendNotificationNode))
        .alias("action-send-notification", "send_notification")
        .register("webhook_call", Arc::new(WebhookNode::new(&config.http)?))
        .alias("action-webhook-call", "webhook_call")
        .register("wait", Arc::new(WaitNode::new(config.max_wait)))
        .alias("action-wait", "wait")
        .alias("delay", "wait")
        .register("condition", Arc::new(ConditionNode))
        .alias("logic-condition", "condition");
    Ok(())
}

/// A fresh registry holding only the built-in node types.
pub fn builtin_registry(config: BuiltinConfig) -> Result<NodeRegistry, NodeError> {
    let mut registry = NodeRegistry::new();
    register_builtins(&mut registry, config)?;
    Ok(registry)
}
