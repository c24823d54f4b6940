//! Communication nodes: email and in-app notifications.
//!
//! Email is fire-and-record: the node hands the message to an
//! [`EmailTransport`] and reports the transport's status, not delivery.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::webhook::{send, HttpClientConfig};
use crate::fields::{entity_id, lookup, required_str, str_field, timestamp};
use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// What the transport reports back after accepting a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub message_id: String,
    /// Transport status, e.g. `sent` or `queued`.
    pub status: String,
}

/// Where outgoing email is handed off.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(
        &self,
        message: &EmailMessage,
        cancellation: &CancellationToken,
    ) -> Result<EmailReceipt, NodeError>;
}

/// Records the message in the log and reports it as sent.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(
        &self,
        message: &EmailMessage,
        _cancellation: &CancellationToken,
    ) -> Result<EmailReceipt, NodeError> {
        let message_id = entity_id("msg");
        info!(to = %message.to, subject = %message.subject, %message_id, "email recorded");
        Ok(EmailReceipt {
            message_id,
            status: "sent".into(),
        })
    }
}

/// Posts messages as JSON to an email provider's HTTP API.
///
/// The provider is expected to answer with `{"id": "...", "status": "..."}`;
/// missing fields default to a generated id and `queued`.
pub struct HttpEmailTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEmailTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        config: &HttpClientConfig,
    ) -> Result<Self, NodeError> {
        Ok(Self {
            client: config.build_client()?,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(
        &self,
        message: &EmailMessage,
        cancellation: &CancellationToken,
    ) -> Result<EmailReceipt, NodeError> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = send(request, &self.endpoint, cancellation).await?;
        let reply = tokio::select! {
            _ = cancellation.cancelled() => return Err(NodeError::Cancelled),
            reply = response.json::<Map<String, Value>>() => reply,
        };
        let reply = reply.unwrap_or_else(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "unparseable email provider reply");
            Map::new()
        });

        Ok(EmailReceipt {
            message_id: str_field(&reply, "id")
                .map(str::to_owned)
                .unwrap_or_else(|| entity_id("msg")),
            status: str_field(&reply, "status").unwrap_or("queued").to_owned(),
        })
    }
}

pub struct SendEmailNode {
    transport: Arc<dyn EmailTransport>,
}

impl SendEmailNode {
    pub fn new(transport: Arc<dyn EmailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ExecutableNode for SendEmailNode {
    async fn execute(
        &self,
        input: &ContextMap,
        config: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let to = str_field(config, "to")
            .map(str::to_owned)
            .or_else(|| str_field(input, "email").map(str::to_owned))
            .or_else(|| {
                lookup(input, "submittedData.email")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .ok_or_else(|| NodeError::config("no recipient: set 'to' or provide 'email' in context"))?;
        if !to.contains('@') {
            return Err(NodeError::config(format!("'{to}' is not a valid email address")));
        }

        let message = EmailMessage {
            to,
            subject: str_field(config, "subject").unwrap_or("Automated message").to_owned(),
            body: str_field(config, "body").unwrap_or_default().to_owned(),
        };

        let receipt = self.transport.send(&message, &ctx.cancellation).await?;

        let mut out = Map::new();
        out.insert("emailId".into(), entity_id("email").into());
        out.insert("to".into(), message.to.into());
        out.insert("subject".into(), message.subject.into());
        out.insert("status".into(), receipt.status.into());
        out.insert("messageId".into(), receipt.message_id.into());
        out.insert("sentAt".into(), timestamp().into());
        Ok(out)
    }
}

/// In-app/chat notification; recorded, never delivered by the engine itself.
pub struct SendNotificationNode;

#[async_trait]
impl ExecutableNode for SendNotificationNode {
    async fn execute(
        &self,
        _input: &ContextMap,
        config: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let message = required_str(config, "message")?;
        let channel = str_field(config, "channel").unwrap_or("in_app");
        info!(node_id = %ctx.node_id, channel, "notification recorded");

        let mut out = Map::new();
        out.insert("notificationId".into(), entity_id("notif").into());
        out.insert("channel".into(), channel.into());
        out.insert("message".into(), message.into());
        out.insert("status".into(), "sent".into());
        Ok(out)
    }
}
