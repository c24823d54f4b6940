//! Outbound webhook node.
//!
//! Non-2xx responses and network failures surface as
//! [`NodeError::Execution`] with the HTTP status attached; 5xx/408/429 and
//! connection failures are transient and get retried by the engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::fields::{required_str, str_field, timestamp};
use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

/// Tracing target for outbound HTTP calls made by nodes.
pub const TRACING_TARGET: &str = "nodes::http";

/// Response bodies longer than this are truncated in node output.
const MAX_RESPONSE_CHARS: usize = 4096;

/// Configuration for outbound HTTP clients used by nodes.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Timeout for a single request.
    pub timeout: Duration,
    /// User-Agent header sent with requests.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("workflow-automation/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn build_client(&self) -> Result<Client, NodeError> {
        if self.timeout.is_zero() {
            return Err(NodeError::config("HTTP timeout cannot be zero"));
        }
        Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| NodeError::config(format!("cannot build HTTP client: {e}")))
    }
}

/// Send `request`, racing it against run cancellation, and turn transport
/// failures and non-2xx statuses into node errors.
pub(crate) async fn send(
    request: RequestBuilder,
    url: &str,
    cancellation: &CancellationToken,
) -> Result<Response, NodeError> {
    let result = tokio::select! {
        _ = cancellation.cancelled() => return Err(NodeError::Cancelled),
        result = request.send() => result,
    };

    let response = result.map_err(|err| {
        if err.is_builder() {
            NodeError::config(format!("invalid request to {url}: {err}"))
        } else if err.is_timeout() {
            NodeError::retryable(format!("request to {url} timed out"))
        } else if err.is_connect() {
            NodeError::retryable(format!("connection to {url} failed"))
        } else {
            NodeError::retryable(format!("request to {url} failed: {err}"))
        }
    })?;

    let status = response.status();
    debug!(target: TRACING_TARGET, url, status = status.as_u16(), "HTTP response received");
    if !status.is_success() {
        return Err(NodeError::http_status(
            status.as_u16(),
            format!("{url} responded with HTTP {status}"),
        ));
    }
    Ok(response)
}

/// Parse `headers` config: either an object of strings or a JSON string
/// encoding one.
fn parse_headers(config: &NodeConfig) -> Result<Vec<(String, String)>, NodeError> {
    let parsed;
    let obj = match config.get("headers") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(obj)) => obj,
        Some(Value::String(raw)) if raw.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(raw)) => {
            parsed = serde_json::from_str::<Map<String, Value>>(raw)
                .map_err(|e| NodeError::config(format!("'headers' is not a JSON object: {e}")))?;
            &parsed
        }
        Some(_) => return Err(NodeError::config("'headers' must be an object")),
    };

    obj.iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name.clone(), s.clone())),
            Value::Number(_) | Value::Bool(_) => Ok((name.clone(), value.to_string())),
            _ => Err(NodeError::config(format!("header '{name}' must be a string"))),
        })
        .collect()
}

fn parse_method(config: &NodeConfig) -> Result<Method, NodeError> {
    let raw = str_field(config, "method").unwrap_or("POST").to_ascii_uppercase();
    match raw.as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        other => Err(NodeError::config(format!("unsupported HTTP method '{other}'"))),
    }
}

pub struct WebhookNode {
    client: Client,
    timeout: Duration,
}

impl WebhookNode {
    pub fn new(config: &HttpClientConfig) -> Result<Self, NodeError> {
        Ok(Self {
            client: config.build_client()?,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl ExecutableNode for WebhookNode {
    async fn execute(
        &self,
        input: &ContextMap,
        config: &NodeConfig,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let url = required_str(config, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NodeError::config(format!("'{url}' is not an http(s) URL")));
        }
        let method = parse_method(config)?;
        let headers = parse_headers(config)?;

        let mut request = self.client.request(method.clone(), url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if method != Method::GET {
            let body = match config.get("body") {
                Some(Value::Null) | None => Value::Object(input.clone()),
                Some(body) => body.clone(),
            };
            request = request.json(&body);
        }

        debug!(target: TRACING_TARGET, node_id = %ctx.node_id, %method, url, "calling webhook");
        let response = send(request, url, &ctx.cancellation).await?;
        let status = response.status().as_u16();

        let text = tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            text = response.text() => text.map_err(|e| {
                NodeError::retryable(format!("failed to read webhook response from {url}: {e}"))
            })?,
        };
        let body = serde_json::from_str::<Value>(&text)
            .unwrap_or_else(|_| Value::String(text.chars().take(MAX_RESPONSE_CHARS).collect()));

        let mut out = Map::new();
        out.insert("webhookUrl".into(), url.into());
        out.insert("statusCode".into(), status.into());
        out.insert("success".into(), true.into());
        out.insert("response".into(), body);
        out.insert("timestamp".into(), timestamp().into());
        Ok(out)
    }

    fn default_timeout(&self) -> Duration {
        self.timeout + Duration::from_secs(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn node() -> WebhookNode {
        WebhookNode::new(&HttpClientConfig::default()).unwrap()
    }

    fn cfg(v: Value) -> NodeConfig {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn posts_context_and_returns_json_response() {
        let router = Router::new().route(
            "/hook",
            post(|Json(body): Json<Value>| async move { Json(json!({ "echo": body["contactId"] })) }),
        );
        let base = serve(router).await;

        let input = cfg(json!({ "contactId": "contact_1" }));
        let out = node()
            .execute(&input, &cfg(json!({ "url": format!("{base}/hook") })), &NodeContext::detached("hook"))
            .await
            .unwrap();

        assert_eq!(out["statusCode"], 200);
        assert_eq!(out["response"]["echo"], "contact_1");
    }

    #[tokio::test]
    async fn client_errors_are_permanent_with_status() {
        let router = Router::new().route("/hook", post(|| async { StatusCode::UNPROCESSABLE_ENTITY }));
        let base = serve(router).await;

        let err = node()
            .execute(&Map::new(), &cfg(json!({ "url": format!("{base}/hook") })), &NodeContext::detached("hook"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(422));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let router = Router::new().route("/hook", post(|| async { StatusCode::BAD_GATEWAY }));
        let base = serve(router).await;

        let err = node()
            .execute(&Map::new(), &cfg(json!({ "url": format!("{base}/hook") })), &NodeContext::detached("hook"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(502));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn truncated_response_body_is_a_transient_failure() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Promise 100 bytes, send 5, hang up.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nshort")
                .await
                .unwrap();
        });

        let err = node()
            .execute(&Map::new(), &cfg(json!({ "url": format!("http://{addr}/") })), &NodeContext::detached("hook"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("failed to read webhook response"));
    }

    #[tokio::test]
    async fn connection_failures_are_transient() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = node()
            .execute(&Map::new(), &cfg(json!({ "url": format!("http://{addr}/") })), &NodeContext::detached("hook"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.status_code(), None);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_any_request() {
        let ctx = NodeContext::detached("hook");
        let missing = node().execute(&Map::new(), &Map::new(), &ctx).await.unwrap_err();
        assert!(matches!(missing, NodeError::Configuration(_)));

        let bad_method = node()
            .execute(&Map::new(), &cfg(json!({ "url": "http://localhost/", "method": "BREW" })), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(bad_method, NodeError::Configuration(_)));

        let bad_headers = node()
            .execute(&Map::new(), &cfg(json!({ "url": "http://localhost/", "headers": "{nope" })), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(bad_headers, NodeError::Configuration(_)));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_request() {
        let router = Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                StatusCode::OK
            }),
        );
        let base = serve(router).await;
        let ctx = NodeContext::detached("hook");
        let token = ctx.cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = node()
            .execute(&Map::new(), &cfg(json!({ "url": format!("{base}/slow") })), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, NodeError::Cancelled);
    }
}
