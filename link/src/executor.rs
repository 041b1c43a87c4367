//! Request execution for registry commands.
//!
//! [`RequestExecutor`] is the seam between typed commands and the cluster.
//! [`HttpRequestExecutor`] is the default reqwest-based implementation.

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value as JsonValue;
use std::time::Instant;

use crate::commands::{CommandRequest, HttpMethod, RavenCommand};
use crate::error::{RavenLinkError, Result};
use crate::models::ServerNode;
use crate::timeouts::LinkTimeouts;

/// Executes [`CommandRequest`]s against a cluster.
///
/// Returns the parsed JSON body (`None` when the body is empty). Non-success
/// statuses must be reported as [`RavenLinkError::ServerError`].
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn send(&self, request: CommandRequest) -> Result<Option<JsonValue>>;
}

/// Execute a typed command and parse its response.
pub async fn execute<C>(executor: &dyn RequestExecutor, database: &str, command: &C) -> Result<C::Output>
where
    C: RavenCommand + ?Sized,
{
    let request = command.create_request(database)?;
    match executor.send(request).await {
        Ok(body) => command.set_response(body),
        Err(RavenLinkError::ServerError {
            status_code: 404,
            message,
        }) => command.not_found(RavenLinkError::ServerError {
            status_code: 404,
            message,
        }),
        Err(e) => Err(e),
    }
}

/// Handles registry commands over HTTP.
///
/// Nodes are tried in order, starting with the node whose cluster tag
/// matches the request's preferred tag. Connect and timeout errors are
/// retried on the same node with a short linear backoff before moving on.
#[derive(Debug, Clone)]
pub struct HttpRequestExecutor {
    nodes: Vec<ServerNode>,
    http_client: reqwest::Client,
    max_retries: u32,
}

impl HttpRequestExecutor {
    pub fn new(nodes: Vec<ServerNode>, timeouts: &LinkTimeouts) -> Result<Self> {
        if nodes.is_empty() {
            return Err(RavenLinkError::ConfigurationError(
                "at least one server url is required".to_string(),
            ));
        }
        for node in &nodes {
            reqwest::Url::parse(&node.url).map_err(|e| {
                RavenLinkError::ConfigurationError(format!("Invalid url '{}': {}", node.url, e))
            })?;
        }

        let mut builder = reqwest::Client::builder();
        if !LinkTimeouts::is_no_timeout(timeouts.request_timeout) {
            builder = builder.timeout(timeouts.request_timeout);
        }
        if !LinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
            builder = builder.connect_timeout(timeouts.connection_timeout);
        }
        let http_client = builder.build().map_err(|e| {
            RavenLinkError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            nodes,
            http_client,
            max_retries: 3,
        })
    }

    /// Set how many times a connect/timeout failure is retried per node.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn nodes(&self) -> &[ServerNode] {
        &self.nodes
    }

    fn node_order(&self, preferred_tag: Option<&str>) -> Vec<&ServerNode> {
        let mut ordered: Vec<&ServerNode> = Vec::with_capacity(self.nodes.len());
        if let Some(tag) = preferred_tag {
            ordered.extend(
                self.nodes
                    .iter()
                    .filter(|n| n.cluster_tag.as_deref() == Some(tag)),
            );
        }
        ordered.extend(
            self.nodes
                .iter()
                .filter(|n| preferred_tag.is_none() || n.cluster_tag.as_deref() != preferred_tag),
        );
        ordered
    }

    fn build_url(node: &ServerNode, request: &CommandRequest) -> Result<reqwest::Url> {
        let raw = format!("{}{}", node.url.trim_end_matches('/'), request.full_path());
        let mut url = reqwest::Url::parse(&raw).map_err(|e| {
            RavenLinkError::ConfigurationError(format!("Invalid request url '{}': {}", raw, e))
        })?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send_to_node(&self, node: &ServerNode, request: &CommandRequest) -> Result<Option<JsonValue>> {
        let url = Self::build_url(node, request)?;
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut retries = 0;
        loop {
            let mut req_builder = self.http_client.request(method.clone(), url.clone());
            if let Some(body) = &request.body {
                req_builder = req_builder.json(body);
            }

            let attempt_start = Instant::now();
            debug!(
                "[raven-link] {} {} (attempt {}/{})",
                request.method,
                url,
                retries + 1,
                self.max_retries + 1
            );

            match req_builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await?;
                    debug!(
                        "[raven-link] Response status={} duration_ms={}",
                        status,
                        attempt_start.elapsed().as_millis()
                    );

                    if status.is_success() {
                        if text.trim().is_empty() {
                            return Ok(None);
                        }
                        return Ok(Some(serde_json::from_str(&text)?));
                    }

                    let message = server_error_message(&text);
                    if status.as_u16() != 404 {
                        warn!(
                            "[raven-link] Server error: status={} message=\"{}\"",
                            status, message
                        );
                    }
                    return Err(RavenLinkError::ServerError {
                        status_code: status.as_u16(),
                        message,
                    });
                },
                Err(e) if retries < self.max_retries && Self::is_retriable(&e) => {
                    warn!(
                        "[raven-link] Retriable error (attempt {}/{}): {}",
                        retries + 1,
                        self.max_retries + 1,
                        e
                    );
                    retries += 1;
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * retries as u64))
                        .await;
                    continue;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn is_retriable(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}

#[async_trait]
impl RequestExecutor for HttpRequestExecutor {
    async fn send(&self, request: CommandRequest) -> Result<Option<JsonValue>> {
        let mut last_error = None;
        for node in self.node_order(request.preferred_node_tag.as_deref()) {
            match self.send_to_node(node, &request).await {
                Ok(body) => return Ok(body),
                Err(e @ (RavenLinkError::NetworkError(_) | RavenLinkError::TimeoutError(_))) => {
                    warn!("[raven-link] Node {} unreachable: {}", node.url, e);
                    last_error = Some(e);
                },
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            RavenLinkError::ConfigurationError("no server nodes configured".to_string())
        }))
    }
}

/// Extract a readable message from an error body.
fn server_error_message(text: &str) -> String {
    if let Ok(JsonValue::Object(map)) = serde_json::from_str::<JsonValue>(text) {
        for key in ["Message", "Error"] {
            if let Some(JsonValue::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    if text.trim().is_empty() {
        "Unknown error".to_string()
    } else {
        text.to_string()
    }
}
