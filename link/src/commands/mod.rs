//! Typed commands against the subscription registry API.
//!
//! A command knows how to build its [`CommandRequest`] and how to turn the
//! parsed response body into a typed output. Commands are executed through
//! a [`RequestExecutor`](crate::executor::RequestExecutor) with
//! [`execute`](crate::executor::execute).

pub mod batch;
pub mod create_subscription;
pub mod delete_subscription;
pub mod drop_subscription_connection;
pub mod get_subscription_state;
pub mod get_subscriptions;
pub mod get_tcp_info;

use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{RavenLinkError, Result};

pub use batch::BatchCommand;
pub use create_subscription::{CreateSubscriptionCommand, CreateSubscriptionResult};
pub use delete_subscription::DeleteSubscriptionCommand;
pub use drop_subscription_connection::DropSubscriptionConnectionCommand;
pub use get_subscription_state::GetSubscriptionStateCommand;
pub use get_subscriptions::GetSubscriptionsCommand;
pub use get_tcp_info::GetTcpInfoCommand;

/// HTTP method of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Transport-neutral description of one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub method: HttpMethod,
    /// Database the call is scoped to; `None` for server-wide endpoints
    pub database: Option<String>,
    /// Path below the database (or server) root, starting with `/`
    pub path: String,
    /// Unencoded query parameters
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
    /// Node the executor should try first
    pub preferred_node_tag: Option<String>,
}

impl CommandRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            database: None,
            path: path.into(),
            query: Vec::new(),
            body: None,
            preferred_node_tag: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn prefer_node(mut self, node_tag: Option<String>) -> Self {
        self.preferred_node_tag = node_tag;
        self
    }

    /// Path including the database prefix, without query string.
    pub fn full_path(&self) -> String {
        match &self.database {
            Some(db) => format!("/databases/{}{}", db, self.path),
            None => self.path.clone(),
        }
    }

    /// Value of query parameter `key`, if present.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A typed registry command.
pub trait RavenCommand: Send + Sync {
    type Output: Send;

    /// Build the request for `database`.
    fn create_request(&self, database: &str) -> Result<CommandRequest>;

    /// Parse the response body (`None` for an empty body).
    fn set_response(&self, response: Option<JsonValue>) -> Result<Self::Output>;

    /// Outcome of a 404. Passes the server error through by default.
    fn not_found(&self, error: RavenLinkError) -> Result<Self::Output> {
        Err(error)
    }
}

pub(crate) fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RavenLinkError::InvalidArgument(format!("{} cannot be empty", what)));
    }
    Ok(())
}

pub(crate) fn require_body(response: Option<JsonValue>, command: &str) -> Result<JsonValue> {
    response.ok_or_else(|| {
        RavenLinkError::SerializationError(format!("{} returned an empty response", command))
    })
}
