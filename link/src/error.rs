//! Error types for the raven-link client.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors carry
//! owned strings so they can be cloned into listeners and completion
//! handles; match on [`RavenLinkError::kind`] rather than on messages.

use thiserror::Error;

use crate::models::SubscriptionOpeningStrategy;

/// Result type for raven-link operations
pub type Result<T> = std::result::Result<T, RavenLinkError>;

/// Symbolic discriminant of a [`RavenLinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProtocolMismatch,
    SubscriptionDoesNotExist,
    SubscriptionInUse,
    SubscriptionClosed,
    SubscriptionInvalidState,
    SubscriptionDoesNotBelongToNode,
    SubscriberError,
    ConnectionTransient,
    InvalidDocumentInBatch,
    DeferredCommandConflict,
    InvalidArgument,
    Authorization,
    Configuration,
    Network,
    Timeout,
    Serialization,
    Server,
    Disposed,
}

/// Errors that can occur in the client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RavenLinkError {
    /// Client and server share no subscription protocol version
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The named subscription is not registered on the server
    #[error("Subscription does not exist: {0}")]
    SubscriptionDoesNotExist(String),

    /// Another client holds the subscription
    #[error("Subscription in use: {0}")]
    SubscriptionInUse(String),

    /// The server closed the subscription (dropped, deleted or drained)
    #[error("Subscription closed: {0}")]
    SubscriptionClosed(String),

    /// The subscription cannot be served in its current state (invalid query, disabled)
    #[error("Subscription in invalid state: {0}")]
    SubscriptionInvalidState(String),

    /// The connected node is not responsible for the subscription
    #[error("Subscription does not belong to node {node_tag:?}: {message}")]
    SubscriptionDoesNotBelongToNode {
        node_tag: Option<String>,
        message: String,
    },

    /// A batch handler failed or asked to stop
    #[error("Subscriber error: {0}")]
    SubscriberError(String),

    /// Network reset, silence or an unreachable node
    #[error("Transient connection failure: {0}")]
    ConnectionTransient(String),

    /// A single batch item could not be used
    #[error("Invalid document '{id}' in batch: {message}")]
    InvalidDocumentInBatch { id: String, message: String },

    /// A deferred command clashes with one already pending
    #[error("Deferred command conflict: {0}")]
    DeferredCommandConflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Authorization failed: {0}")]
    AuthorizationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Non-success HTTP response from the registry API
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// The worker or client was disposed
    #[error("Disposed")]
    Disposed,
}

impl RavenLinkError {
    /// Symbolic kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProtocolMismatch(_) => ErrorKind::ProtocolMismatch,
            Self::SubscriptionDoesNotExist(_) => ErrorKind::SubscriptionDoesNotExist,
            Self::SubscriptionInUse(_) => ErrorKind::SubscriptionInUse,
            Self::SubscriptionClosed(_) => ErrorKind::SubscriptionClosed,
            Self::SubscriptionInvalidState(_) => ErrorKind::SubscriptionInvalidState,
            Self::SubscriptionDoesNotBelongToNode { .. } => {
                ErrorKind::SubscriptionDoesNotBelongToNode
            },
            Self::SubscriberError(_) => ErrorKind::SubscriberError,
            Self::ConnectionTransient(_) => ErrorKind::ConnectionTransient,
            Self::InvalidDocumentInBatch { .. } => ErrorKind::InvalidDocumentInBatch,
            Self::DeferredCommandConflict(_) => ErrorKind::DeferredCommandConflict,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::AuthorizationError(_) => ErrorKind::Authorization,
            Self::ConfigurationError(_) => ErrorKind::Configuration,
            Self::NetworkError(_) => ErrorKind::Network,
            Self::TimeoutError(_) => ErrorKind::Timeout,
            Self::SerializationError(_) => ErrorKind::Serialization,
            Self::ServerError { .. } => ErrorKind::Server,
            Self::Disposed => ErrorKind::Disposed,
        }
    }

    /// Whether the worker lifecycle should reconnect after this error.
    ///
    /// `SubscriptionInUse` is only worth waiting out under
    /// [`SubscriptionOpeningStrategy::WaitForFree`].
    pub fn is_retryable(&self, strategy: SubscriptionOpeningStrategy) -> bool {
        match self {
            Self::ConnectionTransient(_)
            | Self::NetworkError(_)
            | Self::TimeoutError(_)
            | Self::SubscriptionDoesNotBelongToNode { .. } => true,
            Self::SubscriptionInUse(_) => strategy == SubscriptionOpeningStrategy::WaitForFree,
            Self::ServerError { status_code, .. } => {
                matches!(status_code, 408 | 429 | 502 | 503 | 504)
            },
            _ => false,
        }
    }

    /// Node tag a redirect asks the next attempt to use, if any.
    pub fn redirect_node_tag(&self) -> Option<&str> {
        match self {
            Self::SubscriptionDoesNotBelongToNode { node_tag, .. } => node_tag.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RavenLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimeoutError(err.to_string())
        } else if err.is_decode() {
            Self::SerializationError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RavenLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for RavenLinkError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        match err.kind() {
            IoKind::TimedOut => Self::TimeoutError(err.to_string()),
            IoKind::ConnectionReset
            | IoKind::ConnectionAborted
            | IoKind::BrokenPipe
            | IoKind::UnexpectedEof => Self::ConnectionTransient(err.to_string()),
            _ => Self::NetworkError(err.to_string()),
        }
    }
}
