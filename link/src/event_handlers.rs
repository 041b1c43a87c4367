//! Subscription worker lifecycle event handlers.
//!
//! Provides callback-based hooks for monitoring a worker:
//!
//! - [`on_connect`](EventHandlers::on_connect): a connection was accepted by a node
//! - [`on_disconnect`](EventHandlers::on_disconnect): the current connection ended
//! - [`on_connection_retry`](EventHandlers::on_connection_retry): a transient failure, the worker will reconnect
//! - [`on_error`](EventHandlers::on_error): the single terminal error of the worker
//! - [`on_after_acknowledgment`](EventHandlers::on_after_acknowledgment): the server confirmed a batch ack
//! - [`on_end`](EventHandlers::on_end): the worker stopped (after any terminal error)
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send): raw frame debug hooks
//!
//! # Example
//!
//! ```rust
//! use raven_link::{EventHandlers, RavenLinkError};
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|node| println!("connected to node {}", node.unwrap_or("?")))
//!     .on_connection_retry(|err| eprintln!("retrying: {}", err))
//!     .on_error(|err: &RavenLinkError| eprintln!("subscription failed: {}", err));
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::RavenLinkError;
use crate::subscription::handler::panic_message;
use crate::subscription::{SubscriptionBatch, WorkerLogger};

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// Whether the worker will try to reconnect.
    pub will_reconnect: bool,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>, will_reconnect: bool) -> Self {
        Self {
            message: message.into(),
            will_reconnect,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.will_reconnect {
            write!(f, "{} (reconnecting)", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Receives the terminal error of a worker, exactly once.
pub trait ErrorListener: Send + Sync {
    fn on_error(&self, error: &RavenLinkError);
}

impl<F> ErrorListener for F
where
    F: Fn(&RavenLinkError) + Send + Sync,
{
    fn on_error(&self, error: &RavenLinkError) {
        self(error)
    }
}

/// Type alias for the on_connect callback (receives the node tag, if known).
pub type OnConnectCallback = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Type alias for the on_connection_retry callback.
pub type OnConnectionRetryCallback = Arc<dyn Fn(&RavenLinkError) + Send + Sync>;

/// Type alias for the on_after_acknowledgment callback.
pub type OnAfterAcknowledgmentCallback = Arc<dyn Fn(&SubscriptionBatch) + Send + Sync>;

/// Type alias for the on_end callback.
pub type OnEndCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the raw frame debug hooks.
pub type OnFrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Worker lifecycle event handlers.
///
/// All handlers are optional. Handlers are `Send + Sync` and run on the
/// worker's tasks, so they should return quickly. A panicking handler is
/// logged and does not stop the worker.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_connection_retry: Option<OnConnectionRetryCallback>,
    pub(crate) on_error: Option<Arc<dyn ErrorListener>>,
    pub(crate) on_after_acknowledgment: Option<OnAfterAcknowledgmentCallback>,
    pub(crate) on_end: Option<OnEndCallback>,
    pub(crate) on_receive: Option<OnFrameCallback>,
    pub(crate) on_send: Option<OnFrameCallback>,
    logger: Option<WorkerLogger>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_connection_retry", &self.on_connection_retry.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_after_acknowledgment", &self.on_after_acknowledgment.is_some())
            .field("on_end", &self.on_end.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when a node accepts the subscription connection.
    pub fn on_connect(mut self, f: impl Fn(Option<&str>) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the current connection ends.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked before each reconnect attempt.
    ///
    /// Transient errors never reach [`on_error`](Self::on_error); this hook
    /// is their only trace.
    pub fn on_connection_retry(
        mut self,
        f: impl Fn(&RavenLinkError) + Send + Sync + 'static,
    ) -> Self {
        self.on_connection_retry = Some(Arc::new(f));
        self
    }

    /// Register the listener for the worker's terminal error.
    pub fn on_error(mut self, listener: impl ErrorListener + 'static) -> Self {
        self.on_error = Some(Arc::new(listener));
        self
    }

    /// Register a callback invoked once the server confirms a batch ack.
    pub fn on_after_acknowledgment(
        mut self,
        f: impl Fn(&SubscriptionBatch) + Send + Sync + 'static,
    ) -> Self {
        self.on_after_acknowledgment = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked once when the worker stops for any reason.
    pub fn on_end(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every raw frame received from the server.
    ///
    /// This is a **debug/tracing hook**. Not needed for normal operation.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every raw frame sent to the server.
    ///
    /// This is a **debug/tracing hook**. Not needed for normal operation.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_connection_retry.is_some()
            || self.on_error.is_some()
            || self.on_after_acknowledgment.is_some()
            || self.on_end.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    /// Copy of these handlers that reports listener panics through `logger`.
    pub(crate) fn with_logger(mut self, logger: WorkerLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    fn guarded(&self, hook: &str, f: impl FnOnce()) {
        let Err(panic) = catch_unwind(AssertUnwindSafe(f)) else {
            return;
        };
        let message = panic_message(panic.as_ref());
        match &self.logger {
            Some(logger) => logger.warn(format_args!("{} listener panicked: {}", hook, message)),
            None => log::warn!("[raven-link] {} listener panicked: {}", hook, message),
        }
    }

    pub(crate) fn emit_connect(&self, node_tag: Option<&str>) {
        if let Some(cb) = &self.on_connect {
            self.guarded("on_connect", || cb(node_tag));
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            self.guarded("on_disconnect", || cb(reason));
        }
    }

    pub(crate) fn emit_connection_retry(&self, error: &RavenLinkError) {
        if let Some(cb) = &self.on_connection_retry {
            self.guarded("on_connection_retry", || cb(error));
        }
    }

    pub(crate) fn emit_error(&self, error: &RavenLinkError) {
        if let Some(listener) = &self.on_error {
            self.guarded("on_error", || listener.on_error(error));
        }
    }

    pub(crate) fn emit_after_acknowledgment(&self, batch: &SubscriptionBatch) {
        if let Some(cb) = &self.on_after_acknowledgment {
            self.guarded("on_after_acknowledgment", || cb(batch));
        }
    }

    pub(crate) fn emit_end(&self) {
        if let Some(cb) = &self.on_end {
            self.guarded("on_end", || cb());
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            self.guarded("on_receive", || cb(raw));
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            self.guarded("on_send", || cb(raw));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_handlers() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        handlers.emit_connect(Some("A"));
        handlers.emit_error(&RavenLinkError::Disposed);
    }

    #[test]
    fn test_error_listener_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handlers = EventHandlers::new().on_error(move |err: &RavenLinkError| {
            assert_eq!(err, &RavenLinkError::SubscriptionClosed("dropped".into()));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handlers.has_any());
        handlers.emit_error(&RavenLinkError::SubscriptionClosed("dropped".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let ends = Arc::new(AtomicUsize::new(0));
        let seen = ends.clone();
        let handlers = EventHandlers::new()
            .on_connect(|_node| panic!("listener bug"))
            .on_error(|_err: &RavenLinkError| panic!("listener bug"))
            .on_end(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .with_logger(WorkerLogger::for_subscription("orders"));

        handlers.emit_connect(Some("A"));
        handlers.emit_error(&RavenLinkError::Disposed);
        handlers.emit_end();
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_shows_registration() {
        let handlers = EventHandlers::new().on_end(|| {});
        let debug = format!("{:?}", handlers);
        assert!(debug.contains("on_end: true"));
        assert!(debug.contains("on_connect: false"));
    }
}
