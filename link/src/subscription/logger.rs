use std::fmt;

/// Default log target of subscription workers.
pub const DEFAULT_WORKER_LOG_TARGET: &str = "raven_link::subscription";

/// Logger handed to one worker at construction.
///
/// Every line carries the worker's target and is prefixed with the
/// subscription name, so several workers can be told apart in one log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLogger {
    target: String,
    subscription: String,
}

impl WorkerLogger {
    pub fn new(target: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            subscription: subscription.into(),
        }
    }

    /// Logger with the default target.
    pub fn for_subscription(subscription: impl Into<String>) -> Self {
        Self::new(DEFAULT_WORKER_LOG_TARGET, subscription)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        log::debug!(target: &self.target, "[{}] {}", self.subscription, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        log::info!(target: &self.target, "[{}] {}", self.subscription, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        log::warn!(target: &self.target, "[{}] {}", self.subscription, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        log::error!(target: &self.target, "[{}] {}", self.subscription, args);
    }
}
