use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RavenLinkError, Result};
use crate::executor::RequestExecutor;

use super::subscription_opening_strategy::SubscriptionOpeningStrategy;

/// Client-side configuration of one subscription worker.
///
/// # Example
///
/// ```rust
/// use raven_link::{SubscriptionOpeningStrategy, SubscriptionWorkerOptions};
/// use std::time::Duration;
///
/// let options = SubscriptionWorkerOptions::new("orders-feed")
///     .with_strategy(SubscriptionOpeningStrategy::WaitForFree)
///     .with_max_docs_per_batch(25)
///     .with_time_to_wait_before_connection_retry(Duration::from_secs(1))
///     .with_ignore_subscriber_errors(true);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct SubscriptionWorkerOptions {
    /// Name of the subscription to consume
    pub subscription_name: String,

    /// Exclusivity policy requested on connect
    /// Default: OpenIfFree
    #[serde(default)]
    pub strategy: SubscriptionOpeningStrategy,

    /// Maximum documents per batch
    /// Default: 4096
    #[serde(default = "default_max_docs_per_batch")]
    pub max_docs_per_batch: u32,

    /// Maximum batch size in bytes, server default when unset
    #[serde(default)]
    pub max_batch_size: Option<u64>,

    /// Interval at which the server is expected to send heartbeats on an
    /// idle stream. Silence longer than this plus the heartbeat grace
    /// triggers a reconnect. Set to 0 to disable idle detection.
    /// Default: 5000ms
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Base delay before reconnecting after a transient failure
    /// Default: 5000ms, doubled per consecutive failure
    #[serde(default = "default_retry_delay_ms")]
    pub time_to_wait_before_connection_retry_ms: u64,

    /// Cap for the reconnect backoff
    /// Default: 60000ms
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// How long the worker may keep failing transiently before giving up
    /// Default: 300000ms (5 minutes)
    #[serde(default = "default_max_erroneous_period_ms")]
    pub max_erroneous_period_ms: u64,

    /// Acknowledge batches even when a handler fails
    #[serde(default)]
    pub ignore_subscriber_errors: bool,

    /// Ask the server to close the subscription once it has nothing left to send
    #[serde(default)]
    pub close_when_no_docs_left: bool,

    /// Client-chosen worker identifier, generated when absent
    #[serde(default)]
    pub worker_id: Option<String>,

    /// Executor used instead of the client's for this worker
    #[serde(skip)]
    pub request_executor: Option<Arc<dyn RequestExecutor>>,
}

fn default_max_docs_per_batch() -> u32 {
    4096
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_max_retry_delay_ms() -> u64 {
    60_000
}

fn default_max_erroneous_period_ms() -> u64 {
    300_000
}

impl fmt::Debug for SubscriptionWorkerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionWorkerOptions")
            .field("subscription_name", &self.subscription_name)
            .field("strategy", &self.strategy)
            .field("max_docs_per_batch", &self.max_docs_per_batch)
            .field("max_batch_size", &self.max_batch_size)
            .field("heartbeat_interval_ms", &self.heartbeat_interval_ms)
            .field(
                "time_to_wait_before_connection_retry_ms",
                &self.time_to_wait_before_connection_retry_ms,
            )
            .field("max_retry_delay_ms", &self.max_retry_delay_ms)
            .field("max_erroneous_period_ms", &self.max_erroneous_period_ms)
            .field("ignore_subscriber_errors", &self.ignore_subscriber_errors)
            .field("close_when_no_docs_left", &self.close_when_no_docs_left)
            .field("worker_id", &self.worker_id)
            .field("request_executor", &self.request_executor.is_some())
            .finish()
    }
}

impl SubscriptionWorkerOptions {
    /// Options for `subscription_name` with defaults everywhere else
    pub fn new(subscription_name: impl Into<String>) -> Self {
        Self {
            subscription_name: subscription_name.into(),
            strategy: SubscriptionOpeningStrategy::default(),
            max_docs_per_batch: default_max_docs_per_batch(),
            max_batch_size: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            time_to_wait_before_connection_retry_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            max_erroneous_period_ms: default_max_erroneous_period_ms(),
            ignore_subscriber_errors: false,
            close_when_no_docs_left: false,
            worker_id: None,
            request_executor: None,
        }
    }

    pub fn with_strategy(mut self, strategy: SubscriptionOpeningStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_docs_per_batch(mut self, max_docs: u32) -> Self {
        self.max_docs_per_batch = max_docs;
        self
    }

    pub fn with_max_batch_size(mut self, bytes: u64) -> Self {
        self.max_batch_size = Some(bytes);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_time_to_wait_before_connection_retry(mut self, delay: Duration) -> Self {
        self.time_to_wait_before_connection_retry_ms = duration_ms(delay);
        self
    }

    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay_ms = duration_ms(delay);
        self
    }

    pub fn with_max_erroneous_period(mut self, period: Duration) -> Self {
        self.max_erroneous_period_ms = duration_ms(period);
        self
    }

    pub fn with_ignore_subscriber_errors(mut self, ignore: bool) -> Self {
        self.ignore_subscriber_errors = ignore;
        self
    }

    pub fn with_close_when_no_docs_left(mut self, close: bool) -> Self {
        self.close_when_no_docs_left = close;
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_request_executor(mut self, executor: Arc<dyn RequestExecutor>) -> Self {
        self.request_executor = Some(executor);
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn time_to_wait_before_connection_retry(&self) -> Duration {
        Duration::from_millis(self.time_to_wait_before_connection_retry_ms)
    }

    pub fn max_erroneous_period(&self) -> Duration {
        Duration::from_millis(self.max_erroneous_period_ms)
    }

    /// Backoff before reconnect attempt number `attempt` (0-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let delay = std::cmp::min(
            self.time_to_wait_before_connection_retry_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
            self.max_retry_delay_ms,
        );
        Duration::from_millis(delay)
    }

    /// Reject options the server would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.subscription_name.trim().is_empty() {
            return Err(RavenLinkError::InvalidArgument(
                "subscription name cannot be empty".to_string(),
            ));
        }
        if self.max_docs_per_batch == 0 {
            return Err(RavenLinkError::InvalidArgument(
                "max_docs_per_batch must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
