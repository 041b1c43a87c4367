use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::subscription_opening_strategy::SubscriptionOpeningStrategy;
use super::subscription_worker_options::SubscriptionWorkerOptions;

/// Options frame written right after a successful header exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionConnectRequest {
    pub subscription_name: String,
    pub strategy: SubscriptionOpeningStrategy,
    pub max_docs_per_batch: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<u64>,
    pub ignore_subscriber_errors: bool,
    pub close_when_no_docs_left: bool,
    /// .NET `TimeSpan` text, e.g. `00:00:05`
    pub time_to_wait_before_connection_retry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl SubscriptionConnectRequest {
    pub fn from_options(options: &SubscriptionWorkerOptions, worker_id: &str) -> Self {
        Self {
            subscription_name: options.subscription_name.clone(),
            strategy: options.strategy,
            max_docs_per_batch: options.max_docs_per_batch,
            max_batch_size: options.max_batch_size,
            ignore_subscriber_errors: options.ignore_subscriber_errors,
            close_when_no_docs_left: options.close_when_no_docs_left,
            time_to_wait_before_connection_retry: format_time_span(
                options.time_to_wait_before_connection_retry(),
            ),
            worker_id: Some(worker_id.to_string()),
        }
    }
}

/// Format as `[d.]hh:mm:ss[.fffffff]`.
pub fn format_time_span(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    let ticks = duration.subsec_nanos() / 100;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if ticks > 0 {
        out.push_str(&format!(".{:07}", ticks));
    }
    out
}
