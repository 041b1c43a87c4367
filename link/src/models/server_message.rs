use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Status the server reports after reading the subscription options frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionConnectionStatus {
    None,
    Accepted,
    InUse,
    Closed,
    NotFound,
    Redirect,
    ForbiddenReadOnly,
    Forbidden,
    Invalid,
    ConcurrencyReconnect,
}

/// Extra data attached to a `ConnectionStatus` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionStatusData {
    /// Node the client should reconnect to on `Redirect`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirected_tag: Option<String>,
    /// Node that answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tag: Option<String>,
}

/// Frames sent by the server on an open subscription stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum SubscriptionServerMessage {
    /// Answer to the options frame
    #[serde(rename_all = "PascalCase")]
    ConnectionStatus {
        status: SubscriptionConnectionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_connection_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exception: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ConnectionStatusData>,
    },

    /// One document of the batch being assembled
    #[serde(rename_all = "PascalCase")]
    Data {
        #[serde(default)]
        data: JsonValue,
        /// Per-item failure reported by the server
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exception: Option<String>,
    },

    /// Included documents for the upcoming batch
    #[serde(rename_all = "PascalCase")]
    Includes { includes: JsonValue },

    /// Included counters for the upcoming batch
    #[serde(rename_all = "PascalCase")]
    CounterIncludes {
        counter_includes: JsonValue,
        #[serde(default)]
        included_counter_names: JsonValue,
    },

    /// Closes the batch being assembled
    EndOfBatch,

    /// Confirms the last acknowledgment
    Confirm,

    /// Fatal or redirecting server condition
    #[serde(rename_all = "PascalCase")]
    Error {
        /// Server exception class name
        #[serde(default)]
        exception: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },

    /// Keeps an idle stream alive
    Heartbeat,

    /// Any frame type this client does not know
    #[serde(other)]
    Unknown,
}

impl SubscriptionServerMessage {
    /// Short frame name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ConnectionStatus { .. } => "ConnectionStatus",
            Self::Data { .. } => "Data",
            Self::Includes { .. } => "Includes",
            Self::CounterIncludes { .. } => "CounterIncludes",
            Self::EndOfBatch => "EndOfBatch",
            Self::Confirm => "Confirm",
            Self::Error { .. } => "Error",
            Self::Heartbeat => "Heartbeat",
            Self::Unknown => "Unknown",
        }
    }
}
