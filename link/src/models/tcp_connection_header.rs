use serde::{Deserialize, Serialize};

/// Subscription protocol versions this client speaks, newest first.
pub const SUPPORTED_SUBSCRIPTION_VERSIONS: &[i32] = &[53, 40];

/// Baseline subscription protocol version.
pub const SUBSCRIPTION_BASE_LINE: i32 = 40;

/// Operation requested in the connection header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcpOperation {
    Subscription,
    Heartbeats,
    Ping,
    Drop,
}

/// First frame written on a fresh TCP connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TcpConnectionHeaderMessage {
    pub database_name: String,
    pub operation: TcpOperation,
    pub operation_version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_node_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl TcpConnectionHeaderMessage {
    pub fn subscription(database: impl Into<String>, version: i32) -> Self {
        Self {
            database_name: database.into(),
            operation: TcpOperation::Subscription,
            operation_version: version,
            source_node_tag: None,
            info: None,
        }
    }
}

/// Outcome the server reports for a connection header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcpConnectionStatus {
    Ok,
    AuthorizationFailed,
    TcpVersionMismatch,
    InvalidNetworkTopology,
}

/// Server answer to [`TcpConnectionHeaderMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TcpConnectionHeaderResponse {
    pub status: TcpConnectionStatus,
    /// Version the server is willing to speak
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Highest supported version that does not exceed `server_version`.
pub fn highest_supported_version(server_version: i32) -> Option<i32> {
    SUPPORTED_SUBSCRIPTION_VERSIONS
        .iter()
        .copied()
        .find(|v| *v <= server_version)
}
