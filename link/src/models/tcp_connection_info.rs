use serde::{Deserialize, Serialize};

use crate::error::{RavenLinkError, Result};

/// TCP endpoint advertised by a node through `/info/tcp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TcpConnectionInfo {
    /// `tcp://host:port`
    pub url: String,
    /// Server certificate for TLS endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// Cluster tag of the node serving this endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_tag: Option<String>,
}

impl TcpConnectionInfo {
    /// Split the advertised URL into host and port.
    ///
    /// Only plain `tcp://` endpoints are supported.
    pub fn host_and_port(&self) -> Result<(String, u16)> {
        if self.certificate.is_some() {
            return Err(RavenLinkError::ConfigurationError(format!(
                "TLS tcp endpoint '{}' is not supported",
                self.url
            )));
        }
        let url = reqwest::Url::parse(&self.url).map_err(|e| {
            RavenLinkError::ConfigurationError(format!("Invalid tcp url '{}': {}", self.url, e))
        })?;
        if url.scheme() != "tcp" {
            return Err(RavenLinkError::ConfigurationError(format!(
                "Unsupported tcp url scheme '{}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| {
                RavenLinkError::ConfigurationError(format!("Tcp url '{}' has no host", self.url))
            })?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().ok_or_else(|| {
            RavenLinkError::ConfigurationError(format!("Tcp url '{}' has no port", self.url))
        })?;
        Ok((host, port))
    }
}
