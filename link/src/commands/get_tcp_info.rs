use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::models::TcpConnectionInfo;

use super::{require_body, CommandRequest, RavenCommand};

/// GET `/info/tcp?tag={tag}`
///
/// Resolves the TCP endpoint of a node. The executor is asked to prefer
/// `node_tag` when one is known.
#[derive(Debug, Clone)]
pub struct GetTcpInfoCommand {
    tag: String,
    node_tag: Option<String>,
}

impl GetTcpInfoCommand {
    pub fn new(tag: impl Into<String>, node_tag: Option<String>) -> Self {
        Self {
            tag: tag.into(),
            node_tag,
        }
    }
}

impl RavenCommand for GetTcpInfoCommand {
    type Output = TcpConnectionInfo;

    fn create_request(&self, _database: &str) -> Result<CommandRequest> {
        Ok(CommandRequest::get("/info/tcp")
            .with_query("tag", &self.tag)
            .prefer_node(self.node_tag.clone()))
    }

    fn set_response(&self, response: Option<JsonValue>) -> Result<TcpConnectionInfo> {
        let body = require_body(response, "GetTcpInfo")?;
        Ok(serde_json::from_value(body)?)
    }
}
