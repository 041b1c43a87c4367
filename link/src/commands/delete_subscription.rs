use serde_json::Value as JsonValue;

use crate::error::Result;

use super::{require_name, CommandRequest, RavenCommand};

/// DELETE `/databases/{db}/subscriptions?taskName={name}`
#[derive(Debug, Clone)]
pub struct DeleteSubscriptionCommand {
    name: String,
}

impl DeleteSubscriptionCommand {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_name(&name, "subscription name")?;
        Ok(Self { name })
    }
}

impl RavenCommand for DeleteSubscriptionCommand {
    type Output = ();

    fn create_request(&self, database: &str) -> Result<CommandRequest> {
        Ok(CommandRequest::delete("/subscriptions")
            .in_database(database)
            .with_query("taskName", &self.name))
    }

    fn set_response(&self, _response: Option<JsonValue>) -> Result<()> {
        Ok(())
    }
}
