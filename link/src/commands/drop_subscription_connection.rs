use serde_json::Value as JsonValue;

use crate::error::{RavenLinkError, Result};

use super::{require_name, CommandRequest, RavenCommand};

/// POST `/databases/{db}/subscriptions/drop?name={name}`
///
/// Forces the server to close every connection of the subscription. The
/// connected workers end with `SubscriptionClosed`.
#[derive(Debug, Clone)]
pub struct DropSubscriptionConnectionCommand {
    name: String,
    worker_id: Option<String>,
}

impl DropSubscriptionConnectionCommand {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_name(&name, "subscription name")?;
        Ok(Self {
            name,
            worker_id: None,
        })
    }

    /// Only drop the connection of one worker.
    pub fn for_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }
}

impl RavenCommand for DropSubscriptionConnectionCommand {
    type Output = ();

    fn create_request(&self, database: &str) -> Result<CommandRequest> {
        let mut request = CommandRequest::post("/subscriptions/drop")
            .in_database(database)
            .with_query("name", &self.name);
        if let Some(worker_id) = &self.worker_id {
            request = request.with_query("workerId", worker_id);
        }
        Ok(request)
    }

    fn set_response(&self, _response: Option<JsonValue>) -> Result<()> {
        Ok(())
    }

    fn not_found(&self, _error: RavenLinkError) -> Result<()> {
        Err(RavenLinkError::SubscriptionDoesNotExist(format!(
            "Subscription '{}' was not found",
            self.name
        )))
    }
}
