use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{RavenLinkError, Result};
use crate::models::SubscriptionCreationOptions;

use super::{require_body, CommandRequest, RavenCommand};

/// PUT `/databases/{db}/subscriptions`
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    options: SubscriptionCreationOptions,
}

/// Registry answer to a create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateSubscriptionResult {
    pub name: String,
    #[serde(default)]
    pub raft_command_index: Option<i64>,
}

impl CreateSubscriptionCommand {
    pub fn new(options: SubscriptionCreationOptions) -> Result<Self> {
        if options.query.trim().is_empty() {
            return Err(RavenLinkError::InvalidArgument(
                "subscription query cannot be empty".to_string(),
            ));
        }
        Ok(Self { options })
    }
}

impl RavenCommand for CreateSubscriptionCommand {
    type Output = CreateSubscriptionResult;

    fn create_request(&self, database: &str) -> Result<CommandRequest> {
        Ok(CommandRequest::put("/subscriptions")
            .in_database(database)
            .with_body(serde_json::to_value(&self.options)?))
    }

    fn set_response(&self, response: Option<JsonValue>) -> Result<Self::Output> {
        let body = require_body(response, "CreateSubscription")?;
        Ok(serde_json::from_value(body)?)
    }
}
