use serde_json::Value as JsonValue;

use crate::error::{RavenLinkError, Result};
use crate::models::SubscriptionState;

use super::{require_body, require_name, CommandRequest, RavenCommand};

/// GET `/databases/{db}/subscriptions/state?name={name}`
#[derive(Debug, Clone)]
pub struct GetSubscriptionStateCommand {
    name: String,
}

impl GetSubscriptionStateCommand {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_name(&name, "subscription name")?;
        Ok(Self { name })
    }
}

impl RavenCommand for GetSubscriptionStateCommand {
    type Output = SubscriptionState;

    fn create_request(&self, database: &str) -> Result<CommandRequest> {
        Ok(CommandRequest::get("/subscriptions/state")
            .in_database(database)
            .with_query("name", &self.name))
    }

    fn set_response(&self, response: Option<JsonValue>) -> Result<SubscriptionState> {
        let body = require_body(response, "GetSubscriptionState")?;
        Ok(serde_json::from_value(body)?)
    }

    fn not_found(&self, _error: RavenLinkError) -> Result<SubscriptionState> {
        Err(RavenLinkError::SubscriptionDoesNotExist(format!(
            "Subscription '{}' was not found",
            self.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_empty_name_is_invalid() {
        let err = GetSubscriptionStateCommand::new("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_not_found_maps_to_does_not_exist() {
        let cmd = GetSubscriptionStateCommand::new("orders").unwrap();
        let req = cmd.create_request("db").unwrap();
        assert_eq!(req.full_path(), "/databases/db/subscriptions/state");
        assert_eq!(req.query_param("name"), Some("orders"));

        let err = cmd
            .not_found(RavenLinkError::ServerError {
                status_code: 404,
                message: "missing".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SubscriptionDoesNotExist);
    }
}
