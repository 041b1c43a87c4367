use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::models::SubscriptionState;

use super::{CommandRequest, RavenCommand};

/// GET `/databases/{db}/subscriptions?start={start}&pageSize={take}`
#[derive(Debug, Clone)]
pub struct GetSubscriptionsCommand {
    start: usize,
    page_size: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSubscriptionsResult {
    #[serde(default)]
    results: Vec<SubscriptionState>,
}

impl GetSubscriptionsCommand {
    pub fn new(start: usize, page_size: usize) -> Self {
        Self { start, page_size }
    }
}

impl RavenCommand for GetSubscriptionsCommand {
    type Output = Vec<SubscriptionState>;

    fn create_request(&self, database: &str) -> Result<CommandRequest> {
        Ok(CommandRequest::get("/subscriptions")
            .in_database(database)
            .with_query("start", self.start)
            .with_query("pageSize", self.page_size))
    }

    fn set_response(&self, response: Option<JsonValue>) -> Result<Vec<SubscriptionState>> {
        match response {
            Some(body) => Ok(serde_json::from_value::<GetSubscriptionsResult>(body)?.results),
            None => Ok(Vec::new()),
        }
    }
}
