use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::Result;

use super::{CommandRequest, RavenCommand};

/// POST `/databases/{db}/bulk_docs`
///
/// Executes a flushed set of deferred commands as one server transaction.
#[derive(Debug, Clone)]
pub struct BatchCommand {
    commands: Vec<JsonValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BatchResult {
    #[serde(default)]
    results: Vec<JsonValue>,
}

impl BatchCommand {
    pub fn new(commands: Vec<JsonValue>) -> Self {
        Self { commands }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl RavenCommand for BatchCommand {
    type Output = Vec<JsonValue>;

    fn create_request(&self, database: &str) -> Result<CommandRequest> {
        Ok(CommandRequest::post("/bulk_docs")
            .in_database(database)
            .with_body(json!({ "Commands": self.commands })))
    }

    fn set_response(&self, response: Option<JsonValue>) -> Result<Vec<JsonValue>> {
        match response {
            Some(body) => Ok(serde_json::from_value::<BatchResult>(body)?.results),
            None => Ok(Vec::new()),
        }
    }
}
