use serde::{Deserialize, Serialize};

/// Frames the client writes after the options frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum SubscriptionClientMessage {
    /// Acknowledge the batch ending at `change_vector`
    ///
    /// `None` acknowledges an empty batch.
    #[serde(rename_all = "PascalCase")]
    Acknowledge { change_vector: Option<String> },

    /// The worker is going away
    DisposedNotification,
}

impl SubscriptionClientMessage {
    pub fn acknowledge(change_vector: Option<&str>) -> Self {
        Self::Acknowledge {
            change_vector: change_vector.map(str::to_string),
        }
    }
}
