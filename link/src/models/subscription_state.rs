use serde::{Deserialize, Serialize};

/// Server-side record of a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionState {
    pub subscription_name: String,
    #[serde(default)]
    pub subscription_id: i64,
    #[serde(default)]
    pub query: String,
    /// Position the next batch starts from, advanced on every ack
    #[serde(default)]
    pub change_vector_for_next_batch_starting_point: Option<String>,
    #[serde(default)]
    pub mentor_node: Option<String>,
    /// Node currently serving the subscription
    #[serde(default)]
    pub node_tag: Option<String>,
    #[serde(default)]
    pub last_batch_ack_time: Option<String>,
    #[serde(default)]
    pub last_client_connection_time: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}
