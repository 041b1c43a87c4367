use serde::{Deserialize, Serialize};

/// Definition sent when creating a subscription.
///
/// # Example
///
/// ```rust
/// use raven_link::SubscriptionCreationOptions;
///
/// let options = SubscriptionCreationOptions::new("from Orders as doc")
///     .with_name("orders-feed")
///     .with_mentor_node("A");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionCreationOptions {
    /// Client-chosen name; the server generates one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Selection query, e.g. `from Orders as doc`
    #[serde(default)]
    pub query: String,

    /// Start position; `LastDocument` and `DoNotChange` are understood by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_vector: Option<String>,

    /// Preferred node for serving the subscription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentor_node: Option<String>,

    #[serde(default)]
    pub disabled: bool,
}

impl SubscriptionCreationOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// `from <collection> as doc`
    pub fn for_collection(collection: &str) -> Self {
        Self::new(format!("from {} as doc", collection))
    }

    /// `from <collection> (Revisions = true) as doc`
    pub fn for_revisions(collection: &str) -> Self {
        Self::new(format!("from {} (Revisions = true) as doc", collection))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_change_vector(mut self, change_vector: impl Into<String>) -> Self {
        self.change_vector = Some(change_vector.into());
        self
    }

    pub fn with_mentor_node(mut self, node_tag: impl Into<String>) -> Self {
        self.mentor_node = Some(node_tag.into());
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}
