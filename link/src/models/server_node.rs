use serde::{Deserialize, Serialize};

/// One node of the cluster the HTTP executor may talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerNode {
    /// Base URL, e.g. `http://127.0.0.1:8080`
    pub url: String,
    /// Cluster tag of the node (`A`, `B`, ...), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_tag: Option<String>,
}

impl ServerNode {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cluster_tag: None,
        }
    }

    pub fn with_cluster_tag(mut self, tag: impl Into<String>) -> Self {
        self.cluster_tag = Some(tag.into());
        self
    }
}
