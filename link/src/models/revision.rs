use serde::{Deserialize, Serialize};

/// A document revision pair delivered by a revisions subscription.
///
/// `previous` is absent for a newly created document and `current` is
/// absent for a deleted one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Revision<T> {
    pub previous: Option<T>,
    pub current: Option<T>,
}
