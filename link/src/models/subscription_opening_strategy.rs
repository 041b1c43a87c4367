use serde::{Deserialize, Serialize};
use std::fmt;

/// Exclusivity policy a worker requests when it connects.
///
/// The policy is enforced by the server. The client only transmits it and
/// interprets the resulting `SubscriptionInUse` answer: fatal for every
/// strategy except [`WaitForFree`](Self::WaitForFree), where the worker
/// keeps retrying until the subscription frees up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SubscriptionOpeningStrategy {
    /// Connect only if no other worker holds the subscription
    #[default]
    OpenIfFree,
    /// Evict the current holder
    TakeOver,
    /// Retry until the current holder disconnects
    WaitForFree,
    /// Share the subscription with other concurrent workers
    Concurrent,
}

impl fmt::Display for SubscriptionOpeningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OpenIfFree => "OpenIfFree",
            Self::TakeOver => "TakeOver",
            Self::WaitForFree => "WaitForFree",
            Self::Concurrent => "Concurrent",
        };
        f.write_str(name)
    }
}
