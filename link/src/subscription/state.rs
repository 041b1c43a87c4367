use std::fmt;

use crate::error::RavenLinkError;

/// Observable state of a subscription worker.
///
/// `Closed` ends a disposed or normally finished worker, `Faulted` ends a
/// worker that hit a fatal error. `Reconnecting` may be entered from any
/// non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Connected,
    Processing { batch_number: u64, items: usize },
    AwaitingAck { batch_number: u64 },
    Reconnecting { attempt: u32 },
    Closed,
    Faulted(RavenLinkError),
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Faulted(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Processing { .. } => "Processing",
            Self::AwaitingAck { .. } => "AwaitingAck",
            Self::Reconnecting { .. } => "Reconnecting",
            Self::Closed => "Closed",
            Self::Faulted(_) => "Faulted",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing {
                batch_number,
                items,
            } => write!(f, "Processing(batch {}, {} items)", batch_number, items),
            Self::AwaitingAck { batch_number } => write!(f, "AwaitingAck(batch {})", batch_number),
            Self::Reconnecting { attempt } => write!(f, "Reconnecting(attempt {})", attempt),
            Self::Faulted(e) => write!(f, "Faulted({})", e),
            other => f.write_str(other.name()),
        }
    }
}
