//! Timeout configuration for raven-link client operations.
//!
//! Centralizes the deadlines used by the subscription worker (TCP connect,
//! frame writes, heartbeat silence, ack confirmation) and by the HTTP
//! request executor.

use std::time::Duration;

/// Timeout configuration for raven-link client operations.
///
/// # Examples
///
/// ```rust
/// use raven_link::LinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = LinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = LinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(90))
///     .heartbeat_grace(Duration::from_secs(30))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = LinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTimeouts {
    /// Timeout for opening the TCP connection and completing the
    /// header/options handshake.
    /// Default: 60 seconds
    pub connection_timeout: Duration,

    /// Timeout for writing a single frame to the server.
    /// Default: 15 seconds
    pub send_timeout: Duration,

    /// Margin added to the worker's heartbeat interval before silence on
    /// the stream is treated as a dead connection.
    /// Default: 15 seconds
    pub heartbeat_grace: Duration,

    /// Maximum wait for the server's `Confirm` after sending an ack.
    /// Default: 60 seconds
    pub ack_confirmation_timeout: Duration,

    /// Timeout for a single HTTP request against the registry API.
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(60),
            send_timeout: Duration::from_secs(15),
            heartbeat_grace: Duration::from_secs(15),
            ack_confirmation_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl LinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Create timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(2),
            heartbeat_grace: Duration::from_secs(3),
            ack_confirmation_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Create timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(120),
            send_timeout: Duration::from_secs(60),
            heartbeat_grace: Duration::from_secs(60),
            ack_confirmation_timeout: Duration::from_secs(180),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }
}

/// Builder for creating custom [`LinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LinkTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP connect plus handshake).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the frame write timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    /// Set the heartbeat grace margin.
    /// Set to 0 to rely on the heartbeat interval alone.
    pub fn heartbeat_grace(mut self, grace: Duration) -> Self {
        self.timeouts.heartbeat_grace = grace;
        self
    }

    /// Set the ack confirmation timeout.
    pub fn ack_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.ack_confirmation_timeout = timeout;
        self
    }

    /// Set the HTTP request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the HTTP request timeout in seconds.
    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}
