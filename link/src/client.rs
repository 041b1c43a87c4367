//! Main raven-link client with builder pattern.
//!
//! Provides the entry point for subscription administration, subscription
//! workers and flushing deferred session commands.

use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::{
    commands::{BatchCommand, RavenCommand},
    error::{RavenLinkError, Result},
    event_handlers::EventHandlers,
    executor::{execute, HttpRequestExecutor, RequestExecutor},
    models::ServerNode,
    session::DeferredCommands,
    subscriptions::DocumentSubscriptions,
    timeouts::LinkTimeouts,
};

/// Main raven-link client.
///
/// Use [`RavenLinkClientBuilder`] to construct instances with custom configuration.
///
/// # Examples
///
/// ```rust,no_run
/// use raven_link::RavenLinkClient;
///
/// # async fn example() -> raven_link::Result<()> {
/// let client = RavenLinkClient::builder()
///     .url("http://localhost:8080")
///     .database("Northwind")
///     .build()?;
///
/// let name = client.subscriptions().create_for_collection("Orders").await?;
/// println!("created {}", name);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RavenLinkClient {
    database: String,
    executor: Arc<dyn RequestExecutor>,
    timeouts: LinkTimeouts,
    subscriptions: DocumentSubscriptions,
}

impl RavenLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> RavenLinkClientBuilder {
        RavenLinkClientBuilder::new()
    }

    /// Default database of the client
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Get the configured timeouts
    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.timeouts
    }

    pub fn request_executor(&self) -> &Arc<dyn RequestExecutor> {
        &self.executor
    }

    /// Subscription administration and workers
    pub fn subscriptions(&self) -> &DocumentSubscriptions {
        &self.subscriptions
    }

    /// Execute a command against the default database
    pub async fn execute<C>(&self, command: &C) -> Result<C::Output>
    where
        C: RavenCommand,
    {
        execute(self.executor.as_ref(), &self.database, command).await
    }

    /// Flush the deferred commands of `ledger` as one batch.
    ///
    /// On success the flushed commands leave the ledger and their success
    /// actions run; commands deferred meanwhile stay pending. On failure the
    /// ledger is left as it was and the error is returned. Nothing is retried.
    ///
    /// # Example
    /// ```rust,no_run
    /// use raven_link::{CommandData, DeferredCommands, RavenLinkClient};
    ///
    /// # async fn example(client: RavenLinkClient) -> raven_link::Result<()> {
    /// let mut ledger = DeferredCommands::new();
    /// ledger.defer(CommandData::delete("orders/1-A", None)?)?;
    /// client.save_changes(&mut ledger).await?;
    /// assert!(!ledger.has_changes());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn save_changes(&self, ledger: &mut DeferredCommands) -> Result<Vec<JsonValue>> {
        self.save_changes_in(ledger, &self.database).await
    }

    pub async fn save_changes_in(&self, ledger: &mut DeferredCommands, database: &str) -> Result<Vec<JsonValue>> {
        let data = ledger.flush();
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let command = BatchCommand::new(data.serialize_commands());
        log::debug!(
            "[raven-link] Saving {} deferred commands to {}",
            command.len(),
            database
        );
        match execute(self.executor.as_ref(), database, &command).await {
            Ok(results) => {
                let cleared = ledger.confirm_success(data);
                log::debug!("[raven-link] Saved {} commands", cleared);
                Ok(results)
            },
            Err(e) => {
                let failed = ledger.abort(data);
                log::warn!(
                    "[raven-link] Saving {} commands failed, ledger kept: {}",
                    failed.commands.len(),
                    e
                );
                Err(e)
            },
        }
    }

    /// Dispose every subscription worker created by this client.
    pub fn dispose(&self) {
        self.subscriptions.dispose();
    }
}

impl std::fmt::Debug for RavenLinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RavenLinkClient")
            .field("database", &self.database)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Builder for configuring [`RavenLinkClient`] instances.
pub struct RavenLinkClientBuilder {
    nodes: Vec<ServerNode>,
    database: Option<String>,
    timeouts: LinkTimeouts,
    max_retries: u32,
    request_executor: Option<Arc<dyn RequestExecutor>>,
    event_handlers: EventHandlers,
}

impl RavenLinkClientBuilder {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            database: None,
            timeouts: LinkTimeouts::default(),
            max_retries: 3,
            request_executor: None,
            event_handlers: EventHandlers::default(),
        }
    }

    /// Add a server url
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.nodes.push(ServerNode::new(url));
        self
    }

    /// Add several server urls, tried in order
    pub fn urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes.extend(urls.into_iter().map(ServerNode::new));
        self
    }

    /// Add a server with a known cluster tag
    pub fn node(mut self, node: ServerNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Set the default database
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set comprehensive timeout configuration for all operations
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use raven_link::{LinkTimeouts, RavenLinkClient};
    ///
    /// # fn example() -> raven_link::Result<()> {
    /// let client = RavenLinkClient::builder()
    ///     .url("http://localhost:8080")
    ///     .database("Northwind")
    ///     .timeouts(LinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set maximum number of retries for connect/timeout failures per node
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Replace the HTTP executor. Server urls become optional.
    pub fn request_executor(mut self, executor: Arc<dyn RequestExecutor>) -> Self {
        self.request_executor = Some(executor);
        self
    }

    /// Default listeners for workers created by this client
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<RavenLinkClient> {
        let database = self
            .database
            .filter(|db| !db.trim().is_empty())
            .ok_or_else(|| RavenLinkError::ConfigurationError("database is required".into()))?;

        let executor: Arc<dyn RequestExecutor> = match self.request_executor {
            Some(executor) => executor,
            None => Arc::new(
                HttpRequestExecutor::new(self.nodes, &self.timeouts)?.with_max_retries(self.max_retries),
            ),
        };

        let subscriptions = DocumentSubscriptions::new(
            executor.clone(),
            database.clone(),
            self.timeouts.clone(),
            self.event_handlers,
        );

        Ok(RavenLinkClient {
            database,
            executor,
            timeouts: self.timeouts,
            subscriptions,
        })
    }
}
