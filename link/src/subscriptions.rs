//! Subscription administration and worker creation.

use std::sync::{Arc, Mutex, Weak};

use crate::commands::{
    CreateSubscriptionCommand, DeleteSubscriptionCommand, DropSubscriptionConnectionCommand,
    GetSubscriptionStateCommand, GetSubscriptionsCommand,
};
use crate::error::Result;
use crate::event_handlers::EventHandlers;
use crate::executor::{execute, RequestExecutor};
use crate::models::{SubscriptionCreationOptions, SubscriptionState, SubscriptionWorkerOptions};
use crate::subscription::{SubscriptionWorker, WorkerLogger, WorkerShared};
use crate::timeouts::LinkTimeouts;

/// Entry point for managing subscriptions of a database.
///
/// Obtained from [`RavenLinkClient::subscriptions`](crate::RavenLinkClient::subscriptions).
/// Clones share the same worker registry.
#[derive(Clone)]
pub struct DocumentSubscriptions {
    executor: Arc<dyn RequestExecutor>,
    database: String,
    timeouts: LinkTimeouts,
    event_handlers: EventHandlers,
    workers: Arc<Mutex<Vec<Weak<WorkerShared>>>>,
}

impl DocumentSubscriptions {
    pub(crate) fn new(
        executor: Arc<dyn RequestExecutor>,
        database: String,
        timeouts: LinkTimeouts,
        event_handlers: EventHandlers,
    ) -> Self {
        Self {
            executor,
            database,
            timeouts,
            event_handlers,
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Default database of these subscriptions.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Create a subscription and return its name.
    pub async fn create(&self, options: SubscriptionCreationOptions) -> Result<String> {
        self.create_in(options, &self.database).await
    }

    pub async fn create_in(&self, options: SubscriptionCreationOptions, database: &str) -> Result<String> {
        let command = CreateSubscriptionCommand::new(options)?;
        let result = execute(self.executor.as_ref(), database, &command).await?;
        log::info!(
            "[raven-link] Created subscription '{}' on database {}",
            result.name,
            database
        );
        Ok(result.name)
    }

    /// Subscribe to every document of `collection`.
    pub async fn create_for_collection(&self, collection: &str) -> Result<String> {
        self.create(SubscriptionCreationOptions::for_collection(collection))
            .await
    }

    /// Subscribe to revisions of the documents of `collection`.
    pub async fn create_for_revisions(&self, collection: &str) -> Result<String> {
        self.create(SubscriptionCreationOptions::for_revisions(collection))
            .await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.delete_in(name, &self.database).await
    }

    pub async fn delete_in(&self, name: &str, database: &str) -> Result<()> {
        execute(self.executor.as_ref(), database, &DeleteSubscriptionCommand::new(name)?).await?;
        log::info!("[raven-link] Deleted subscription '{}'", name);
        Ok(())
    }

    /// One page of subscription states, starting at `start`.
    pub async fn get_subscriptions(&self, start: usize, take: usize) -> Result<Vec<SubscriptionState>> {
        self.get_subscriptions_in(start, take, &self.database).await
    }

    pub async fn get_subscriptions_in(
        &self,
        start: usize,
        take: usize,
        database: &str,
    ) -> Result<Vec<SubscriptionState>> {
        execute(
            self.executor.as_ref(),
            database,
            &GetSubscriptionsCommand::new(start, take),
        )
        .await
    }

    /// Server-side state of one subscription.
    ///
    /// Fails with `SubscriptionDoesNotExist` when no subscription has that name.
    pub async fn get_subscription_state(&self, name: &str) -> Result<SubscriptionState> {
        self.get_subscription_state_in(name, &self.database).await
    }

    pub async fn get_subscription_state_in(&self, name: &str, database: &str) -> Result<SubscriptionState> {
        execute(
            self.executor.as_ref(),
            database,
            &GetSubscriptionStateCommand::new(name)?,
        )
        .await
    }

    /// Force the server to close the connections of a subscription.
    ///
    /// Connected workers receive `SubscriptionClosed` and stop.
    pub async fn drop_connection(&self, name: &str) -> Result<()> {
        self.drop_connection_in(name, &self.database).await
    }

    pub async fn drop_connection_in(&self, name: &str, database: &str) -> Result<()> {
        execute(
            self.executor.as_ref(),
            database,
            &DropSubscriptionConnectionCommand::new(name)?,
        )
        .await?;
        log::info!("[raven-link] Dropped connections of subscription '{}'", name);
        Ok(())
    }

    /// Close only the connection of the worker with `worker_id`.
    pub async fn drop_worker_connection(&self, name: &str, worker_id: &str) -> Result<()> {
        let command = DropSubscriptionConnectionCommand::new(name)?.for_worker(worker_id);
        execute(self.executor.as_ref(), &self.database, &command).await
    }

    /// Create a worker for an existing subscription. Call
    /// [`SubscriptionWorker::run`] to start it.
    pub fn get_subscription_worker(&self, options: SubscriptionWorkerOptions) -> Result<SubscriptionWorker> {
        self.worker_builder(options).build()
    }

    pub fn get_subscription_worker_in(
        &self,
        options: SubscriptionWorkerOptions,
        database: &str,
    ) -> Result<SubscriptionWorker> {
        self.worker_builder(options).database(database).build()
    }

    /// Builder for a worker with its own database, listeners or logger.
    pub fn worker_builder(&self, options: SubscriptionWorkerOptions) -> SubscriptionWorkerBuilder<'_> {
        SubscriptionWorkerBuilder {
            subscriptions: self,
            options,
            database: None,
            event_handlers: None,
            logger: None,
        }
    }

    /// Number of created workers that are still alive.
    pub fn active_workers(&self) -> usize {
        self.live_workers().len()
    }

    /// Dispose every worker created through these subscriptions.
    pub fn dispose(&self) {
        let workers = self.live_workers();
        log::debug!("[raven-link] Disposing {} subscription workers", workers.len());
        for worker in workers {
            worker.dispose();
        }
    }

    fn register(&self, worker: &SubscriptionWorker) {
        let mut workers = match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        workers.retain(|w| w.strong_count() > 0);
        workers.push(Arc::downgrade(worker.shared()));
    }

    fn live_workers(&self) -> Vec<Arc<WorkerShared>> {
        let mut workers = match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        workers.retain(|w| w.strong_count() > 0);
        workers.iter().filter_map(Weak::upgrade).collect()
    }
}

impl std::fmt::Debug for DocumentSubscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSubscriptions")
            .field("database", &self.database)
            .field("active_workers", &self.active_workers())
            .finish()
    }
}

/// Configures one [`SubscriptionWorker`] before it is created.
pub struct SubscriptionWorkerBuilder<'a> {
    subscriptions: &'a DocumentSubscriptions,
    options: SubscriptionWorkerOptions,
    database: Option<String>,
    event_handlers: Option<EventHandlers>,
    logger: Option<WorkerLogger>,
}

impl SubscriptionWorkerBuilder<'_> {
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Listeners of this worker, replacing the client-wide handlers.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = Some(handlers);
        self
    }

    pub fn logger(mut self, logger: WorkerLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<SubscriptionWorker> {
        let subscriptions = self.subscriptions;
        let worker = SubscriptionWorker::new(
            self.options,
            self.database
                .unwrap_or_else(|| subscriptions.database.clone()),
            subscriptions.executor.clone(),
            subscriptions.timeouts.clone(),
            self.event_handlers
                .unwrap_or_else(|| subscriptions.event_handlers.clone()),
            self.logger,
        )?;
        subscriptions.register(&worker);
        Ok(worker)
    }
}
