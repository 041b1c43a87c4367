//! Subscription worker handle and its reconnecting lifecycle.
//!
//! The lifecycle task negotiates a connection, drives it until it fails and
//! then decides, from the error's classification, whether to back off and
//! reconnect or to stop. Fatal errors reach the error listener exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::sync::watch;

use crate::error::{RavenLinkError, Result};
use crate::event_handlers::{DisconnectReason, EventHandlers};
use crate::executor::RequestExecutor;
use crate::models::SubscriptionWorkerOptions;
use crate::timeouts::LinkTimeouts;

use super::driver::{disposed, drive_connection, DriverContext};
use super::handler::BatchHandler;
use super::logger::WorkerLogger;
use super::negotiator::{idle_timeout, Negotiator};
use super::receiver::ReceiverContext;
use super::state::ConnectionState;

type HandlerList = Vec<Arc<dyn BatchHandler>>;

/// Long-lived client of one subscription.
///
/// Created through [`DocumentSubscriptions::get_subscription_worker`](crate::DocumentSubscriptions::get_subscription_worker).
/// Dropping the handle disposes the worker.
///
/// # Example
///
/// ```rust,no_run
/// use raven_link::{handler_fn, RavenLinkClient, SubscriptionBatch, SubscriptionWorkerOptions};
/// use std::sync::Arc;
///
/// # async fn example() -> raven_link::Result<()> {
/// let client = RavenLinkClient::builder()
///     .url("http://localhost:8080")
///     .database("Northwind")
///     .build()?;
///
/// let worker = client
///     .subscriptions()
///     .get_subscription_worker(SubscriptionWorkerOptions::new("orders"))?;
///
/// let completion = worker.run(handler_fn(|batch: Arc<SubscriptionBatch>| async move {
///     println!("got {} orders", batch.number_of_items_in_batch());
/// }));
/// completion.wait().await
/// # }
/// ```
pub struct SubscriptionWorker {
    shared: Arc<WorkerShared>,
}

pub(crate) struct WorkerShared {
    options: SubscriptionWorkerOptions,
    database: String,
    executor: Arc<dyn RequestExecutor>,
    timeouts: LinkTimeouts,
    events: EventHandlers,
    logger: WorkerLogger,
    worker_id: String,
    handlers: Arc<Mutex<HandlerList>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    dispose_tx: watch::Sender<bool>,
    started: AtomicBool,
    current_node: RwLock<Option<String>>,
}

/// Awaitable completion of a worker run.
#[derive(Debug, Clone)]
pub struct WorkerCompletion {
    state_rx: watch::Receiver<ConnectionState>,
}

impl WorkerCompletion {
    /// Wait for the worker to stop.
    ///
    /// `Ok(())` for a disposed or normally closed worker, the terminal
    /// error for a faulted one.
    pub async fn wait(mut self) -> Result<()> {
        let terminal = match self.state_rx.wait_for(ConnectionState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => return Ok(()),
        };
        match terminal {
            ConnectionState::Faulted(e) => Err(e),
            _ => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state_rx.borrow().is_terminal()
    }
}

impl SubscriptionWorker {
    pub(crate) fn new(
        options: SubscriptionWorkerOptions,
        database: String,
        executor: Arc<dyn RequestExecutor>,
        timeouts: LinkTimeouts,
        events: EventHandlers,
        logger: Option<WorkerLogger>,
    ) -> Result<Self> {
        options.validate()?;
        let executor = options.request_executor.clone().unwrap_or(executor);
        let worker_id = options
            .worker_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let logger =
            logger.unwrap_or_else(|| WorkerLogger::for_subscription(options.subscription_name.clone()));

        Ok(Self {
            shared: Arc::new(WorkerShared {
                options,
                database,
                executor,
                timeouts,
                events: events.with_logger(logger.clone()),
                logger,
                worker_id,
                handlers: Arc::new(Mutex::new(Vec::new())),
                state_tx: Arc::new(watch::channel(ConnectionState::Uninitialized).0),
                dispose_tx: watch::channel(false).0,
                started: AtomicBool::new(false),
                current_node: RwLock::new(None),
            }),
        })
    }

    pub(crate) fn shared(&self) -> &Arc<WorkerShared> {
        &self.shared
    }

    /// Register a batch handler. Handlers run in registration order.
    pub fn add_handler(&self, handler: impl BatchHandler) -> &Self {
        self.shared.push_handler(Arc::new(handler));
        self
    }

    /// Register `handler` and start the worker.
    ///
    /// Calling `run` on a started or disposed worker only returns its
    /// completion handle.
    pub fn run(&self, handler: impl BatchHandler) -> WorkerCompletion {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            self.shared
                .logger
                .warn(format_args!("worker already started or disposed, ignoring run"));
            return self.completion();
        }
        self.shared.push_handler(Arc::new(handler));
        self.shared.logger.info(format_args!(
            "starting worker {} on database {}",
            self.shared.worker_id, self.shared.database
        ));
        tokio::spawn(run_lifecycle(self.shared.clone()));
        self.completion()
    }

    pub fn completion(&self) -> WorkerCompletion {
        WorkerCompletion {
            state_rx: self.shared.state_tx.subscribe(),
        }
    }

    /// Wait for the worker to stop, see [`WorkerCompletion::wait`].
    pub async fn wait(&self) -> Result<()> {
        self.completion().wait().await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Stop the worker. Idempotent and never fails.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        *self.shared.dispose_tx.borrow()
    }

    pub fn subscription_name(&self) -> &str {
        &self.shared.options.subscription_name
    }

    pub fn worker_id(&self) -> &str {
        &self.shared.worker_id
    }

    /// Tag of the node serving the current connection.
    pub fn current_node_tag(&self) -> Option<String> {
        self.shared
            .current_node
            .read()
            .map(|node| node.clone())
            .unwrap_or_default()
    }
}

impl Drop for SubscriptionWorker {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl std::fmt::Debug for SubscriptionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionWorker")
            .field("subscription", &self.shared.options.subscription_name)
            .field("worker_id", &self.shared.worker_id)
            .field("state", &*self.shared.state_tx.borrow())
            .finish()
    }
}

impl WorkerShared {
    pub(crate) fn dispose(&self) {
        if self.dispose_tx.send_replace(true) {
            return;
        }
        self.logger.info(format_args!("worker disposed"));
        if !self.started.swap(true, Ordering::SeqCst) {
            self.state_tx.send_replace(ConnectionState::Closed);
        }
    }

    fn push_handler(&self, handler: Arc<dyn BatchHandler>) {
        match self.handlers.lock() {
            Ok(mut handlers) => handlers.push(handler),
            Err(poisoned) => poisoned.into_inner().push(handler),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.logger.debug(format_args!("state -> {}", state));
        self.state_tx.send_replace(state);
    }

    fn set_current_node(&self, node: Option<String>) {
        match self.current_node.write() {
            Ok(mut current) => *current = node,
            Err(poisoned) => *poisoned.into_inner() = node,
        }
    }

    fn negotiator(&self) -> Negotiator<'_> {
        Negotiator {
            executor: self.executor.as_ref(),
            database: &self.database,
            options: &self.options,
            worker_id: &self.worker_id,
            timeouts: &self.timeouts,
            events: &self.events,
            logger: &self.logger,
        }
    }

    fn driver_context(&self) -> DriverContext {
        let handlers = self.handlers.clone();
        DriverContext {
            handlers: Arc::new(move || {
                let snapshot = match handlers.lock() {
                    Ok(list) => list.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                Arc::new(snapshot)
            }),
            ignore_subscriber_errors: self.options.ignore_subscriber_errors,
            send_timeout: self.timeouts.send_timeout,
            events: self.events.clone(),
            logger: self.logger.clone(),
            state_tx: self.state_tx.clone(),
        }
    }

    fn receiver_context(&self) -> ReceiverContext {
        ReceiverContext {
            subscription: self.options.subscription_name.clone(),
            idle_timeout: idle_timeout(&self.options, &self.timeouts),
            ack_confirmation_timeout: self.timeouts.ack_confirmation_timeout,
            events: self.events.clone(),
            logger: self.logger.clone(),
            state_tx: self.state_tx.clone(),
            confirmed_batches: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Supervising loop of a started worker.
async fn run_lifecycle(shared: Arc<WorkerShared>) {
    let mut dispose_rx = shared.dispose_tx.subscribe();
    let driver_ctx = shared.driver_context();
    let strategy = shared.options.strategy;

    let mut attempt: u32 = 0;
    let mut failing_since: Option<Instant> = None;
    let mut preferred_node: Option<String> = None;

    let result: Result<()> = loop {
        if *dispose_rx.borrow() {
            break Ok(());
        }
        shared.set_state(ConnectionState::Connecting);

        let negotiator = shared.negotiator();
        let negotiated = tokio::select! {
            biased;

            _ = disposed(&mut dispose_rx) => break Ok(()),
            result = negotiator.connect(preferred_node.as_deref()) => result,
        };

        let mut was_connected = false;
        let error = match negotiated {
            Ok(conn) => {
                was_connected = true;
                shared.logger.info(format_args!(
                    "connected to node {} (protocol {}, connection {})",
                    conn.node_tag.as_deref().unwrap_or("?"),
                    conn.version,
                    conn.client_connection_id
                ));
                shared.set_current_node(conn.node_tag.clone());
                preferred_node = conn.node_tag.clone();
                shared.set_state(ConnectionState::Connected);
                shared.events.emit_connect(conn.node_tag.as_deref());
                attempt = 0;

                let outcome = drive_connection(
                    conn.reader,
                    conn.writer,
                    shared.receiver_context(),
                    &driver_ctx,
                    &mut dispose_rx,
                )
                .await;
                shared.set_current_node(None);
                if outcome.confirmed_batches > 0 {
                    failing_since = None;
                }
                match outcome.error {
                    Some(e) => e,
                    None => {
                        shared
                            .events
                            .emit_disconnect(DisconnectReason::new("worker disposed", false));
                        break Ok(());
                    },
                }
            },
            Err(e) => e,
        };

        if *dispose_rx.borrow() {
            break Ok(());
        }

        if matches!(error, RavenLinkError::SubscriptionClosed(_)) && shared.options.close_when_no_docs_left {
            shared
                .logger
                .info(format_args!("no documents left, closing: {}", error));
            if was_connected {
                shared
                    .events
                    .emit_disconnect(DisconnectReason::new(error.to_string(), false));
            }
            break Ok(());
        }

        if !error.is_retryable(strategy) {
            if was_connected {
                shared
                    .events
                    .emit_disconnect(DisconnectReason::new(error.to_string(), false));
            }
            break Err(error);
        }

        let since = *failing_since.get_or_insert_with(Instant::now);
        let period = shared.options.max_erroneous_period();
        if since.elapsed() > period {
            break Err(RavenLinkError::ConnectionTransient(format!(
                "subscription kept failing for more than {:?}, last error: {}",
                period, error
            )));
        }

        if let Some(tag) = error.redirect_node_tag() {
            preferred_node = Some(tag.to_string());
        }
        let delay = shared.options.retry_delay(attempt);
        attempt = attempt.saturating_add(1);
        shared.logger.warn(format_args!(
            "connection attempt failed, retry {} in {:?}: {}",
            attempt, delay, error
        ));
        if was_connected {
            shared
                .events
                .emit_disconnect(DisconnectReason::new(error.to_string(), true));
        }
        shared.set_state(ConnectionState::Reconnecting { attempt });
        shared.events.emit_connection_retry(&error);

        tokio::select! {
            biased;

            _ = disposed(&mut dispose_rx) => break Ok(()),
            _ = tokio::time::sleep(delay) => {},
        }
    };

    match result {
        Ok(()) => {
            shared.logger.info(format_args!("worker closed"));
            shared.events.emit_end();
            shared.set_state(ConnectionState::Closed);
        },
        Err(error) => {
            shared.logger.error(format_args!("worker failed: {}", error));
            shared.events.emit_error(&error);
            shared.events.emit_end();
            shared.set_state(ConnectionState::Faulted(error));
        },
    }
}
