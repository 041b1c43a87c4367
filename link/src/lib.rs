//! # raven-link
//!
//! Client library for a document database's subscription protocol.
//!
//! - [`DocumentSubscriptions`]: create, inspect, drop and delete named
//!   subscriptions through the registry API
//! - [`SubscriptionWorker`]: a reconnecting worker that streams batches of
//!   documents to [`BatchHandler`]s and acknowledges each batch before the
//!   next one is sent
//! - [`DeferredCommands`]: the session-side ledger of commands flushed as
//!   one unit of work with [`RavenLinkClient::save_changes`]
//!
//! # Example
//!
//! ```rust,no_run
//! use raven_link::{
//!     handler_fn, EventHandlers, RavenLinkClient, RavenLinkError, SubscriptionBatch,
//!     SubscriptionWorkerOptions,
//! };
//! use serde::Deserialize;
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct Order {
//!     #[serde(rename = "Company")]
//!     company: String,
//! }
//!
//! # async fn example() -> raven_link::Result<()> {
//! let client = RavenLinkClient::builder()
//!     .url("http://localhost:8080")
//!     .database("Northwind")
//!     .event_handlers(
//!         EventHandlers::new().on_error(|err: &RavenLinkError| eprintln!("worker stopped: {}", err)),
//!     )
//!     .build()?;
//!
//! let name = client.subscriptions().create_for_collection("Orders").await?;
//! let worker = client
//!     .subscriptions()
//!     .get_subscription_worker(SubscriptionWorkerOptions::new(name))?;
//!
//! worker
//!     .run(handler_fn(|batch: Arc<SubscriptionBatch>| async move {
//!         for item in batch.items() {
//!             let order: Order = item.result().map_err(|e| e.to_string())?;
//!             println!("{} ordered by {}", item.id(), order.company);
//!         }
//!         Ok::<(), String>(())
//!     }))
//!     .wait()
//!     .await
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod error;
pub mod event_handlers;
pub mod executor;
pub mod models;
pub mod session;
pub mod subscription;
pub mod subscriptions;
pub mod timeouts;

pub use client::{RavenLinkClient, RavenLinkClientBuilder};
pub use error::{ErrorKind, RavenLinkError, Result};
pub use event_handlers::{DisconnectReason, ErrorListener, EventHandlers};
pub use executor::{HttpRequestExecutor, RequestExecutor};
pub use models::{
    Revision, ServerNode, SubscriptionCreationOptions, SubscriptionOpeningStrategy,
    SubscriptionState, SubscriptionWorkerOptions,
};
pub use session::{CommandData, CommandType, DeferredCommands, IdTypeAndName, PatchRequest, SaveChangesData};
pub use subscription::{
    handler_fn, BatchHandler, BatchItem, BatchOutcome, ConnectionState, SubscriptionBatch,
    SubscriptionWorker, WorkerCompletion, WorkerLogger,
};
pub use subscriptions::{DocumentSubscriptions, SubscriptionWorkerBuilder};
pub use timeouts::{LinkTimeouts, LinkTimeoutsBuilder};
