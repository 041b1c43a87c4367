//! Subscription worker.
//!
//! A worker keeps one subscription connection open, hands each batch the
//! server sends to the registered [`BatchHandler`]s and acknowledges it
//! before the next batch is delivered. Transient failures are absorbed by
//! reconnecting; fatal ones end the worker.

mod batch;
mod driver;
pub(crate) mod handler;
mod logger;
mod negotiator;
mod receiver;
mod state;
mod status;
mod transport;
mod worker;

pub use batch::{BatchItem, CounterIncludes, SubscriptionBatch};
pub use handler::{handler_fn, BatchHandler, BatchOutcome, FnBatchHandler};
pub use logger::{WorkerLogger, DEFAULT_WORKER_LOG_TARGET};
pub use state::ConnectionState;
pub use transport::{Frame, FrameReader, FrameWriter, MAX_FRAME_BYTES};
pub use worker::{SubscriptionWorker, WorkerCompletion};

pub(crate) use worker::WorkerShared;
