use async_trait::async_trait;
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::batch::SubscriptionBatch;

/// Completion signal of a batch handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch was processed
    Processed,
    /// The handler failed; acknowledged anyway when subscriber errors are ignored
    Failed(String),
    /// Do not acknowledge and stop the worker, regardless of the ignore flag
    Stop(String),
}

impl From<()> for BatchOutcome {
    fn from(_: ()) -> Self {
        BatchOutcome::Processed
    }
}

impl<E: fmt::Display> From<std::result::Result<(), E>> for BatchOutcome {
    fn from(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => BatchOutcome::Processed,
            Err(e) => BatchOutcome::Failed(e.to_string()),
        }
    }
}

/// Processes the batches of a subscription worker.
#[async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    async fn handle_batch(&self, batch: Arc<SubscriptionBatch>) -> BatchOutcome;
}

/// Handler built from an async closure, see [`handler_fn`].
pub struct FnBatchHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`BatchHandler`].
///
/// The closure may return anything convertible into [`BatchOutcome`]:
/// `()`, `Result<(), E: Display>` or a `BatchOutcome` itself.
///
/// ```rust
/// use raven_link::{handler_fn, SubscriptionBatch};
/// use std::sync::Arc;
///
/// let handler = handler_fn(|batch: Arc<SubscriptionBatch>| async move {
///     for item in batch.items() {
///         println!("{}", item.id());
///     }
///     Ok::<(), std::io::Error>(())
/// });
/// ```
pub fn handler_fn<F>(f: F) -> FnBatchHandler<F> {
    FnBatchHandler { f }
}

#[async_trait]
impl<F, Fut, R> BatchHandler for FnBatchHandler<F>
where
    F: Fn(Arc<SubscriptionBatch>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: Into<BatchOutcome>,
{
    async fn handle_batch(&self, batch: Arc<SubscriptionBatch>) -> BatchOutcome {
        (self.f)(batch).await.into()
    }
}

/// Invoke every handler in registration order and wait for all of them.
///
/// A panic counts as a failure. The first `Stop` outranks any failure,
/// otherwise the first failure is returned. Whether the batch is
/// acknowledged is up to the caller.
pub(crate) async fn run_handlers(
    handlers: Arc<Vec<Arc<dyn BatchHandler>>>,
    batch: Arc<SubscriptionBatch>,
) -> BatchOutcome {
    let mut first_stop = None;
    let mut first_failure = None;
    for handler in handlers.iter() {
        let outcome = AssertUnwindSafe(handler.handle_batch(batch.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                BatchOutcome::Failed(format!("batch handler panicked: {}", panic_message(panic.as_ref())))
            });

        match outcome {
            BatchOutcome::Processed => {},
            BatchOutcome::Stop(reason) => {
                first_stop.get_or_insert(reason);
            },
            BatchOutcome::Failed(reason) => {
                first_failure.get_or_insert(reason);
            },
        }
    }
    match (first_stop, first_failure) {
        (Some(reason), _) => BatchOutcome::Stop(reason),
        (None, Some(reason)) => BatchOutcome::Failed(reason),
        (None, None) => BatchOutcome::Processed,
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
