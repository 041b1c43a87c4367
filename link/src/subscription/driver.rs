//! Ack driver: runs the handlers for each batch and acknowledges it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{RavenLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::models::SubscriptionClientMessage;

use super::handler::{run_handlers, BatchHandler, BatchOutcome};
use super::logger::WorkerLogger;
use super::receiver::{receive_batches, BatchEnvelope, ReceiverContext};
use super::state::ConnectionState;
use super::transport::{FrameReader, FrameWriter};

/// Snapshot of the registered handlers, taken per batch.
pub(crate) type HandlerSource = Arc<dyn Fn() -> Arc<Vec<Arc<dyn BatchHandler>>> + Send + Sync>;

pub(crate) struct DriverContext {
    pub(crate) handlers: HandlerSource,
    pub(crate) ignore_subscriber_errors: bool,
    pub(crate) send_timeout: Duration,
    pub(crate) events: EventHandlers,
    pub(crate) logger: WorkerLogger,
    pub(crate) state_tx: Arc<watch::Sender<ConnectionState>>,
}

/// How one connection ended.
#[derive(Debug)]
pub(crate) struct ConnectionOutcome {
    /// `None` when the worker was disposed.
    pub(crate) error: Option<RavenLinkError>,
    /// Batches acknowledged and confirmed by the server.
    pub(crate) confirmed_batches: u64,
}

/// Resolves once the worker is disposed or its disposal signal is gone.
pub(crate) async fn disposed(dispose_rx: &mut watch::Receiver<bool>) {
    loop {
        if *dispose_rx.borrow_and_update() {
            return;
        }
        if dispose_rx.changed().await.is_err() {
            return;
        }
    }
}

enum Step {
    Acked,
    Disposed,
}

/// Drive one accepted connection until it fails or the worker is disposed.
pub(crate) async fn drive_connection<R, W>(
    reader: FrameReader<R>,
    mut writer: FrameWriter<W>,
    receiver_ctx: ReceiverContext,
    ctx: &DriverContext,
    dispose_rx: &mut watch::Receiver<bool>,
) -> ConnectionOutcome
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send,
{
    let (batch_tx, mut batch_rx) = mpsc::channel::<BatchEnvelope>(1);
    let confirmed = receiver_ctx.confirmed_batches.clone();
    let mut receiver = tokio::spawn(receive_batches(reader, receiver_ctx, batch_tx));

    let error = loop {
        tokio::select! {
            biased;

            _ = disposed(dispose_rx) => break None,

            envelope = batch_rx.recv() => {
                let Some(envelope) = envelope else {
                    break Some(receiver_error(&mut receiver).await);
                };
                match process_batch(envelope, &mut writer, ctx, dispose_rx).await {
                    Ok(Step::Acked) => {},
                    Ok(Step::Disposed) => break None,
                    Err(e) => break Some(e),
                }
            },
        }
    };

    receiver.abort();
    if error.is_none() {
        let notice = SubscriptionClientMessage::DisposedNotification;
        if let Ok(text) = writer.write_frame(&notice, ctx.send_timeout).await {
            ctx.events.emit_send(&text);
        }
    }
    if let Err(e) = writer.shutdown().await {
        ctx.logger.debug(format_args!("closing stream: {}", e));
    }

    ConnectionOutcome {
        error,
        confirmed_batches: confirmed.load(Ordering::SeqCst),
    }
}

async fn process_batch<W>(
    envelope: BatchEnvelope,
    writer: &mut FrameWriter<W>,
    ctx: &DriverContext,
    dispose_rx: &mut watch::Receiver<bool>,
) -> Result<Step>
where
    W: AsyncWrite + Unpin,
{
    let BatchEnvelope { batch, ack_tx } = envelope;
    let batch_number = batch.batch_number();
    ctx.state_tx.send_replace(ConnectionState::Processing {
        batch_number,
        items: batch.number_of_items_in_batch(),
    });

    let handlers = (ctx.handlers)();
    let running = tokio::spawn(run_handlers(handlers, batch.clone()));
    let outcome = tokio::select! {
        biased;

        // the handler task keeps running detached; nothing is acked
        _ = disposed(dispose_rx) => return Ok(Step::Disposed),

        joined = running => joined.unwrap_or_else(|e| {
            BatchOutcome::Failed(format!("batch handler task failed: {}", e))
        }),
    };

    match outcome {
        BatchOutcome::Processed => {},
        BatchOutcome::Failed(reason) if ctx.ignore_subscriber_errors => {
            ctx.logger.warn(format_args!(
                "batch {} handler failed, acknowledging anyway: {}",
                batch_number, reason
            ));
        },
        BatchOutcome::Failed(reason) => {
            ctx.logger
                .warn(format_args!("batch {} handler failed: {}", batch_number, reason));
            return Err(RavenLinkError::SubscriberError(reason));
        },
        BatchOutcome::Stop(reason) => {
            ctx.logger.info(format_args!(
                "batch {} not acknowledged, handler stopped the worker: {}",
                batch_number, reason
            ));
            return Err(RavenLinkError::SubscriberError(reason));
        },
    }

    let ack = SubscriptionClientMessage::acknowledge(batch.last_change_vector());
    let text = writer.write_frame(&ack, ctx.send_timeout).await?;
    ctx.events.emit_send(&text);
    ctx.state_tx
        .send_replace(ConnectionState::AwaitingAck { batch_number });

    // the receiver may already have failed; its error surfaces through the channel
    let _ = ack_tx.send(());
    Ok(Step::Acked)
}

async fn receiver_error(receiver: &mut JoinHandle<Result<()>>) -> RavenLinkError {
    match receiver.await {
        Ok(Err(e)) => e,
        Ok(Ok(())) => RavenLinkError::ConnectionTransient("subscription stream ended".to_string()),
        Err(e) => RavenLinkError::ConnectionTransient(format!("receive task failed: {}", e)),
    }
}
