//! Read loop of an accepted subscription connection.
//!
//! Frames are grouped into batches until `EndOfBatch`. The finished batch is
//! handed to the driver and the loop stops reading until the driver has
//! sent the ack, then waits for the server's `Confirm`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{RavenLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::models::SubscriptionServerMessage;
use crate::timeouts::LinkTimeouts;

use super::batch::{BatchBuilder, CounterIncludes, SubscriptionBatch};
use super::logger::WorkerLogger;
use super::negotiator::emit_received;
use super::state::ConnectionState;
use super::status::{connection_status_error, error_from_exception};
use super::transport::FrameReader;

/// A finished batch and the channel the driver resolves once it is acked.
///
/// Dropping `ack_tx` without sending tells the receiver the batch will not
/// be acknowledged.
pub(crate) struct BatchEnvelope {
    pub(crate) batch: Arc<SubscriptionBatch>,
    pub(crate) ack_tx: oneshot::Sender<()>,
}

pub(crate) struct ReceiverContext {
    pub(crate) subscription: String,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) ack_confirmation_timeout: Duration,
    pub(crate) events: EventHandlers,
    pub(crate) logger: WorkerLogger,
    pub(crate) state_tx: Arc<watch::Sender<ConnectionState>>,
    /// Batches whose ack the server confirmed on this connection
    pub(crate) confirmed_batches: Arc<AtomicU64>,
}

/// Read batches until the connection fails or the driver goes away.
///
/// Returns `Ok(())` only when the driver stopped listening.
pub(crate) async fn receive_batches<R>(
    mut reader: FrameReader<R>,
    ctx: ReceiverContext,
    batch_tx: mpsc::Sender<BatchEnvelope>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut builder = BatchBuilder::default();
    let mut batch_number: u64 = 0;

    loop {
        let (message, size) = next_message(&mut reader, &ctx, ctx.idle_timeout).await?;
        match message {
            SubscriptionServerMessage::Data { data, exception } => {
                if let Some(ex) = &exception {
                    ctx.logger
                        .warn(format_args!("server reported an item error: {}", ex));
                }
                builder.push_item(data, exception, size);
            },
            SubscriptionServerMessage::Includes { includes } => {
                builder.add_includes(includes, size);
            },
            SubscriptionServerMessage::CounterIncludes {
                counter_includes,
                included_counter_names,
            } => {
                builder.add_counter_includes(
                    CounterIncludes {
                        counter_includes,
                        included_counter_names,
                    },
                    size,
                );
            },
            SubscriptionServerMessage::EndOfBatch => {
                batch_number += 1;
                let batch = Arc::new(builder.finish(batch_number));
                ctx.logger.debug(format_args!(
                    "batch {} complete with {} items ({} bytes)",
                    batch_number,
                    batch.number_of_items_in_batch(),
                    batch.size_in_bytes()
                ));

                let (ack_tx, ack_rx) = oneshot::channel();
                let envelope = BatchEnvelope {
                    batch: batch.clone(),
                    ack_tx,
                };
                if batch_tx.send(envelope).await.is_err() {
                    return Ok(());
                }
                if ack_rx.await.is_err() {
                    // not acknowledged; the driver decides what happens next
                    return Ok(());
                }

                await_confirm(&mut reader, &ctx).await?;
                ctx.confirmed_batches.fetch_add(1, Ordering::SeqCst);
                ctx.events.emit_after_acknowledgment(&batch);
                ctx.state_tx.send_replace(ConnectionState::Connected);
            },
            SubscriptionServerMessage::Confirm => {
                ctx.logger
                    .warn(format_args!("ignoring Confirm without a pending ack"));
            },
            SubscriptionServerMessage::Heartbeat => {},
            SubscriptionServerMessage::Error { exception, message } => {
                return Err(error_from_exception(exception.as_deref(), message.as_deref()));
            },
            SubscriptionServerMessage::ConnectionStatus {
                status,
                message,
                exception,
                data,
                ..
            } => {
                if let Some(err) = connection_status_error(
                    &ctx.subscription,
                    status,
                    message.as_deref(),
                    exception.as_deref(),
                    data.as_ref(),
                ) {
                    return Err(err);
                }
            },
            SubscriptionServerMessage::Unknown => {
                ctx.logger.debug(format_args!("ignoring unknown frame type"));
            },
        }
    }
}

/// Wait for the server to confirm the ack just sent.
async fn await_confirm<R>(reader: &mut FrameReader<R>, ctx: &ReceiverContext) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let limit = if LinkTimeouts::is_no_timeout(ctx.ack_confirmation_timeout) {
        None
    } else {
        Some(ctx.ack_confirmation_timeout)
    };
    let confirm = async {
        loop {
            let (message, _) = next_message(reader, ctx, None).await?;
            match message {
                SubscriptionServerMessage::Confirm => return Ok::<(), RavenLinkError>(()),
                SubscriptionServerMessage::Heartbeat | SubscriptionServerMessage::Unknown => {},
                SubscriptionServerMessage::Error { exception, message } => {
                    return Err(error_from_exception(exception.as_deref(), message.as_deref()));
                },
                SubscriptionServerMessage::ConnectionStatus {
                    status,
                    message,
                    exception,
                    data,
                    ..
                } => {
                    if let Some(err) = connection_status_error(
                        &ctx.subscription,
                        status,
                        message.as_deref(),
                        exception.as_deref(),
                        data.as_ref(),
                    ) {
                        return Err(err);
                    }
                },
                other => {
                    return Err(RavenLinkError::ConnectionTransient(format!(
                        "received {} before the ack was confirmed",
                        other.type_name()
                    )));
                },
            }
        }
    };

    match limit {
        None => confirm.await,
        Some(limit) => tokio::time::timeout(limit, confirm).await.map_err(|_| {
            RavenLinkError::ConnectionTransient(format!("ack was not confirmed within {:?}", limit))
        })?,
    }
}

/// Read and parse one frame, failing on silence longer than `idle`.
async fn next_message<R>(
    reader: &mut FrameReader<R>,
    ctx: &ReceiverContext,
    idle: Option<Duration>,
) -> Result<(SubscriptionServerMessage, usize)>
where
    R: AsyncRead + Unpin,
{
    let frame = match idle {
        Some(idle) => tokio::time::timeout(idle, reader.read_frame())
            .await
            .map_err(|_| {
                RavenLinkError::ConnectionTransient(format!("no frame received for {:?}", idle))
            })??,
        None => reader.read_frame().await?,
    };
    let Some(frame) = frame else {
        return Err(RavenLinkError::ConnectionTransient(
            "server closed the subscription stream".to_string(),
        ));
    };

    emit_received(&ctx.events, &frame);
    let size = frame.size;
    let message = serde_json::from_value(frame.value)
        .map_err(|e| RavenLinkError::ConnectionTransient(format!("malformed frame: {}", e)))?;
    Ok((message, size))
}
