//! JSON frame transport over a raw byte stream.
//!
//! The server writes one JSON object per frame, back to back and optionally
//! separated by whitespace. [`FrameReader`] buffers the stream and yields
//! one parsed value at a time; [`FrameWriter`] writes one object per line.

use bytes::{Buf, BytesMut};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{RavenLinkError, Result};
use crate::timeouts::LinkTimeouts;

/// Upper bound for a single frame (one document plus envelope).
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 32 * 1024;

/// One parsed frame and its size on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub value: JsonValue,
    pub size: usize,
}

/// Reads concatenated JSON frames.
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
    max_frame_bytes: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            max_frame_bytes,
        }
    }

    /// Next frame, or `None` on a clean end of stream.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            self.skip_whitespace();
            if let Some(frame) = self.try_parse()? {
                return Ok(Some(frame));
            }
            if self.buffer.len() > self.max_frame_bytes {
                return Err(RavenLinkError::ConnectionTransient(format!(
                    "frame exceeds {} bytes",
                    self.max_frame_bytes
                )));
            }

            self.buffer.reserve(READ_CHUNK);
            let n = self.inner.read_buf(&mut self.buffer).await?;
            if n == 0 {
                self.skip_whitespace();
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(RavenLinkError::ConnectionTransient(
                    "stream ended in the middle of a frame".to_string(),
                ));
            }
        }
    }

    fn skip_whitespace(&mut self) {
        let leading = self
            .buffer
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buffer.advance(leading);
    }

    fn try_parse(&mut self) -> Result<Option<Frame>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let parsed = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<JsonValue>();
            let next = stream.next();
            match next {
                Some(Ok(value)) => Ok(Some((value, stream.byte_offset()))),
                Some(Err(e)) if e.is_eof() => Ok(None),
                Some(Err(e)) => Err(RavenLinkError::ConnectionTransient(format!(
                    "malformed frame: {}",
                    e
                ))),
                None => Ok(None),
            }
        };

        match parsed? {
            Some((_, size)) if size > self.max_frame_bytes => Err(RavenLinkError::ConnectionTransient(
                format!("frame of {} bytes exceeds {} bytes", size, self.max_frame_bytes),
            )),
            Some((value, size)) => {
                self.buffer.advance(size);
                Ok(Some(Frame { value, size }))
            },
            None => Ok(None),
        }
    }
}

/// Writes JSON frames, one per line.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Serialize and write `message`, returning the text that was sent.
    pub async fn write_frame<T: Serialize>(&mut self, message: &T, send_timeout: Duration) -> Result<String> {
        let text = serde_json::to_string(message)?;
        let mut payload = Vec::with_capacity(text.len() + 1);
        payload.extend_from_slice(text.as_bytes());
        payload.push(b'\n');

        let write = async {
            self.inner.write_all(&payload).await?;
            self.inner.flush().await?;
            Ok::<(), std::io::Error>(())
        };
        if LinkTimeouts::is_no_timeout(send_timeout) {
            write.await?;
        } else {
            tokio::time::timeout(send_timeout, write)
                .await
                .map_err(|_| {
                    RavenLinkError::ConnectionTransient(format!(
                        "frame write timed out after {:?}",
                        send_timeout
                    ))
                })??;
        }
        Ok(text)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
