//! Connection negotiation for subscription workers.
//!
//! One negotiation resolves the node's TCP endpoint through the registry,
//! opens the socket, agrees on a protocol version with the header frame and
//! sends the worker options. It ends when the server reports `Accepted` for
//! the subscription; every other answer is mapped to a typed error.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::commands::GetTcpInfoCommand;
use crate::error::{RavenLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::executor::{execute, RequestExecutor};
use crate::models::{
    highest_supported_version, SubscriptionConnectRequest, SubscriptionConnectionStatus,
    SubscriptionServerMessage, SubscriptionWorkerOptions, TcpConnectionHeaderMessage,
    TcpConnectionHeaderResponse, TcpConnectionStatus, SUPPORTED_SUBSCRIPTION_VERSIONS,
};
use crate::timeouts::LinkTimeouts;

use super::logger::WorkerLogger;
use super::status::{connection_status_error, error_from_exception};
use super::transport::{Frame, FrameReader, FrameWriter, MAX_FRAME_BYTES};

/// Tag sent with the TCP info request so the server can attribute it.
const TCP_INFO_TAG: &str = "Subscription";

/// A connection the server accepted for the subscription.
pub(crate) struct NegotiatedConnection<R, W> {
    pub(crate) reader: FrameReader<R>,
    pub(crate) writer: FrameWriter<W>,
    pub(crate) node_tag: Option<String>,
    pub(crate) client_connection_id: String,
    pub(crate) version: i32,
}

/// Result of the frame exchange on an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Accepted {
    pub(crate) version: i32,
    pub(crate) client_connection_id: String,
    pub(crate) current_tag: Option<String>,
}

pub(crate) struct Negotiator<'a> {
    pub(crate) executor: &'a dyn RequestExecutor,
    pub(crate) database: &'a str,
    pub(crate) options: &'a SubscriptionWorkerOptions,
    pub(crate) worker_id: &'a str,
    pub(crate) timeouts: &'a LinkTimeouts,
    pub(crate) events: &'a EventHandlers,
    pub(crate) logger: &'a WorkerLogger,
}

impl Negotiator<'_> {
    /// Open and negotiate a connection, preferring `preferred_node` when set.
    pub(crate) async fn connect(
        &self,
        preferred_node: Option<&str>,
    ) -> Result<NegotiatedConnection<OwnedReadHalf, OwnedWriteHalf>> {
        let connection_timeout = self.timeouts.connection_timeout;
        let negotiation = self.open(preferred_node);
        if LinkTimeouts::is_no_timeout(connection_timeout) {
            return negotiation.await;
        }
        tokio::time::timeout(connection_timeout, negotiation)
            .await
            .map_err(|_| {
                RavenLinkError::TimeoutError(format!(
                    "subscription negotiation did not complete within {:?}",
                    connection_timeout
                ))
            })?
    }

    async fn open(
        &self,
        preferred_node: Option<&str>,
    ) -> Result<NegotiatedConnection<OwnedReadHalf, OwnedWriteHalf>> {
        let command = GetTcpInfoCommand::new(TCP_INFO_TAG, preferred_node.map(str::to_string));
        let info = execute(self.executor, self.database, &command).await?;
        let (host, port) = info.host_and_port()?;

        self.logger
            .debug(format_args!("opening tcp connection to {}:{}", host, port));
        let stream = TcpStream::connect((host.as_str(), port)).await.map_err(|e| {
            RavenLinkError::ConnectionTransient(format!("connect to {}:{} failed: {}", host, port, e))
        })?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let mut reader = FrameReader::new(read_half, MAX_FRAME_BYTES);
        let mut writer = FrameWriter::new(write_half);
        let accepted = self.handshake(&mut reader, &mut writer).await?;

        Ok(NegotiatedConnection {
            reader,
            writer,
            node_tag: info.node_tag.or(accepted.current_tag),
            client_connection_id: accepted.client_connection_id,
            version: accepted.version,
        })
    }

    /// Header exchange followed by the options frame and its status.
    pub(crate) async fn handshake<R, W>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
    ) -> Result<Accepted>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let version = self.negotiate_version(reader, writer).await?;

        let request = SubscriptionConnectRequest::from_options(self.options, self.worker_id);
        self.send(writer, &request).await?;

        loop {
            let frame = self.receive(reader, "subscription connection status").await?;
            let message: SubscriptionServerMessage = serde_json::from_value(frame.value)
                .map_err(|e| RavenLinkError::ConnectionTransient(format!("malformed connection status: {}", e)))?;

            match message {
                SubscriptionServerMessage::ConnectionStatus {
                    status,
                    client_connection_id,
                    message,
                    exception,
                    data,
                } => {
                    if let Some(err) = connection_status_error(
                        &self.options.subscription_name,
                        status,
                        message.as_deref(),
                        exception.as_deref(),
                        data.as_ref(),
                    ) {
                        return Err(err);
                    }
                    debug_assert_eq!(status, SubscriptionConnectionStatus::Accepted);
                    let client_connection_id = client_connection_id.ok_or_else(|| {
                        RavenLinkError::ConnectionTransient(
                            "accepted connection status carries no client connection id".to_string(),
                        )
                    })?;
                    return Ok(Accepted {
                        version,
                        client_connection_id,
                        current_tag: data.and_then(|d| d.current_tag),
                    });
                },
                SubscriptionServerMessage::Heartbeat => continue,
                SubscriptionServerMessage::Error { exception, message } => {
                    return Err(error_from_exception(exception.as_deref(), message.as_deref()));
                },
                other => {
                    return Err(RavenLinkError::ConnectionTransient(format!(
                        "expected ConnectionStatus, received {}",
                        other.type_name()
                    )));
                },
            }
        }
    }

    async fn negotiate_version<R, W>(&self, reader: &mut FrameReader<R>, writer: &mut FrameWriter<W>) -> Result<i32>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut version = SUPPORTED_SUBSCRIPTION_VERSIONS[0];
        loop {
            let header = TcpConnectionHeaderMessage::subscription(self.database, version);
            self.send(writer, &header).await?;

            let frame = self.receive(reader, "tcp header response").await?;
            let response: TcpConnectionHeaderResponse = serde_json::from_value(frame.value)
                .map_err(|e| RavenLinkError::ProtocolMismatch(format!("unreadable header response: {}", e)))?;
            let message = response.message.unwrap_or_default();

            match response.status {
                TcpConnectionStatus::Ok => return Ok(version),
                TcpConnectionStatus::AuthorizationFailed => {
                    return Err(RavenLinkError::AuthorizationError(message));
                },
                TcpConnectionStatus::InvalidNetworkTopology => {
                    return Err(RavenLinkError::ConnectionTransient(format!(
                        "invalid network topology: {}",
                        message
                    )));
                },
                TcpConnectionStatus::TcpVersionMismatch => {
                    let proposed = response.version.and_then(highest_supported_version);
                    match proposed {
                        Some(lower) if lower < version => {
                            self.logger.info(format_args!(
                                "server refused protocol {}, retrying with {}",
                                version, lower
                            ));
                            version = lower;
                        },
                        _ => {
                            return Err(RavenLinkError::ProtocolMismatch(format!(
                                "no common subscription protocol version (client {:?}, server {:?}): {}",
                                SUPPORTED_SUBSCRIPTION_VERSIONS, response.version, message
                            )));
                        },
                    }
                },
            }
        }
    }

    async fn send<W, T>(&self, writer: &mut FrameWriter<W>, message: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let text = writer.write_frame(message, self.timeouts.send_timeout).await?;
        self.events.emit_send(&text);
        Ok(())
    }

    async fn receive<R>(&self, reader: &mut FrameReader<R>, expecting: &str) -> Result<Frame>
    where
        R: AsyncRead + Unpin,
    {
        match reader.read_frame().await? {
            Some(frame) => {
                emit_received(self.events, &frame);
                Ok(frame)
            },
            None => Err(RavenLinkError::ConnectionTransient(format!(
                "connection closed while waiting for {}",
                expecting
            ))),
        }
    }
}

pub(crate) fn emit_received(events: &EventHandlers, frame: &Frame) {
    if events.on_receive.is_some() {
        events.emit_receive(&frame.value.to_string());
    }
}

/// Idle limit for a connection, `None` when heartbeats are disabled.
pub(crate) fn idle_timeout(options: &SubscriptionWorkerOptions, timeouts: &LinkTimeouts) -> Option<Duration> {
    let interval = options.heartbeat_interval();
    if interval.is_zero() {
        None
    } else {
        Some(interval + timeouts.heartbeat_grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRequest;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct NoExecutor;

    #[async_trait]
    impl RequestExecutor for NoExecutor {
        async fn send(&self, _request: CommandRequest) -> Result<Option<JsonValue>> {
            Err(RavenLinkError::NetworkError("offline".into()))
        }
    }

    struct Fixture {
        options: SubscriptionWorkerOptions,
        timeouts: LinkTimeouts,
        events: EventHandlers,
        logger: WorkerLogger,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                options: SubscriptionWorkerOptions::new("orders"),
                timeouts: LinkTimeouts::fast(),
                events: EventHandlers::new(),
                logger: WorkerLogger::for_subscription("orders"),
            }
        }

        fn negotiator<'a>(&'a self, executor: &'a NoExecutor) -> Negotiator<'a> {
            Negotiator {
                executor,
                database: "Northwind",
                options: &self.options,
                worker_id: "worker-1",
                timeouts: &self.timeouts,
                events: &self.events,
                logger: &self.logger,
            }
        }
    }

    /// Runs a scripted server: for each expected client frame, reply with the given frames.
    async fn scripted_handshake(script: Vec<Vec<JsonValue>>) -> (Result<Accepted>, Vec<JsonValue>) {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, mut server_write) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let mut received = Vec::new();
            for replies in script {
                let Ok(Some(line)) = lines.next_line().await else {
                    break;
                };
                received.push(serde_json::from_str::<JsonValue>(&line).unwrap());
                for reply in replies {
                    server_write.write_all(reply.to_string().as_bytes()).await.unwrap();
                }
            }
            received
        });

        let fixture = Fixture::new();
        let executor = NoExecutor;
        let negotiator = fixture.negotiator(&executor);
        let mut reader = FrameReader::new(client_read, MAX_FRAME_BYTES);
        let mut writer = FrameWriter::new(client_write);
        let result = negotiator.handshake(&mut reader, &mut writer).await;
        drop(writer);
        drop(reader);
        (result, server_task.await.unwrap())
    }

    #[tokio::test]
    async fn test_handshake_accepted() {
        let (result, received) = scripted_handshake(vec![
            vec![json!({"Status": "Ok", "Version": 53})],
            vec![
                json!({"Type": "Heartbeat"}),
                json!({"Type": "ConnectionStatus", "Status": "Accepted", "ClientConnectionId": "c-7",
                       "Data": {"CurrentTag": "A"}}),
            ],
        ])
        .await;

        let accepted = result.unwrap();
        assert_eq!(accepted.version, 53);
        assert_eq!(accepted.client_connection_id, "c-7");
        assert_eq!(accepted.current_tag.as_deref(), Some("A"));

        assert_eq!(received[0]["Operation"], "Subscription");
        assert_eq!(received[0]["DatabaseName"], "Northwind");
        assert_eq!(received[1]["SubscriptionName"], "orders");
        assert_eq!(received[1]["WorkerId"], "worker-1");
    }

    #[tokio::test]
    async fn test_version_step_down() {
        let (result, received) = scripted_handshake(vec![
            vec![json!({"Status": "TcpVersionMismatch", "Version": 45})],
            vec![json!({"Status": "Ok", "Version": 40})],
            vec![json!({"Type": "ConnectionStatus", "Status": "Accepted", "ClientConnectionId": "c-1"})],
        ])
        .await;

        assert_eq!(result.unwrap().version, 40);
        assert_eq!(received[0]["OperationVersion"], 53);
        assert_eq!(received[1]["OperationVersion"], 40);
    }

    #[tokio::test]
    async fn test_no_common_version_is_protocol_mismatch() {
        let (result, _) = scripted_handshake(vec![vec![
            json!({"Status": "TcpVersionMismatch", "Version": 30, "Message": "old server"}),
        ]])
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ProtocolMismatch);
    }

    #[tokio::test]
    async fn test_in_use_status() {
        let (result, _) = scripted_handshake(vec![
            vec![json!({"Status": "Ok", "Version": 53})],
            vec![json!({"Type": "ConnectionStatus", "Status": "InUse", "Message": "held"})],
        ])
        .await;
        assert_eq!(result.unwrap_err(), RavenLinkError::SubscriptionInUse("held".into()));
    }

    #[tokio::test]
    async fn test_accepted_without_connection_id_is_transient() {
        let (result, _) = scripted_handshake(vec![
            vec![json!({"Status": "Ok", "Version": 53})],
            vec![json!({"Type": "ConnectionStatus", "Status": "Accepted"})],
        ])
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConnectionTransient);
    }

    #[tokio::test]
    async fn test_authorization_failed_header() {
        let (result, _) = scripted_handshake(vec![vec![
            json!({"Status": "AuthorizationFailed", "Message": "no access"}),
        ]])
        .await;
        assert_eq!(result.unwrap_err(), RavenLinkError::AuthorizationError("no access".into()));
    }

    #[tokio::test]
    async fn test_connect_surfaces_registry_errors() {
        let fixture = Fixture::new();
        let executor = NoExecutor;
        let err = fixture.negotiator(&executor).connect(None).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_idle_timeout() {
        let timeouts = LinkTimeouts::builder().heartbeat_grace(Duration::from_secs(2)).build();
        let options = SubscriptionWorkerOptions::new("orders").with_heartbeat_interval(Duration::from_secs(3));
        assert_eq!(idle_timeout(&options, &timeouts), Some(Duration::from_secs(5)));

        let options = options.with_heartbeat_interval(Duration::ZERO);
        assert_eq!(idle_timeout(&options, &timeouts), None);
    }
}
