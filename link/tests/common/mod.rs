//! In-process stand-in for a database node.
//!
//! [`FakeDatabase`] answers registry commands through a [`RequestExecutor`]
//! and serves the subscription protocol on a local TCP port, so the worker
//! can be exercised end to end without a running server.

#![allow(dead_code)]

use async_trait::async_trait;
use raven_link::commands::{CommandRequest, HttpMethod};
use raven_link::{
    EventHandlers, LinkTimeouts, RavenLinkClient, RavenLinkError, RequestExecutor, Result,
    SubscriptionWorkerOptions,
};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const DATABASE: &str = "Northwind";
pub const NODE_TAG: &str = "A";

// ── shared helpers ────────────────────────────────────────────────────────────

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Short timeouts so failure paths settle within a few hundred milliseconds.
pub fn test_timeouts() -> LinkTimeouts {
    LinkTimeouts::builder()
        .connection_timeout(Duration::from_secs(5))
        .send_timeout(Duration::from_secs(2))
        .heartbeat_grace(Duration::from_millis(300))
        .ack_confirmation_timeout(Duration::from_secs(5))
        .request_timeout(Duration::from_secs(5))
        .build()
}

/// Worker options with fast heartbeats and retries.
pub fn worker_options(name: &str) -> SubscriptionWorkerOptions {
    SubscriptionWorkerOptions::new(name)
        .with_heartbeat_interval(Duration::from_millis(200))
        .with_time_to_wait_before_connection_retry(Duration::from_millis(50))
        .with_max_retry_delay(Duration::from_millis(200))
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Await `future`, failing the test after `limit`.
pub async fn within<F: Future>(limit: Duration, future: F) -> F::Output {
    tokio::time::timeout(limit, future)
        .await
        .expect("operation did not finish in time")
}

// ── fake database ─────────────────────────────────────────────────────────────

/// Knobs for misbehaving on purpose. Counters are consumed one per event.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub heartbeat_every: Duration,
    /// Highest protocol version the node accepts
    pub max_version: i64,
    /// Accept the next connections, then never send anything
    pub silent_connections: usize,
    /// Close the next connections after reading an ack, without confirming it
    pub drop_before_confirm: usize,
    /// Answer the next connections with a redirect to node B
    pub redirect_connections: usize,
    /// Fail the next bulk_docs calls with a server error
    pub failing_saves: usize,
    /// Send the next idle rounds as batches without documents
    pub empty_batches: usize,
    /// Read the next acks but never confirm them, keeping the connection open
    pub withhold_confirm: usize,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            heartbeat_every: Duration::from_millis(50),
            max_version: 53,
            silent_connections: 0,
            drop_before_confirm: 0,
            redirect_connections: 0,
            failing_saves: 0,
            empty_batches: 0,
            withhold_confirm: 0,
        }
    }
}

/// One acknowledgment read from a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub subscription: String,
    pub change_vector: Option<String>,
}

struct StoredDoc {
    etag: u64,
    collection: String,
    body: JsonValue,
}

struct Connection {
    id: u64,
    worker_id: String,
    kill_tx: mpsc::UnboundedSender<&'static str>,
}

struct Subscription {
    id: i64,
    query: String,
    collection: Option<String>,
    disabled: bool,
    cursor: u64,
    connections: Vec<Connection>,
}

#[derive(Default)]
struct DbState {
    behavior: Behavior,
    last_etag: u64,
    docs: BTreeMap<String, StoredDoc>,
    subscriptions: BTreeMap<String, Subscription>,
    next_subscription_id: i64,
    next_connection_id: u64,
    accepted: usize,
    requests: Vec<CommandRequest>,
    headers: Vec<JsonValue>,
    connect_requests: Vec<JsonValue>,
    acks: Vec<Ack>,
    after_ack_frames: Vec<JsonValue>,
}

struct Inner {
    addr: SocketAddr,
    state: Mutex<DbState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, DbState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A single-node database holding documents and subscriptions in memory.
#[derive(Clone)]
pub struct FakeDatabase {
    inner: Arc<Inner>,
}

impl FakeDatabase {
    pub async fn start() -> Self {
        Self::start_with(Behavior::default()).await
    }

    pub async fn start_with(behavior: Behavior) -> Self {
        init_logging();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake database");
        let addr = listener.local_addr().expect("fake database address");
        let inner = Arc::new(Inner {
            addr,
            state: Mutex::new(DbState {
                behavior,
                ..DbState::default()
            }),
        });
        tokio::spawn(accept_loop(listener, inner.clone()));
        Self { inner }
    }

    pub fn executor(&self) -> Arc<dyn RequestExecutor> {
        Arc::new(FakeExecutor {
            inner: self.inner.clone(),
        })
    }

    pub fn client(&self) -> RavenLinkClient {
        self.client_with(EventHandlers::default())
    }

    pub fn client_with(&self, handlers: EventHandlers) -> RavenLinkClient {
        RavenLinkClient::builder()
            .database(DATABASE)
            .timeouts(test_timeouts())
            .request_executor(self.executor())
            .event_handlers(handlers)
            .build()
            .expect("build client")
    }

    pub fn update_behavior(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut self.inner.lock().behavior);
    }

    /// Store a document and return its change vector.
    pub fn put_document(&self, id: &str, collection: &str, body: JsonValue) -> String {
        self.inner.lock().store(id, collection, body)
    }

    /// Store `count` documents `{ "Index": n }` and return their ids.
    pub fn seed(&self, collection: &str, count: usize) -> Vec<String> {
        let mut state = self.inner.lock();
        let existing = state
            .docs
            .values()
            .filter(|d| d.collection == collection)
            .count();
        (existing + 1..=existing + count)
            .map(|n| {
                let id = format!("{}/{}-A", collection.to_lowercase(), n);
                state.store(&id, collection, json!({ "Index": n }));
                id
            })
            .collect()
    }

    pub fn document(&self, id: &str) -> Option<JsonValue> {
        self.inner.lock().docs.get(id).map(|d| d.body.clone())
    }

    pub fn acks(&self) -> Vec<Ack> {
        self.inner.lock().acks.clone()
    }

    /// Frames a worker sent while one of its acks was left unconfirmed.
    pub fn frames_after_withheld_ack(&self) -> Vec<JsonValue> {
        self.inner.lock().after_ack_frames.clone()
    }

    /// Subscription connections accepted so far.
    pub fn accepted_connections(&self) -> usize {
        self.inner.lock().accepted
    }

    /// Connections currently holding `name`.
    pub fn open_connections(&self, name: &str) -> usize {
        self.inner
            .lock()
            .subscriptions
            .get(name)
            .map_or(0, |s| s.connections.len())
    }

    /// Etag of the last acknowledged document of `name`.
    pub fn cursor(&self, name: &str) -> Option<u64> {
        self.inner.lock().subscriptions.get(name).map(|s| s.cursor)
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.inner.lock().requests.clone()
    }

    pub fn headers(&self) -> Vec<JsonValue> {
        self.inner.lock().headers.clone()
    }

    pub fn connect_requests(&self) -> Vec<JsonValue> {
        self.inner.lock().connect_requests.clone()
    }
}

impl DbState {
    fn store(&mut self, id: &str, collection: &str, mut body: JsonValue) -> String {
        self.last_etag += 1;
        let etag = self.last_etag;
        let change_vector = format!("{}:{}", NODE_TAG, etag);
        if let Some(obj) = body.as_object_mut() {
            obj.insert(
                "@metadata".into(),
                json!({
                    "@id": id,
                    "@collection": collection,
                    "@change-vector": change_vector,
                }),
            );
        }
        self.docs.insert(
            id.to_string(),
            StoredDoc {
                etag,
                collection: collection.to_string(),
                body,
            },
        );
        change_vector
    }

    fn change_vector_of(&self, id: &str) -> Option<String> {
        self.docs
            .get(id)
            .map(|d| format!("{}:{}", NODE_TAG, d.etag))
    }

    /// Next documents past the cursor, `None` once the subscription is gone.
    fn next_batch(&self, name: &str, max_docs: usize) -> Option<Vec<(u64, JsonValue)>> {
        let sub = self.subscriptions.get(name)?;
        let mut docs: Vec<&StoredDoc> = self
            .docs
            .values()
            .filter(|d| d.etag > sub.cursor)
            .filter(|d| {
                sub.collection
                    .as_deref()
                    .map_or(true, |c| c.eq_ignore_ascii_case(&d.collection))
            })
            .collect();
        docs.sort_by_key(|d| d.etag);
        Some(
            docs.into_iter()
                .take(max_docs)
                .map(|d| (d.etag, d.body.clone()))
                .collect(),
        )
    }

    fn advance(&mut self, name: &str, etag: u64) {
        if let Some(sub) = self.subscriptions.get_mut(name) {
            sub.cursor = sub.cursor.max(etag);
        }
    }

    fn admit(
        &mut self,
        name: &str,
        strategy: &str,
        worker_id: &str,
    ) -> std::result::Result<(u64, mpsc::UnboundedReceiver<&'static str>), JsonValue> {
        if self.behavior.redirect_connections > 0 {
            self.behavior.redirect_connections -= 1;
            return Err(json!({
                "Type": "ConnectionStatus",
                "Status": "Redirect",
                "Message": format!("Subscription '{}' is served by node B", name),
                "Data": { "RedirectedTag": "B", "CurrentTag": NODE_TAG },
            }));
        }

        let Some(sub) = self.subscriptions.get_mut(name) else {
            return Err(connection_status(
                "NotFound",
                format!("Subscription '{}' does not exist", name),
            ));
        };
        if sub.disabled {
            return Err(connection_status(
                "Invalid",
                format!("Subscription '{}' is disabled", name),
            ));
        }
        if !sub.connections.is_empty() {
            match strategy {
                "TakeOver" => {
                    for connection in sub.connections.drain(..) {
                        let _ = connection.kill_tx.send("SubscriptionInUseException");
                    }
                },
                "Concurrent" => {},
                _ => {
                    return Err(connection_status(
                        "InUse",
                        format!("Subscription '{}' is in use", name),
                    ))
                },
            }
        }

        self.next_connection_id += 1;
        let id = self.next_connection_id;
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        sub.connections.push(Connection {
            id,
            worker_id: worker_id.to_string(),
            kill_tx,
        });
        self.accepted += 1;
        Ok((id, kill_rx))
    }

    fn release(&mut self, name: &str, connection_id: u64) {
        if let Some(sub) = self.subscriptions.get_mut(name) {
            sub.connections.retain(|c| c.id != connection_id);
        }
    }

    fn subscription_state(&self, name: &str, sub: &Subscription) -> JsonValue {
        let next = (sub.cursor > 0).then(|| format!("{}:{}", NODE_TAG, sub.cursor));
        json!({
            "SubscriptionName": name,
            "SubscriptionId": sub.id,
            "Query": sub.query,
            "ChangeVectorForNextBatchStartingPoint": next,
            "NodeTag": NODE_TAG,
            "Disabled": sub.disabled,
        })
    }

    fn route(&mut self, request: &CommandRequest, addr: SocketAddr) -> Result<Option<JsonValue>> {
        if let Some(db) = &request.database {
            if db != DATABASE {
                return Err(server_error(404, format!("Database '{}' does not exist", db)));
            }
        }

        match (request.method, request.path.as_str()) {
            (HttpMethod::Get, "/info/tcp") => Ok(Some(json!({
                "Url": format!("tcp://{}", addr),
                "NodeTag": NODE_TAG,
            }))),
            (HttpMethod::Put, "/subscriptions") => {
                self.create_subscription(request.body.clone().unwrap_or_default())
                    .map(Some)
            },
            (HttpMethod::Delete, "/subscriptions") => {
                let name = required_param(request, "taskName")?;
                let Some(sub) = self.subscriptions.remove(name) else {
                    return Err(server_error(404, format!("Subscription '{}' not found", name)));
                };
                for connection in sub.connections {
                    let _ = connection.kill_tx.send("SubscriptionDoesNotExistException");
                }
                Ok(None)
            },
            (HttpMethod::Get, "/subscriptions/state") => {
                let name = required_param(request, "name")?;
                match self.subscriptions.get(name) {
                    Some(sub) => Ok(Some(self.subscription_state(name, sub))),
                    None => Err(server_error(404, format!("Subscription '{}' not found", name))),
                }
            },
            (HttpMethod::Get, "/subscriptions") => {
                let start = number_param(request, "start", 0);
                let page_size = number_param(request, "pageSize", usize::MAX);
                let mut subs: Vec<(&String, &Subscription)> = self.subscriptions.iter().collect();
                subs.sort_by_key(|(_, s)| s.id);
                let results: Vec<JsonValue> = subs
                    .into_iter()
                    .skip(start)
                    .take(page_size)
                    .map(|(name, sub)| self.subscription_state(name, sub))
                    .collect();
                Ok(Some(json!({ "Results": results })))
            },
            (HttpMethod::Post, "/subscriptions/drop") => {
                let name = required_param(request, "name")?;
                let worker_id = request.query_param("workerId");
                let Some(sub) = self.subscriptions.get_mut(name) else {
                    return Err(server_error(404, format!("Subscription '{}' not found", name)));
                };
                sub.connections.retain(|c| {
                    let matches = worker_id.map_or(true, |w| w == c.worker_id);
                    if matches {
                        let _ = c.kill_tx.send("SubscriptionClosedException");
                    }
                    !matches
                });
                Ok(None)
            },
            (HttpMethod::Post, "/bulk_docs") => self
                .bulk_docs(request.body.clone().unwrap_or_default())
                .map(Some),
            (method, path) => Err(server_error(404, format!("no route for {} {}", method, path))),
        }
    }

    fn create_subscription(&mut self, body: JsonValue) -> Result<JsonValue> {
        let query = body["Query"].as_str().unwrap_or_default().to_string();
        self.next_subscription_id += 1;
        let id = self.next_subscription_id;
        let name = body["Name"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("subscription-{}", id));
        if self.subscriptions.contains_key(&name) {
            return Err(server_error(
                409,
                format!("A subscription named '{}' already exists", name),
            ));
        }

        let cursor = match body["ChangeVector"].as_str() {
            Some("LastDocument") => self.last_etag,
            Some(cv) => cv
                .rsplit(':')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
            None => 0,
        };

        self.subscriptions.insert(
            name.clone(),
            Subscription {
                id,
                collection: query_collection(&query),
                query,
                disabled: body["Disabled"].as_bool().unwrap_or(false),
                cursor,
                connections: Vec::new(),
            },
        );
        Ok(json!({ "Name": name, "RaftCommandIndex": id }))
    }

    /// Apply a command batch transactionally.
    fn bulk_docs(&mut self, body: JsonValue) -> Result<JsonValue> {
        if self.behavior.failing_saves > 0 {
            self.behavior.failing_saves -= 1;
            return Err(server_error(500, "simulated storage failure".to_string()));
        }

        let commands = body["Commands"].as_array().cloned().unwrap_or_default();
        for command in &commands {
            let id = command["Id"].as_str().unwrap_or_default();
            if let Some(expected) = command["ChangeVector"].as_str() {
                if self.change_vector_of(id).as_deref() != Some(expected) {
                    return Err(server_error(
                        409,
                        format!("ConcurrencyException: document '{}' was modified", id),
                    ));
                }
            }
        }

        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let id = command["Id"].as_str().unwrap_or_default().to_string();
            let kind = command["Type"].as_str().unwrap_or_default().to_string();
            match kind.as_str() {
                "PUT" => {
                    let document = command["Document"].clone();
                    let collection = document["@metadata"]["@collection"]
                        .as_str()
                        .unwrap_or("@empty")
                        .to_string();
                    let change_vector = self.store(&id, &collection, document);
                    results.push(json!({ "Type": kind, "@id": id, "@change-vector": change_vector }));
                },
                "DELETE" => {
                    let deleted = self.docs.remove(&id).is_some();
                    results.push(json!({ "Type": kind, "@id": id, "Deleted": deleted }));
                },
                _ => results.push(json!({ "Type": kind, "@id": id })),
            }
        }
        Ok(json!({ "Results": results }))
    }
}

fn query_collection(query: &str) -> Option<String> {
    let mut words = query.split_whitespace();
    match words.next() {
        Some(word) if word.eq_ignore_ascii_case("from") => words.next().map(str::to_string),
        _ => None,
    }
}

fn connection_status(status: &str, message: String) -> JsonValue {
    json!({ "Type": "ConnectionStatus", "Status": status, "Message": message })
}

fn error_frame(exception: &str, message: &str) -> JsonValue {
    json!({
        "Type": "Error",
        "Exception": format!("Raven.Client.Exceptions.Documents.Subscriptions.{}", exception),
        "Message": message,
    })
}

fn server_error(status_code: u16, message: String) -> RavenLinkError {
    RavenLinkError::ServerError {
        status_code,
        message,
    }
}

fn required_param<'a>(request: &'a CommandRequest, key: &str) -> Result<&'a str> {
    request
        .query_param(key)
        .ok_or_else(|| server_error(400, format!("missing query parameter '{}'", key)))
}

fn number_param(request: &CommandRequest, key: &str, default: usize) -> usize {
    request
        .query_param(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── registry executor ─────────────────────────────────────────────────────────

struct FakeExecutor {
    inner: Arc<Inner>,
}

#[async_trait]
impl RequestExecutor for FakeExecutor {
    async fn send(&self, request: CommandRequest) -> Result<Option<JsonValue>> {
        let mut state = self.inner.lock();
        state.requests.push(request.clone());
        state.route(&request, self.inner.addr)
    }
}

// ── subscription protocol ─────────────────────────────────────────────────────

struct ServerConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ServerConnection {
    async fn read(&mut self) -> Option<JsonValue> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return serde_json::from_str(&line).ok(),
                _ => return None,
            }
        }
    }

    async fn write(&mut self, value: &JsonValue) -> bool {
        let mut text = value.to_string();
        text.push('\n');
        self.writer.write_all(text.as_bytes()).await.is_ok()
    }
}

struct Session {
    name: String,
    max_docs: usize,
    close_when_no_docs_left: bool,
    kill_rx: mpsc::UnboundedReceiver<&'static str>,
}

async fn accept_loop(listener: TcpListener, inner: Arc<Inner>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(serve_connection(inner.clone(), stream));
            },
            Err(e) => {
                log::warn!("[fake-db] accept failed: {}", e);
                return;
            },
        }
    }
}

async fn serve_connection(inner: Arc<Inner>, stream: TcpStream) {
    let _ = stream.set_nodelay(true);
    let (read, writer) = stream.into_split();
    let mut conn = ServerConnection {
        lines: BufReader::new(read).lines(),
        writer,
    };

    loop {
        let Some(header) = conn.read().await else { return };
        let max_version = {
            let mut state = inner.lock();
            state.headers.push(header.clone());
            state.behavior.max_version
        };
        let requested = header["OperationVersion"].as_i64().unwrap_or(0);
        if requested > max_version {
            let mismatch = json!({
                "Status": "TcpVersionMismatch",
                "Version": max_version,
                "Message": format!("version {} is not supported", requested),
            });
            if !conn.write(&mismatch).await {
                return;
            }
            continue;
        }
        if !conn.write(&json!({ "Status": "Ok", "Version": requested })).await {
            return;
        }
        break;
    }

    let Some(request) = conn.read().await else { return };
    let name = request["SubscriptionName"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let strategy = request["Strategy"].as_str().unwrap_or("OpenIfFree");
    let worker_id = request["WorkerId"].as_str().unwrap_or_default();

    let (admitted, silent) = {
        let mut state = inner.lock();
        state.connect_requests.push(request.clone());
        let admitted = state.admit(&name, strategy, worker_id);
        let silent = admitted.is_ok() && state.behavior.silent_connections > 0;
        if silent {
            state.behavior.silent_connections -= 1;
        }
        (admitted, silent)
    };
    let (connection_id, kill_rx) = match admitted {
        Ok(admitted) => admitted,
        Err(status) => {
            conn.write(&status).await;
            return;
        },
    };

    let accepted = json!({
        "Type": "ConnectionStatus",
        "Status": "Accepted",
        "ClientConnectionId": connection_id.to_string(),
        "Data": { "CurrentTag": NODE_TAG },
    });
    if conn.write(&accepted).await {
        if silent {
            while conn.read().await.is_some() {}
        } else {
            let mut session = Session {
                name: name.clone(),
                max_docs: request["MaxDocsPerBatch"]
                    .as_u64()
                    .map_or(4096, |n| n.max(1) as usize),
                close_when_no_docs_left: request["CloseWhenNoDocsLeft"].as_bool().unwrap_or(false),
                kill_rx,
            };
            stream_batches(&mut conn, &inner, &mut session).await;
        }
    }
    inner.lock().release(&name, connection_id);
}

async fn stream_batches(conn: &mut ServerConnection, inner: &Inner, session: &mut Session) {
    loop {
        let (batch, heartbeat, send_empty) = {
            let mut state = inner.lock();
            let batch = state.next_batch(&session.name, session.max_docs);
            let send_empty =
                batch.as_ref().map_or(false, Vec::is_empty) && state.behavior.empty_batches > 0;
            if send_empty {
                state.behavior.empty_batches -= 1;
            }
            (batch, state.behavior.heartbeat_every, send_empty)
        };
        let Some(batch) = batch else {
            conn.write(&error_frame(
                "SubscriptionDoesNotExistException",
                "subscription was deleted",
            ))
            .await;
            return;
        };

        if batch.is_empty() && !send_empty {
            if session.close_when_no_docs_left {
                conn.write(&connection_status("Closed", "No documents left".to_string()))
                    .await;
                return;
            }
            tokio::select! {
                kill = session.kill_rx.recv() => {
                    let exception = kill.unwrap_or("SubscriptionClosedException");
                    conn.write(&error_frame(exception, "connection was dropped")).await;
                    return;
                },
                _ = conn.read() => return,
                _ = tokio::time::sleep(heartbeat) => {
                    if !conn.write(&json!({ "Type": "Heartbeat" })).await {
                        return;
                    }
                },
            }
            continue;
        }

        let last_etag = batch.last().map_or(0, |(etag, _)| *etag);
        for (_, body) in &batch {
            if !conn.write(&json!({ "Type": "Data", "Data": body })).await {
                return;
            }
        }
        if !conn.write(&json!({ "Type": "EndOfBatch" })).await {
            return;
        }

        let ack = loop {
            tokio::select! {
                kill = session.kill_rx.recv() => {
                    let exception = kill.unwrap_or("SubscriptionClosedException");
                    conn.write(&error_frame(exception, "connection was dropped")).await;
                    return;
                },
                message = conn.read() => match message {
                    Some(message) if message["Type"] == "Acknowledge" => break message,
                    _ => return,
                },
                _ = tokio::time::sleep(heartbeat) => {
                    if !conn.write(&json!({ "Type": "Heartbeat" })).await {
                        return;
                    }
                },
            }
        };

        let (drop_now, withhold) = {
            let mut state = inner.lock();
            state.acks.push(Ack {
                subscription: session.name.clone(),
                change_vector: ack["ChangeVector"].as_str().map(str::to_string),
            });
            if state.behavior.drop_before_confirm > 0 {
                state.behavior.drop_before_confirm -= 1;
                (true, false)
            } else if state.behavior.withhold_confirm > 0 {
                state.behavior.withhold_confirm -= 1;
                (false, true)
            } else {
                state.advance(&session.name, last_etag);
                (false, false)
            }
        };
        if drop_now {
            return;
        }
        if withhold {
            while let Some(frame) = conn.read().await {
                inner.lock().after_ack_frames.push(frame);
            }
            return;
        }
        if !conn.write(&json!({ "Type": "Confirm" })).await {
            return;
        }
    }
}
