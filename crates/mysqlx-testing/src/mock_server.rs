//! Mock X Protocol server for tests.
//!
//! The server speaks the real wire protocol over TCP, so a client under
//! test runs its full handshake, TLS upgrade and authentication against
//! it. Statements are executed against an in-memory [`store`](crate::store).
//!
//! ## Features
//!
//! - Capability exchange and in-band TLS upgrade with a self-signed
//!   certificate
//! - `SHA256_MEMORY`, `MYSQL41` and `PLAIN` authentication with real
//!   scramble verification
//! - Collections and tables backed by an in-memory store
//! - Canned responses for SQL statements
//! - Counters for connections, requests and received bytes
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysqlx_testing::mock_server::MockXServer;
//! use mysqlx_types::DbDoc;
//!
//! #[tokio::test]
//! async fn test_find() {
//!     let server = MockXServer::builder()
//!         .with_user("app", "secret")
//!         .with_collection("library", "books", vec![DbDoc::new().with("_id", 1)])
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let addr = server.addr();
//!     // Connect your client to addr...
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use mysqlx_auth::scramble::{mysql41_scramble, sha256_memory_scramble};
use mysqlx_codec::{CodecError, FrameStream};
use mysqlx_protocol::capabilities::{
    AUTHENTICATION_MECHANISMS, DOC_FORMATS, NODE_TYPE, TLS,
};
use mysqlx_protocol::session::Severity;
use mysqlx_protocol::sql::{NAMESPACE_MYSQLX, NAMESPACE_SQL};
use mysqlx_protocol::{
    Any, AuthenticateContinue, AuthenticateOk, AuthenticateStart, Capabilities, Capability,
    ClientMessage, Notice, Row, Scalar, ServerError, ServerMessage, ServerOk,
    SessionStateParam, StmtExecute, WarningLevel,
};
use mysqlx_types::{DbDoc, Value, encode_value};
use once_cell::sync::Lazy;
use regex::Regex;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio_rustls::TlsAcceptor;

use crate::store::{MockResultSet, MockTable, Reply, Store};

/// Access denied.
pub const ER_ACCESS_DENIED_ERROR: u32 = 1045;
/// Mechanism not offered.
pub const ER_NOT_SUPPORTED_AUTH_MODE: u32 = 1251;
/// Message not valid in the current state.
pub const ER_X_BAD_MESSAGE: u32 = 5000;
/// Capability could not be set.
pub const ER_X_CAPABILITIES_PREPARE_FAILED: u32 = 5001;
/// Admin command arguments are missing or malformed.
pub const ER_X_CMD_NUM_ARGUMENTS: u32 = 5015;
/// Unknown statement namespace.
pub const ER_X_INVALID_NAMESPACE: u32 = 5162;
/// Unknown admin command.
pub const ER_X_INVALID_ADMIN_COMMAND: u32 = 5157;

const DEFAULT_MECHANISMS: [&str; 2] = ["MYSQL41", "SHA256_MEMORY"];

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error on a client connection.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The TLS identity could not be built.
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Canned response for a SQL statement.
#[derive(Clone)]
pub enum MockResponse {
    /// Success without rows.
    Ok {
        /// Reported affected row count.
        rows_affected: u64,
        /// Reported generated auto-increment value.
        last_insert_id: Option<u64>,
    },

    /// One or more result sets.
    ResultSets(Vec<MockResultSet>),

    /// A server error.
    Error(ServerError),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok {
                rows_affected,
                last_insert_id,
            } => f
                .debug_struct("Ok")
                .field("rows_affected", rows_affected)
                .field("last_insert_id", last_insert_id)
                .finish(),
            Self::ResultSets(sets) => f
                .debug_struct("ResultSets")
                .field("count", &sets.len())
                .field(
                    "rows",
                    &sets.iter().map(|s| s.rows.len()).collect::<Vec<_>>(),
                )
                .finish(),
            Self::Error(e) => f
                .debug_struct("Error")
                .field("code", &e.code)
                .field("msg", &e.msg)
                .finish(),
        }
    }
}

impl MockResponse {
    /// Success with nothing affected.
    pub fn empty() -> Self {
        Self::affected(0)
    }

    /// Success with an affected row count.
    pub fn affected(count: u64) -> Self {
        Self::Ok {
            rows_affected: count,
            last_insert_id: None,
        }
    }

    /// A single result set.
    pub fn rows(set: MockResultSet) -> Self {
        Self::ResultSets(vec![set])
    }

    /// A single-row, single-column result.
    pub fn scalar(name: &str, value: impl Into<Value>) -> Self {
        Self::rows(MockResultSet::infer(&[name], vec![vec![value.into()]]))
    }

    /// An error the session survives.
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error(ServerError::new(code, "HY000", message))
    }

    /// An error after which the server drops the connection.
    pub fn fatal(code: u32, message: impl Into<String>) -> Self {
        let mut error = ServerError::new(code, "HY000", message);
        error.severity = Severity::Fatal;
        Self::Error(error)
    }

    fn into_reply(self) -> std::result::Result<Reply, ServerError> {
        match self {
            Self::Ok {
                rows_affected,
                last_insert_id,
            } => Ok(Reply {
                rows_affected: Some(rows_affected),
                last_insert_id,
                ..Reply::default()
            }),
            Self::ResultSets(result_sets) => Ok(Reply {
                result_sets,
                ..Reply::default()
            }),
            Self::Error(e) => Err(e),
        }
    }
}

/// An account the server accepts.
#[derive(Clone)]
struct MockUser {
    name: String,
    password: String,
}

struct TlsIdentity {
    acceptor: TlsAcceptor,
    certificate: CertificateDer<'static>,
}

/// Mock server configuration.
pub struct MockServerConfig {
    users: Vec<MockUser>,
    mechanisms: Vec<String>,
    tls: bool,
    cold_auth_cache: bool,
    responses: HashMap<String, MockResponse>,
    default_response: MockResponse,
    warnings: Vec<(WarningLevel, u32, String)>,
    store: Store,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            mechanisms: DEFAULT_MECHANISMS.iter().map(|m| (*m).to_string()).collect(),
            tls: false,
            cold_auth_cache: false,
            responses: HashMap::new(),
            default_response: MockResponse::empty(),
            warnings: Vec::new(),
            store: Store::default(),
        }
    }
}

/// Builder for [`MockXServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Accept an account.
    pub fn with_user(mut self, name: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.users.push(MockUser {
            name: name.into(),
            password: password.into(),
        });
        self
    }

    /// Mechanisms advertised without TLS. `PLAIN` is added once TLS is up.
    pub fn with_mechanisms<I, S>(mut self, mechanisms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.mechanisms = mechanisms.into_iter().map(Into::into).collect();
        self
    }

    /// Offer TLS with a fresh self-signed certificate for `localhost`.
    pub fn with_tls(mut self) -> Self {
        self.config.tls = true;
        self
    }

    /// Reject `SHA256_MEMORY` as a server with an empty credential cache does.
    pub fn with_cold_auth_cache(mut self) -> Self {
        self.config.cold_auth_cache = true;
        self
    }

    /// Create an empty schema.
    pub fn with_schema(mut self, name: &str) -> Self {
        if !self.config.store.has_schema(name) {
            // Cannot fail: the schema is absent.
            let _ = self.config.store.create_schema(name);
        }
        self
    }

    /// Create a collection holding `docs`. The schema is created as needed.
    pub fn with_collection(mut self, schema: &str, name: &str, docs: Vec<DbDoc>) -> Self {
        self.config.store.insert_collection(schema, name, docs);
        self
    }

    /// Create a table. The schema is created as needed.
    pub fn with_table(mut self, schema: &str, name: &str, table: MockTable) -> Self {
        self.config.store.insert_table(schema, name, table);
        self
    }

    /// Answer a SQL statement. Matching ignores case and surrounding space.
    pub fn with_sql_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        let sql: String = sql.into();
        self.config.responses.insert(normalize(&sql), response);
        self
    }

    /// Response for SQL statements nothing else handles.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Attach a warning to every statement response.
    pub fn with_warning(mut self, level: WarningLevel, code: u32, msg: impl Into<String>) -> Self {
        self.config.warnings.push((level, code, msg.into()));
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockXServer> {
        MockXServer::start(self.config).await
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    total: AtomicUsize,
    requests: AtomicU64,
    bytes_received: AtomicU64,
}

struct Shared {
    config: MockServerConfig,
    tls: Option<TlsIdentity>,
    store: Mutex<Store>,
    counters: Counters,
}

/// A mock X Protocol server for testing.
pub struct MockXServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    shared: Arc<Shared>,
}

impl MockXServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(mut config: MockServerConfig) -> Result<Self> {
        let tls = if config.tls {
            Some(self_signed_identity()?)
        } else {
            None
        };
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let store = std::mem::take(&mut config.store);
        let shared = Arc::new(Shared {
            config,
            tls,
            store: Mutex::new(store),
            counters: Counters::default(),
        });

        let mut shutdown_rx = shutdown_tx.subscribe();
        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut next_id = 0u64;
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                next_id += 1;
                                let id = next_id;
                                let shared = Arc::clone(&accept_shared);
                                tracing::debug!(connection = id, %peer, "mock connection accepted");
                                tokio::spawn(async move {
                                    shared.counters.active.fetch_add(1, Ordering::SeqCst);
                                    shared.counters.total.fetch_add(1, Ordering::SeqCst);
                                    if let Err(e) = handle_connection(stream, Arc::clone(&shared), id).await {
                                        tracing::debug!(connection = id, error = %e, "mock connection ended with error");
                                    }
                                    shared.counters.active.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr,
            shutdown_tx,
            shared,
        })
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Certificate presented on TLS upgrade, for client trust stores.
    pub fn certificate(&self) -> Option<&CertificateDer<'static>> {
        self.shared.tls.as_ref().map(|tls| &tls.certificate)
    }

    /// Connections currently open.
    pub fn connection_count(&self) -> usize {
        self.shared.counters.active.load(Ordering::SeqCst)
    }

    /// Connections accepted since start.
    pub fn total_connections(&self) -> usize {
        self.shared.counters.total.load(Ordering::SeqCst)
    }

    /// Client messages received since start, over all connections.
    pub fn request_count(&self) -> u64 {
        self.shared.counters.requests.load(Ordering::SeqCst)
    }

    /// Frame bytes received since start, over all connections.
    pub fn bytes_received(&self) -> u64 {
        self.shared.counters.bytes_received.load(Ordering::SeqCst)
    }

    /// Current documents of a collection.
    pub async fn documents(&self, schema: &str, collection: &str) -> Option<Vec<DbDoc>> {
        let store = self.shared.store.lock().await;
        store.documents(schema, collection).map(<[DbDoc]>::to_vec)
    }

    /// Current rows of a table.
    pub async fn table_rows(&self, schema: &str, table: &str) -> Option<Vec<Vec<Value>>> {
        let store = self.shared.store.lock().await;
        store.table(schema, table).map(|t| t.rows().to_vec())
    }

    /// Stop the server.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockXServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn self_signed_identity() -> Result<TlsIdentity> {
    let tls_err = |e: &dyn fmt::Display| MockServerError::Tls(e.to_string());
    let key = rcgen::KeyPair::generate().map_err(|e| tls_err(&e))?;
    let cert = rcgen::CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .map_err(|e| tls_err(&e))?
    .self_signed(&key)
    .map_err(|e| tls_err(&e))?;
    let certificate = cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));

    let config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| tls_err(&e))?
            .with_no_client_auth()
            .with_single_cert(vec![certificate.clone()], key)
            .map_err(|e| tls_err(&e))?;
    Ok(TlsIdentity {
        acceptor: TlsAcceptor::from(Arc::new(config)),
        certificate,
    })
}

/// Uppercase with runs of whitespace collapsed.
fn normalize(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// How a pass over one transport ended.
enum Outcome {
    Closed,
    UpgradeTls,
}

/// Pending challenge-response authentication.
struct Challenge {
    mechanism: String,
    nonce: Vec<u8>,
}

struct Connection {
    id: u64,
    shared: Arc<Shared>,
    tls: bool,
    user: Option<String>,
    challenge: Option<Challenge>,
    auth_attempts: u64,
    snapshot: Option<Store>,
}

/// Handle a single client connection.
async fn handle_connection(stream: TcpStream, shared: Arc<Shared>, id: u64) -> Result<()> {
    let mut conn = Connection {
        id,
        shared,
        tls: false,
        user: None,
        challenge: None,
        auth_attempts: 0,
        snapshot: None,
    };

    let mut frames = FrameStream::new(stream);
    if let Outcome::Closed = conn.serve(&mut frames).await? {
        return Ok(());
    }

    let acceptor = match &conn.shared.tls {
        Some(identity) => identity.acceptor.clone(),
        None => return Err(MockServerError::Protocol("TLS not configured".into())),
    };
    let stream = acceptor.accept(frames.into_inner()).await?;
    tracing::debug!(connection = id, "TLS established");
    conn.tls = true;
    let mut frames = FrameStream::new(stream);
    conn.serve(&mut frames).await?;
    Ok(())
}

type Response = std::result::Result<Reply, ServerError>;

impl Connection {
    async fn serve<T>(&mut self, frames: &mut FrameStream<T>) -> Result<Outcome>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(frame) = frames.read_frame().await? {
            let counters = &self.shared.counters;
            counters
                .bytes_received
                .fetch_add(frame.total_size() as u64, Ordering::SeqCst);
            counters.requests.fetch_add(1, Ordering::SeqCst);

            let message = match frame.into_client_message() {
                Ok(message) => message,
                Err(e) => {
                    let mut error = ServerError::new(ER_X_BAD_MESSAGE, "HY000", e.to_string());
                    error.severity = Severity::Fatal;
                    send(frames, ServerMessage::Error(error)).await?;
                    return Err(MockServerError::Protocol(e.to_string()));
                }
            };
            tracing::debug!(connection = self.id, message = message.name(), "mock request");

            match message {
                ClientMessage::CapabilitiesGet => {
                    send(frames, ServerMessage::Capabilities(self.capabilities())).await?;
                }
                ClientMessage::CapabilitiesSet(set) => {
                    let tls = set.capabilities.get(TLS).and_then(Any::as_bool);
                    match tls {
                        Some(true) if self.shared.tls.is_some() && !self.tls => {
                            send(frames, ServerMessage::Ok(ServerOk::default())).await?;
                            return Ok(Outcome::UpgradeTls);
                        }
                        Some(true) => {
                            let error = ServerError::new(
                                ER_X_CAPABILITIES_PREPARE_FAILED,
                                "HY000",
                                "Capability prepare failed for 'tls'",
                            );
                            send(frames, ServerMessage::Error(error)).await?;
                        }
                        _ => send(frames, ServerMessage::Ok(ServerOk::default())).await?,
                    }
                }
                ClientMessage::AuthenticateStart(start) => {
                    let replies = self.start_auth(start).await;
                    send_all(frames, replies).await?;
                }
                ClientMessage::AuthenticateContinue(answer) => {
                    let replies = self.continue_auth(&answer.auth_data).await;
                    send_all(frames, replies).await?;
                }
                ClientMessage::Close => {
                    send(frames, ServerMessage::Ok(ServerOk::default())).await?;
                    return Ok(Outcome::Closed);
                }
                ClientMessage::SessionClose => {
                    self.user = None;
                    self.snapshot = None;
                    send(frames, ServerMessage::Ok(ServerOk::default())).await?;
                }
                _ if self.user.is_none() => {
                    let error = ServerError::new(ER_X_BAD_MESSAGE, "HY000", "Invalid message");
                    send(frames, ServerMessage::Error(error)).await?;
                }
                ClientMessage::SessionReset(_) => {
                    self.snapshot = None;
                    send(frames, ServerMessage::Ok(ServerOk::default())).await?;
                }
                ClientMessage::StmtExecute(stmt) => {
                    let response = self.execute(&stmt).await;
                    if !self.respond(frames, response).await? {
                        return Ok(Outcome::Closed);
                    }
                }
                ClientMessage::Find(find) => {
                    let response = self.shared.store.lock().await.find(&find);
                    if !self.respond(frames, response).await? {
                        return Ok(Outcome::Closed);
                    }
                }
                ClientMessage::Insert(insert) => {
                    let response = self.shared.store.lock().await.insert(&insert);
                    if !self.respond(frames, response).await? {
                        return Ok(Outcome::Closed);
                    }
                }
                ClientMessage::Update(update) => {
                    let response = self.shared.store.lock().await.update(&update);
                    if !self.respond(frames, response).await? {
                        return Ok(Outcome::Closed);
                    }
                }
                ClientMessage::Delete(delete) => {
                    let response = self.shared.store.lock().await.delete(&delete);
                    if !self.respond(frames, response).await? {
                        return Ok(Outcome::Closed);
                    }
                }
            }
        }
        tracing::debug!(connection = self.id, "client disconnected");
        Ok(Outcome::Closed)
    }

    fn mechanisms(&self) -> Vec<String> {
        let mut mechanisms = self.shared.config.mechanisms.clone();
        if self.tls && !mechanisms.iter().any(|m| m == "PLAIN") {
            mechanisms.push("PLAIN".to_string());
        }
        mechanisms
    }

    fn capabilities(&self) -> Capabilities {
        let mut capabilities = Vec::new();
        if self.shared.tls.is_some() {
            capabilities.push(Capability::new(TLS, Scalar::Bool(self.tls)));
        }
        let mechanisms = self
            .mechanisms()
            .into_iter()
            .map(|m| Any::Scalar(Scalar::from(m)))
            .collect();
        capabilities.push(Capability::new(AUTHENTICATION_MECHANISMS, Any::Array(mechanisms)));
        capabilities.push(Capability::new(DOC_FORMATS, Scalar::from("text")));
        capabilities.push(Capability::new(NODE_TYPE, Scalar::from("mysql")));
        Capabilities { capabilities }
    }

    fn nonce(&mut self) -> Vec<u8> {
        self.auth_attempts += 1;
        let seed = self.id.wrapping_mul(0x9e37_79b9).wrapping_add(self.auth_attempts);
        // Printable and NUL-free.
        (0..20u64)
            .map(|i| (seed.wrapping_add(i * 7919) % 94 + 33) as u8)
            .collect()
    }

    async fn start_auth(&mut self, start: AuthenticateStart) -> Vec<ServerMessage> {
        let mechanism = start.mech_name.to_ascii_uppercase();
        self.challenge = None;
        if !self.mechanisms().contains(&mechanism) {
            return vec![ServerMessage::Error(ServerError::new(
                ER_NOT_SUPPORTED_AUTH_MODE,
                "HY000",
                format!("Invalid authentication method {}", start.mech_name),
            ))];
        }

        if mechanism == "PLAIN" {
            let data = start
                .auth_data
                .or(start.initial_response)
                .unwrap_or_default();
            return match split_auth_data(&data) {
                Some((schema, user, password)) => {
                    let ok = self
                        .account(&user)
                        .is_some_and(|account| account.password.as_bytes() == password);
                    self.finish_auth(ok, &schema, &user, !password.is_empty()).await
                }
                None => vec![access_denied("", false)],
            };
        }

        let nonce = self.nonce();
        self.challenge = Some(Challenge {
            mechanism,
            nonce: nonce.clone(),
        });
        vec![ServerMessage::AuthenticateContinue(AuthenticateContinue {
            auth_data: Bytes::from(nonce),
        })]
    }

    async fn continue_auth(&mut self, data: &[u8]) -> Vec<ServerMessage> {
        let Some(challenge) = self.challenge.take() else {
            return vec![ServerMessage::Error(ServerError::new(
                ER_X_BAD_MESSAGE,
                "HY000",
                "Unexpected AuthenticateContinue",
            ))];
        };
        let Some((schema, user, tail)) = split_auth_data(data) else {
            return vec![access_denied("", false)];
        };

        let ok = match (self.account(&user), challenge.mechanism.as_str()) {
            (Some(account), "MYSQL41") => {
                if account.password.is_empty() {
                    tail.is_empty()
                } else {
                    let expected = mysql41_scramble(account.password.as_bytes(), &challenge.nonce);
                    let expected = format!("*{}", hex::encode_upper(expected));
                    tail.eq_ignore_ascii_case(expected.as_bytes())
                }
            }
            (Some(_), "SHA256_MEMORY") if self.shared.config.cold_auth_cache => false,
            (Some(account), "SHA256_MEMORY") => {
                let expected =
                    sha256_memory_scramble(account.password.as_bytes(), &challenge.nonce);
                tail.eq_ignore_ascii_case(hex::encode_upper(expected).as_bytes())
            }
            _ => false,
        };
        self.finish_auth(ok, &schema, &user, !tail.is_empty()).await
    }

    fn account(&self, user: &str) -> Option<&MockUser> {
        self.shared.config.users.iter().find(|u| u.name == user)
    }

    async fn finish_auth(
        &mut self,
        ok: bool,
        schema: &str,
        user: &str,
        using_password: bool,
    ) -> Vec<ServerMessage> {
        if !ok {
            tracing::debug!(connection = self.id, user, "mock authentication rejected");
            return vec![access_denied(user, using_password)];
        }
        if !schema.is_empty() && !self.shared.store.lock().await.has_schema(schema) {
            return vec![ServerMessage::Error(ServerError::new(
                crate::store::ER_BAD_DB_ERROR,
                "42000",
                format!("Unknown database '{schema}'"),
            ))];
        }

        self.user = Some(user.to_string());
        let mut replies = vec![ServerMessage::Notice(Notice::state_changed(
            SessionStateParam::ClientIdAssigned,
            vec![Scalar::UInt(self.id)],
        ))];
        if !schema.is_empty() {
            replies.push(ServerMessage::Notice(Notice::state_changed(
                SessionStateParam::CurrentSchema,
                vec![Scalar::from(schema)],
            )));
        }
        replies.push(ServerMessage::AuthenticateOk(AuthenticateOk::default()));
        replies
    }

    async fn execute(&mut self, stmt: &StmtExecute) -> Response {
        match stmt.namespace.as_str() {
            "" | NAMESPACE_SQL => self.execute_sql(&stmt.stmt_text()).await,
            NAMESPACE_MYSQLX => self.admin(&stmt.stmt_text(), stmt.args.first()).await,
            other => Err(ServerError::new(
                ER_X_INVALID_NAMESPACE,
                "HY000",
                format!("Unknown namespace {other}"),
            )),
        }
    }

    async fn execute_sql(&mut self, text: &str) -> Response {
        let sql = normalize(text);
        if let Some(response) = self.shared.config.responses.get(&sql) {
            return response.clone().into_reply();
        }

        if sql == "SHOW DATABASES" || sql == "SHOW SCHEMAS" {
            let names = self.shared.store.lock().await.schema_names();
            let rows = names.into_iter().map(|n| vec![Value::String(n)]).collect();
            return Ok(Reply {
                result_sets: vec![MockResultSet::infer(&["Database"], rows)],
                ..Reply::default()
            });
        }
        if sql == "START TRANSACTION" || sql == "BEGIN" {
            self.snapshot = Some(self.shared.store.lock().await.clone());
            return MockResponse::empty().into_reply();
        }
        if sql == "COMMIT" {
            self.snapshot = None;
            return MockResponse::empty().into_reply();
        }
        if sql == "ROLLBACK" {
            if let Some(snapshot) = self.snapshot.take() {
                self.shared.store.lock().await.restore(snapshot);
            }
            return MockResponse::empty().into_reply();
        }
        if let Some(caps) = CREATE_SCHEMA.captures(text) {
            let name = unquote(&caps[2]);
            let mut store = self.shared.store.lock().await;
            if caps.get(1).is_some() && store.has_schema(&name) {
                return MockResponse::affected(0).into_reply();
            }
            return store.create_schema(&name);
        }
        if let Some(caps) = DROP_SCHEMA.captures(text) {
            let name = unquote(&caps[2]);
            return self
                .shared
                .store
                .lock()
                .await
                .drop_schema(&name, caps.get(1).is_some());
        }
        if let Some(caps) = COUNT_ROWS.captures(text) {
            return self
                .shared
                .store
                .lock()
                .await
                .count(&unquote(&caps[1]), &unquote(&caps[2]));
        }

        self.shared.config.default_response.clone().into_reply()
    }

    async fn admin(&mut self, command: &str, args: Option<&Any>) -> Response {
        let arg = |name: &str| args.and_then(|a| a.get(name)).and_then(Any::as_str);
        let missing = |name: &str| {
            ServerError::new(
                ER_X_CMD_NUM_ARGUMENTS,
                "HY000",
                format!("Invalid number of arguments: expected '{name}'"),
            )
        };
        let mut store = self.shared.store.lock().await;

        match command {
            "ping" => Ok(Reply::default()),
            "create_collection" | "drop_collection" => {
                let schema = arg("schema").ok_or_else(|| missing("schema"))?;
                let name = arg("name").ok_or_else(|| missing("name"))?;
                if command == "create_collection" {
                    store.create_collection(schema, name)
                } else {
                    store.drop_collection(schema, name)
                }
            }
            "list_objects" => {
                let schema = arg("schema").ok_or_else(|| missing("schema"))?;
                store.list_objects(schema, arg("pattern"))
            }
            other => Err(ServerError::new(
                ER_X_INVALID_ADMIN_COMMAND,
                "HY000",
                format!("Invalid mysqlx command {other}"),
            )),
        }
    }

    /// Write a statement response. Returns `false` when the error was fatal
    /// and the connection must end.
    async fn respond<T>(&self, frames: &mut FrameStream<T>, response: Response) -> Result<bool>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let reply = match response {
            Ok(reply) => reply,
            Err(error) => {
                tracing::debug!(connection = self.id, code = error.code, msg = %error.msg, "mock statement failed");
                let fatal = error.severity == Severity::Fatal;
                send(frames, ServerMessage::Error(error)).await?;
                return Ok(!fatal);
            }
        };

        let messages = match self.encode_reply(reply) {
            Ok(messages) => messages,
            Err(error) => vec![ServerMessage::Error(error)],
        };
        send_all(frames, messages).await?;
        Ok(true)
    }

    fn encode_reply(&self, reply: Reply) -> std::result::Result<Vec<ServerMessage>, ServerError> {
        let Reply {
            result_sets,
            rows_affected,
            rows_matched,
            last_insert_id,
            generated_ids,
        } = reply;

        let mut messages = Vec::new();
        let count = result_sets.len();
        for (i, set) in result_sets.into_iter().enumerate() {
            let mut rows = Vec::with_capacity(set.rows.len());
            for row in &set.rows {
                let fields = row
                    .iter()
                    .zip(&set.columns)
                    .map(|(value, column)| encode_value(value, column))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| {
                        ServerError::new(
                            crate::store::ER_TRUNCATED_WRONG_VALUE,
                            "HY000",
                            e.to_string(),
                        )
                    })?;
                rows.push(ServerMessage::Row(Row { fields }));
            }
            messages.extend(set.columns.into_iter().map(ServerMessage::ColumnMetaData));
            messages.extend(rows);
            messages.push(if i + 1 < count {
                ServerMessage::FetchDoneMoreResultsets
            } else {
                ServerMessage::FetchDone
            });
        }

        for (level, code, msg) in &self.shared.config.warnings {
            messages.push(ServerMessage::Notice(Notice::warning(*level, *code, msg.clone())));
        }
        let mut state = |param, values| {
            messages.push(ServerMessage::Notice(Notice::state_changed(param, values)));
        };
        if let Some(id) = last_insert_id {
            state(SessionStateParam::GeneratedInsertId, vec![Scalar::UInt(id)]);
        }
        if !generated_ids.is_empty() {
            state(
                SessionStateParam::GeneratedDocumentIds,
                generated_ids.into_iter().map(Scalar::from).collect(),
            );
        }
        if let Some(matched) = rows_matched {
            state(SessionStateParam::RowsMatched, vec![Scalar::UInt(matched)]);
        }
        if let Some(affected) = rows_affected {
            state(SessionStateParam::RowsAffected, vec![Scalar::UInt(affected)]);
        }
        messages.push(ServerMessage::StmtExecuteOk);
        Ok(messages)
    }
}

#[allow(clippy::expect_used)]
static CREATE_SCHEMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*CREATE\s+(?:SCHEMA|DATABASE)\s+(IF\s+NOT\s+EXISTS\s+)?(`(?:[^`]|``)+`|\w+)\s*;?\s*$")
        .expect("valid create pattern")
});

#[allow(clippy::expect_used)]
static DROP_SCHEMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*DROP\s+(?:SCHEMA|DATABASE)\s+(IF\s+EXISTS\s+)?(`(?:[^`]|``)+`|\w+)\s*;?\s*$")
        .expect("valid drop pattern")
});

#[allow(clippy::expect_used)]
static COUNT_ROWS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*SELECT\s+COUNT\(\*\)\s+FROM\s+(`(?:[^`]|``)+`|\w+)\.(`(?:[^`]|``)+`|\w+)\s*;?\s*$")
        .expect("valid count pattern")
});

/// Strip backtick quoting.
fn unquote(ident: &str) -> String {
    match ident.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        Some(inner) => inner.replace("``", "`"),
        None => ident.to_string(),
    }
}

/// `schema\0user\0tail`.
fn split_auth_data(data: &[u8]) -> Option<(String, String, Vec<u8>)> {
    let mut parts = data.splitn(3, |b| *b == 0);
    let schema = String::from_utf8(parts.next()?.to_vec()).ok()?;
    let user = String::from_utf8(parts.next()?.to_vec()).ok()?;
    let tail = parts.next()?.to_vec();
    Some((schema, user, tail))
}

fn access_denied(user: &str, using_password: bool) -> ServerMessage {
    ServerMessage::Error(ServerError::new(
        ER_ACCESS_DENIED_ERROR,
        "28000",
        format!(
            "Access denied for user '{user}'@'localhost' (using password: {})",
            if using_password { "YES" } else { "NO" }
        ),
    ))
}

async fn send<T>(frames: &mut FrameStream<T>, message: ServerMessage) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    frames.send_frame(&message).await?;
    Ok(())
}

async fn send_all<T>(frames: &mut FrameStream<T>, messages: Vec<ServerMessage>) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    for message in messages {
        send(frames, message).await?;
    }
    Ok(())
}
