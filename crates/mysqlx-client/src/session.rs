//! Sessions: one authenticated transport and the requests run over it.
//!
//! A [`Session`] is a cheap handle; clones share the transport. Requests are
//! serialized through an async mutex that the live [`ResponseStream`] holds.
//! A second request while a stream is open is rejected, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use mysqlx_auth::AuthMechanism;
use mysqlx_codec::{AbortHandle, Connection};
use mysqlx_protocol::{ClientMessage, ServerMessage, SessionReset};
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::handshake::{ServerCapabilities, establish};
use crate::schema::Schema;
use crate::sql::{SqlStatement, quote_identifier};
use crate::stream::ResponseStream;
use crate::transport::Transport;

/// The transport plus a flag saying an abandoned response is still on it.
pub(crate) struct Link {
    pub(crate) conn: Connection<Transport>,
    pub(crate) pending: bool,
}

impl Link {
    /// Read and discard frames up to the next terminal status.
    async fn drain(&mut self) -> Result<()> {
        loop {
            let frame = self.conn.read_frame().await?.ok_or_else(|| {
                Error::AmbiguousOutcome("connection closed while discarding a response".into())
            })?;
            match frame.into_server_message()? {
                ServerMessage::Ok(_) | ServerMessage::StmtExecuteOk | ServerMessage::Error(_) => {
                    self.pending = false;
                    return Ok(());
                }
                _ => {}
            }
        }
    }
}

pub(crate) struct SessionInner {
    link: Arc<Mutex<Link>>,
    abort: AbortHandle<Transport>,
    capabilities: ServerCapabilities,
    tls: bool,
    user: String,
    host: String,
    port: u16,
    mechanism: Option<AuthMechanism>,
    connection_id: Option<u64>,
    default_schema: parking_lot::Mutex<Option<String>>,
    seq: AtomicU64,
    closed: AtomicBool,
    broken: AtomicBool,
}

impl SessionInner {
    pub(crate) fn mark_broken(&self) {
        if !self.broken.swap(true, Ordering::AcqRel) {
            tracing::debug!(host = %self.host, port = self.port, "session marked broken");
        }
    }

    pub(crate) fn set_default_schema(&self, schema: Option<String>) {
        *self.default_schema.lock() = schema;
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || self.broken.load(Ordering::Acquire) {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }
}

/// An authenticated session.
///
/// # Example
///
/// ```rust,no_run
/// use mysqlx_client::{Session, SessionConfig};
///
/// # async fn example() -> mysqlx_client::Result<()> {
/// let config = SessionConfig::new()
///     .host("localhost")
///     .user("app")
///     .password("secret")
///     .schema("library");
/// let session = Session::open(config).await?;
///
/// let books = session.get_schema("library").get_collection("books");
/// let mut result = books.find(Some("pages > :min")).bind("min", 300).execute().await?;
/// while let Some(doc) = result.fetch_one().await? {
///     println!("{doc}");
/// }
///
/// session.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Connect, negotiate and authenticate.
    pub async fn open(config: SessionConfig) -> Result<Self> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            schema = config.schema.as_deref().unwrap_or(""),
            "opening session"
        );

        let established = establish(&config).await?;
        let conn = Connection::from_stream(established.stream);
        let abort = conn.abort_handle();
        let schema = config
            .schema
            .clone()
            .or(established.outcome.current_schema);

        tracing::info!(
            host = %config.host,
            port = config.port,
            schema = schema.as_deref().unwrap_or(""),
            tls = established.tls,
            mechanism = established.outcome.mechanism.as_ref().map(AuthMechanism::name),
            connection_id = ?established.outcome.connection_id,
            "session opened"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                link: Arc::new(Mutex::new(Link {
                    conn,
                    pending: false,
                })),
                abort,
                capabilities: established.capabilities,
                tls: established.tls,
                user: config.credentials.username().to_string(),
                host: config.host,
                port: config.port,
                mechanism: established.outcome.mechanism,
                connection_id: established.outcome.connection_id,
                default_schema: parking_lot::Mutex::new(schema),
                seq: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                broken: AtomicBool::new(false),
            }),
        })
    }

    /// Send one request and return its response stream.
    ///
    /// Fails with [`Error::SessionBusy`] while another stream of this session
    /// is alive and undrained.
    pub async fn execute(&self, request: ClientMessage) -> Result<ResponseStream> {
        self.inner.check_open()?;
        let mut link = Arc::clone(&self.inner.link)
            .try_lock_owned()
            .map_err(|_| Error::SessionBusy)?;

        if link.pending {
            tracing::debug!("discarding leftover response");
            if let Err(e) = link.drain().await {
                self.inner.mark_broken();
                return Err(e);
            }
        }

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(seq, message = request.name(), "executing request");

        if let Err(e) = link.conn.send_frame(&request).await {
            self.inner.mark_broken();
            return Err(e.into());
        }

        Ok(ResponseStream::new(link, Arc::clone(&self.inner), seq))
    }

    /// Close the session. Idempotent.
    ///
    /// With no response open the server is told goodbye; otherwise the
    /// transport is aborted and the open response fails with
    /// [`Error::AmbiguousOutcome`].
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(host = %self.inner.host, port = self.inner.port, "closing session");

        let link = Arc::clone(&self.inner.link).try_lock_owned();
        match link {
            Ok(mut link) if !link.pending && !self.inner.broken.load(Ordering::Acquire) => {
                for request in [ClientMessage::SessionClose, ClientMessage::Close] {
                    if link.conn.send_frame(&request).await.is_err() {
                        break;
                    }
                    if !matches!(link.drain().await, Ok(())) {
                        break;
                    }
                }
                if let Err(e) = link.conn.shutdown().await {
                    tracing::debug!(error = %e, "error shutting down transport");
                }
            }
            _ => self.inner.abort.abort().await,
        }
    }

    /// Reset session state, keeping the connection authenticated.
    pub async fn reset(&self) -> Result<()> {
        self.execute(ClientMessage::SessionReset(SessionReset { keep_open: true }))
            .await?
            .finish()
            .await?;
        Ok(())
    }

    /// A raw SQL statement.
    #[must_use]
    pub fn sql(&self, text: impl Into<String>) -> SqlStatement {
        SqlStatement::new(self.clone(), text)
    }

    /// Handle on a schema. No round trip.
    #[must_use]
    pub fn get_schema(&self, name: impl Into<String>) -> Schema {
        Schema::new(self.clone(), name)
    }

    /// Handle on the default schema, if one is set.
    #[must_use]
    pub fn get_default_schema(&self) -> Option<Schema> {
        self.default_schema_name().map(|name| self.get_schema(name))
    }

    /// Name of the default schema.
    #[must_use]
    pub fn default_schema_name(&self) -> Option<String> {
        self.inner.default_schema.lock().clone()
    }

    /// Every schema visible to the user.
    pub async fn get_schemas(&self) -> Result<Vec<Schema>> {
        let mut result = self.sql("SHOW DATABASES").execute().await?;
        let mut schemas = Vec::new();
        while let Some(row) = result.fetch_one().await? {
            schemas.push(self.get_schema(row.get::<String>(0)?));
        }
        Ok(schemas)
    }

    /// Create a schema.
    pub async fn create_schema(&self, name: &str) -> Result<Schema> {
        crate::schema::validate_name("schema", name)?;
        self.sql(format!("CREATE SCHEMA {}", quote_identifier(name)))
            .execute()
            .await?;
        Ok(self.get_schema(name))
    }

    /// Drop a schema. Dropping a missing schema is not an error.
    pub async fn drop_schema(&self, name: &str) -> Result<()> {
        crate::schema::validate_name("schema", name)?;
        self.sql(format!("DROP SCHEMA IF EXISTS {}", quote_identifier(name)))
            .execute()
            .await?;
        Ok(())
    }

    /// `START TRANSACTION`.
    pub async fn start_transaction(&self) -> Result<()> {
        self.sql("START TRANSACTION").execute().await?;
        Ok(())
    }

    /// `COMMIT`.
    pub async fn commit(&self) -> Result<()> {
        self.sql("COMMIT").execute().await?;
        Ok(())
    }

    /// `ROLLBACK`.
    pub async fn rollback(&self) -> Result<()> {
        self.sql("ROLLBACK").execute().await?;
        Ok(())
    }

    /// Whether the session can still run requests.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.check_open().is_ok()
    }

    /// Capabilities the server advertised.
    #[must_use]
    pub fn server_capabilities(&self) -> &ServerCapabilities {
        &self.inner.capabilities
    }

    /// Whether the transport is encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.inner.tls
    }

    /// Connection id the server assigned, if it told us.
    #[must_use]
    pub fn connection_id(&self) -> Option<u64> {
        self.inner.connection_id
    }

    /// Authenticated user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.inner.user
    }

    /// Mechanism that authenticated the session.
    #[must_use]
    pub fn auth_mechanism(&self) -> Option<AuthMechanism> {
        self.inner.mechanism
    }

    /// Number of requests sent so far.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.inner.seq.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.inner.host)
            .field("port", &self.inner.port)
            .field("user", &self.inner.user)
            .field("tls", &self.inner.tls)
            .field("open", &self.is_open())
            .finish()
    }
}
