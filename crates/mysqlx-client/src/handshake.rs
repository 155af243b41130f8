//! Capability negotiation and authentication.
//!
//! ```text
//! Connected ──CapabilitiesGet──▶ CapabilitiesExchanged ──AuthenticateStart──▶ AuthChallenged
//!     │                              │  ▲                                        │
//!     │                              │  └── TLS upgrade, capabilities re-read    │ AuthenticateContinue*
//!     ▼                              ▼                                           ▼
//!   Failed ◀──────────────────── any error ─────────────────────────────── Authenticated
//! ```
//!
//! A rejected mechanism is never retried. When the server answers with
//! access denied and another candidate remains, a fresh `AuthenticateStart`
//! cycle begins with it. Any other error ends the handshake.

use mysqlx_auth::{AuthError, AuthMechanism, candidate_mechanisms, provider_for};
use mysqlx_codec::{CodecError, FrameStream};
use mysqlx_protocol::capabilities::{CLIENT_PWD_EXPIRE_OK, DOC_FORMATS, NODE_TYPE};
use mysqlx_protocol::{
    Any, AuthenticateContinue, AuthenticateStart, Capabilities, CapabilitiesSet, ClientMessage,
    Notice, NoticeKind, ProtocolError, ServerError, ServerMessage, SessionStateParam,
};
use mysqlx_tls::TlsConnector;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{SessionConfig, SslMode};
use crate::error::{Error, Result};
use crate::notice::scalar_text;
use crate::transport::Transport;

/// Server error code for a refused login.
const ER_ACCESS_DENIED_ERROR: u32 = 1045;

/// Where a handshake stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Transport open, nothing exchanged yet.
    Connected,
    /// The server's capabilities are known.
    CapabilitiesExchanged,
    /// An authentication cycle is running.
    AuthChallenged,
    /// The server accepted the credentials.
    Authenticated,
    /// Terminal failure.
    Failed,
}

/// Capabilities the server advertised, as seen after any TLS upgrade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerCapabilities {
    /// The server offers TLS.
    pub tls: bool,
    /// Mechanism names in server order.
    pub auth_mechanisms: Vec<String>,
    /// Document format (`text`).
    pub doc_formats: Option<String>,
    /// Node type (`mysql`).
    pub node_type: Option<String>,
    /// The server lets clients with expired passwords in.
    pub client_pwd_expire_ok: bool,
    /// The full list as received.
    pub raw: Capabilities,
}

impl From<Capabilities> for ServerCapabilities {
    fn from(raw: Capabilities) -> Self {
        Self {
            tls: raw.tls(),
            auth_mechanisms: raw.auth_mechanisms(),
            doc_formats: raw.get(DOC_FORMATS).and_then(Any::as_str).map(str::to_string),
            node_type: raw.get(NODE_TYPE).and_then(Any::as_str).map(str::to_string),
            client_pwd_expire_ok: raw
                .get(CLIENT_PWD_EXPIRE_OK)
                .and_then(Any::as_bool)
                .unwrap_or(false),
            raw,
        }
    }
}

/// What the server told us while authenticating.
#[derive(Debug, Clone, Default)]
pub(crate) struct AuthOutcome {
    pub(crate) mechanism: Option<AuthMechanism>,
    pub(crate) connection_id: Option<u64>,
    pub(crate) current_schema: Option<String>,
}

/// A transport that completed the handshake.
pub(crate) struct Established {
    pub(crate) stream: FrameStream<Transport>,
    pub(crate) capabilities: ServerCapabilities,
    pub(crate) tls: bool,
    pub(crate) outcome: AuthOutcome,
}

/// Open a TCP connection and run the whole handshake on it.
pub(crate) async fn establish(config: &SessionConfig) -> Result<Established> {
    let addr = config.address();
    tracing::debug!("establishing TCP connection to {}", addr);

    let tcp = timeout(config.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Connect(format!("timed out connecting to {addr}")))?
        .map_err(|e| Error::Connect(format!("{addr}: {e}")))?;
    tcp.set_nodelay(true)
        .map_err(|e| Error::Connect(format!("{addr}: {e}")))?;

    let codec = mysqlx_codec::XCodec::new().with_max_frame_size(config.max_frame_size);
    let mut stream = FrameStream::with_codec(Transport::Plain(tcp), codec.clone());
    let mut handshake = Handshake::new(config);

    let mut capabilities = handshake.exchange_capabilities(&mut stream).await?;

    if handshake.wants_tls(&capabilities)? && handshake.request_tls(&mut stream).await? {
        let Transport::Plain(tcp) = stream.into_inner() else {
            return Err(Error::Connect("transport already upgraded".into()));
        };
        tracing::debug!("upgrading transport to TLS");
        let connector = TlsConnector::new(config.tls.clone())?;
        let tls = connector.connect(tcp, &config.host).await?;
        stream = FrameStream::with_codec(Transport::Tls(Box::new(tls)), codec);
        capabilities = handshake.exchange_capabilities(&mut stream).await?;
    }

    let tls = stream.get_ref().is_tls();
    match handshake.authenticate(&mut stream, &capabilities, tls).await {
        Ok(outcome) => Ok(Established {
            stream,
            capabilities,
            tls,
            outcome,
        }),
        Err(e) => {
            if let Err(shutdown) = stream.get_mut().shutdown().await {
                tracing::debug!(error = %shutdown, "shutdown after failed handshake");
            }
            Err(e)
        }
    }
}

/// Drives one handshake over a frame stream.
///
/// Each step is a separate method so the TLS upgrade can happen between
/// capability exchange and authentication.
pub(crate) struct Handshake<'a> {
    config: &'a SessionConfig,
    state: HandshakeState,
    outcome: AuthOutcome,
}

impl<'a> Handshake<'a> {
    pub(crate) fn new(config: &'a SessionConfig) -> Self {
        Self {
            config,
            state: HandshakeState::Connected,
            outcome: AuthOutcome::default(),
        }
    }

    pub(crate) fn state(&self) -> HandshakeState {
        self.state
    }

    fn transition(&mut self, next: HandshakeState) {
        tracing::debug!(from = ?self.state, to = ?next, "handshake state");
        self.state = next;
    }

    fn fail(&mut self, err: Error) -> Error {
        self.transition(HandshakeState::Failed);
        err
    }

    /// `CapabilitiesGet` → `Capabilities`.
    pub(crate) async fn exchange_capabilities<T>(
        &mut self,
        stream: &mut FrameStream<T>,
    ) -> Result<ServerCapabilities>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.send(stream, &ClientMessage::CapabilitiesGet).await?;
        match self.read_message(stream).await? {
            ServerMessage::Capabilities(caps) => {
                let caps = ServerCapabilities::from(caps);
                tracing::debug!(
                    tls = caps.tls,
                    mechanisms = ?caps.auth_mechanisms,
                    "server capabilities"
                );
                self.transition(HandshakeState::CapabilitiesExchanged);
                Ok(caps)
            }
            ServerMessage::Error(e) => Err(self.fail(Error::CapabilityNegotiation(e.msg))),
            other => Err(self.unexpected("Capabilities", &other)),
        }
    }

    /// Decide whether to ask for TLS.
    pub(crate) fn wants_tls(&mut self, caps: &ServerCapabilities) -> Result<bool> {
        match self.config.ssl_mode {
            SslMode::Disabled => Ok(false),
            SslMode::Preferred => Ok(caps.tls),
            SslMode::Required if caps.tls => Ok(true),
            SslMode::Required => Err(self.fail(Error::CapabilityNegotiation(
                "TLS is required but the server does not offer it".into(),
            ))),
        }
    }

    /// `CapabilitiesSet{tls: true}` → `Ok`.
    ///
    /// Returns whether the server agreed. A refusal is an error only when
    /// TLS is required.
    pub(crate) async fn request_tls<T>(&mut self, stream: &mut FrameStream<T>) -> Result<bool>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.send(stream, &ClientMessage::CapabilitiesSet(CapabilitiesSet::tls()))
            .await?;
        match self.read_message(stream).await? {
            ServerMessage::Ok(_) => Ok(true),
            ServerMessage::Error(e) if self.config.ssl_mode == SslMode::Required => Err(
                self.fail(Error::CapabilityNegotiation(format!("TLS refused: {}", e.msg))),
            ),
            ServerMessage::Error(e) => {
                tracing::warn!(code = e.code, message = %e.msg, "server refused TLS, continuing in clear text");
                Ok(false)
            }
            other => Err(self.unexpected("Ok", &other)),
        }
    }

    /// Try each usable mechanism until one is accepted.
    pub(crate) async fn authenticate<T>(
        &mut self,
        stream: &mut FrameStream<T>,
        caps: &ServerCapabilities,
        tls_active: bool,
    ) -> Result<AuthOutcome>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let candidates =
            candidate_mechanisms(&self.config.auth_mechanisms, &caps.auth_mechanisms, tls_active);
        if candidates.is_empty() {
            return Err(self.fail(Error::Auth(AuthError::NoUsableMechanism {
                offered: caps.auth_mechanisms.clone(),
            })));
        }

        let mut remaining = candidates.len();
        for mechanism in candidates {
            remaining -= 1;
            match self.run_mechanism(stream, mechanism).await? {
                None => {
                    tracing::debug!(mechanism = mechanism.name(), "authenticated");
                    self.transition(HandshakeState::Authenticated);
                    self.outcome.mechanism = Some(mechanism);
                    return Ok(std::mem::take(&mut self.outcome));
                }
                Some(rejection) if remaining > 0 && rejection.code == ER_ACCESS_DENIED_ERROR => {
                    tracing::warn!(
                        mechanism = mechanism.name(),
                        code = rejection.code,
                        "authentication rejected, trying next mechanism"
                    );
                    self.transition(HandshakeState::CapabilitiesExchanged);
                }
                Some(rejection) => {
                    return Err(self.fail(Error::Auth(AuthError::Rejected {
                        mechanism: mechanism.name().to_string(),
                        code: rejection.code,
                        message: rejection.msg,
                    })));
                }
            }
        }

        Err(self.fail(Error::Auth(AuthError::NoUsableMechanism {
            offered: caps.auth_mechanisms.clone(),
        })))
    }

    /// One `AuthenticateStart` cycle. `Some` carries the server's rejection.
    async fn run_mechanism<T>(
        &mut self,
        stream: &mut FrameStream<T>,
        mechanism: AuthMechanism,
    ) -> Result<Option<ServerError>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let provider = provider_for(
            mechanism,
            &self.config.credentials,
            self.config.schema.as_deref(),
        );
        let start = provider.start();
        tracing::debug!(mechanism = mechanism.name(), "starting authentication");

        self.send(
            stream,
            &ClientMessage::AuthenticateStart(AuthenticateStart {
                mech_name: mechanism.name().to_string(),
                auth_data: start.auth_data,
                initial_response: start.initial_response,
            }),
        )
        .await?;
        self.transition(HandshakeState::AuthChallenged);

        loop {
            match self.read_message(stream).await? {
                ServerMessage::AuthenticateContinue(challenge) => {
                    let auth_data = provider
                        .respond(&challenge.auth_data)
                        .map_err(|e| self.fail(Error::Auth(e)))?;
                    self.send(
                        stream,
                        &ClientMessage::AuthenticateContinue(AuthenticateContinue { auth_data }),
                    )
                    .await?;
                }
                ServerMessage::AuthenticateOk(_) => return Ok(None),
                ServerMessage::Error(e) => return Ok(Some(e)),
                other => return Err(self.unexpected("AuthenticateContinue or AuthenticateOk", &other)),
            }
        }
    }

    async fn send<T>(&mut self, stream: &mut FrameStream<T>, msg: &ClientMessage) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        match stream.send_frame(msg).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(transport_error(e))),
        }
    }

    /// Next non-notice message. Notices are recorded.
    async fn read_message<T>(&mut self, stream: &mut FrameStream<T>) -> Result<ServerMessage>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let frame = match stream.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    return Err(self.fail(Error::Connect(
                        "server closed the connection during handshake".into(),
                    )));
                }
                Err(e) => return Err(self.fail(transport_error(e))),
            };
            match frame.into_server_message() {
                Ok(ServerMessage::Notice(notice)) => self.record_notice(notice),
                Ok(msg) => return Ok(msg),
                Err(e) => return Err(self.fail(Error::Protocol(e))),
            }
        }
    }

    fn record_notice(&mut self, notice: Notice) {
        match notice.kind {
            NoticeKind::SessionStateChanged {
                param: SessionStateParam::ClientIdAssigned,
                values,
            } => {
                self.outcome.connection_id = values.first().and_then(|v| match v {
                    mysqlx_protocol::Scalar::UInt(id) => Some(*id),
                    mysqlx_protocol::Scalar::SInt(id) => u64::try_from(*id).ok(),
                    _ => None,
                });
                tracing::debug!(connection_id = ?self.outcome.connection_id, "connection id assigned");
            }
            NoticeKind::SessionStateChanged {
                param: SessionStateParam::CurrentSchema,
                values,
            } => {
                self.outcome.current_schema = values.first().and_then(scalar_text);
            }
            NoticeKind::Warning(w) => {
                tracing::warn!(code = w.code, message = %w.msg, "server warning during handshake");
            }
            other => tracing::trace!(kind = ?other, "ignoring handshake notice"),
        }
    }

    fn unexpected(&mut self, expected: &'static str, got: &ServerMessage) -> Error {
        self.fail(Error::Protocol(ProtocolError::UnexpectedMessage {
            expected,
            received: got.name().to_string(),
        }))
    }
}

fn transport_error(err: CodecError) -> Error {
    match err {
        CodecError::Protocol(e) => Error::Protocol(e),
        other => Error::Connect(format!("connection lost during handshake: {other}")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use mysqlx_auth::Credentials;
    use mysqlx_codec::Frame;
    use mysqlx_protocol::capabilities::{AUTHENTICATION_MECHANISMS, TLS};
    use mysqlx_protocol::frame::encode_frame;
    use mysqlx_protocol::{AuthenticateOk, Capability, Scalar, ServerOk};
    use tokio_test::io::Builder;

    fn server(msg: &ServerMessage) -> Vec<u8> {
        let frame = Frame::from(msg);
        let mut buf = BytesMut::new();
        encode_frame(frame.message_type, &frame.payload, &mut buf);
        buf.to_vec()
    }

    fn client(msg: &ClientMessage) -> Vec<u8> {
        let frame = Frame::from(msg);
        let mut buf = BytesMut::new();
        encode_frame(frame.message_type, &frame.payload, &mut buf);
        buf.to_vec()
    }

    fn capabilities(tls: bool, mechanisms: &[&str]) -> Capabilities {
        Capabilities {
            capabilities: vec![
                Capability::new(TLS, Scalar::Bool(tls)),
                Capability::new(
                    AUTHENTICATION_MECHANISMS,
                    Any::Array(
                        mechanisms
                            .iter()
                            .map(|m| Any::Scalar(Scalar::from(*m)))
                            .collect(),
                    ),
                ),
            ],
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new()
            .credentials(Credentials::new("app", "secret"))
            .schema("test")
    }

    fn start(mechanism: AuthMechanism, config: &SessionConfig) -> ClientMessage {
        let start = provider_for(mechanism, &config.credentials, config.schema.as_deref()).start();
        ClientMessage::AuthenticateStart(AuthenticateStart {
            mech_name: mechanism.name().to_string(),
            auth_data: start.auth_data,
            initial_response: start.initial_response,
        })
    }

    fn answer(mechanism: AuthMechanism, config: &SessionConfig, nonce: &[u8]) -> ClientMessage {
        let provider = provider_for(mechanism, &config.credentials, config.schema.as_deref());
        ClientMessage::AuthenticateContinue(AuthenticateContinue {
            auth_data: provider.respond(nonce).unwrap(),
        })
    }

    fn challenge(nonce: &'static [u8]) -> ServerMessage {
        ServerMessage::AuthenticateContinue(AuthenticateContinue {
            auth_data: bytes::Bytes::from_static(nonce),
        })
    }

    #[tokio::test]
    async fn test_capabilities_exchange() {
        let caps = capabilities(true, &["SHA256_MEMORY", "MYSQL41"]);
        let mock = Builder::new()
            .write(&client(&ClientMessage::CapabilitiesGet))
            .read(&server(&ServerMessage::Capabilities(caps)))
            .build();
        let config = config();
        let mut handshake = Handshake::new(&config);
        let mut stream = FrameStream::new(mock);

        let caps = handshake.exchange_capabilities(&mut stream).await.unwrap();
        assert!(caps.tls);
        assert_eq!(caps.auth_mechanisms, ["SHA256_MEMORY", "MYSQL41"]);
        assert_eq!(handshake.state(), HandshakeState::CapabilitiesExchanged);
    }

    #[tokio::test]
    async fn test_required_tls_not_offered() {
        let config = config().ssl_mode(SslMode::Required);
        let mut handshake = Handshake::new(&config);
        let caps = ServerCapabilities::from(capabilities(false, &["MYSQL41"]));
        let err = handshake.wants_tls(&caps).unwrap_err();
        assert!(matches!(err, Error::CapabilityNegotiation(_)));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn test_preferred_tls_refused_continues() {
        let mock = Builder::new()
            .write(&client(&ClientMessage::CapabilitiesSet(CapabilitiesSet::tls())))
            .read(&server(&ServerMessage::Error(ServerError::new(
                5001,
                "HY000",
                "TLS not configured",
            ))))
            .build();
        let config = config();
        let mut handshake = Handshake::new(&config);
        let mut stream = FrameStream::new(mock);
        assert!(!handshake.request_tls(&mut stream).await.unwrap());
    }

    #[tokio::test]
    async fn test_sha256_memory_challenge_response() {
        let config = config();
        let nonce: &'static [u8] = b"abcdefghijklmnopqrst";
        let mock = Builder::new()
            .write(&client(&start(AuthMechanism::Sha256Memory, &config)))
            .read(&server(&challenge(nonce)))
            .write(&client(&answer(AuthMechanism::Sha256Memory, &config, nonce)))
            .read(&server(&ServerMessage::Notice(Notice::state_changed(
                SessionStateParam::ClientIdAssigned,
                vec![Scalar::UInt(42)],
            ))))
            .read(&server(&ServerMessage::AuthenticateOk(AuthenticateOk::default())))
            .build();

        let mut handshake = Handshake::new(&config);
        let mut stream = FrameStream::new(mock);
        let caps = ServerCapabilities::from(capabilities(false, &["SHA256_MEMORY"]));
        let outcome = handshake.authenticate(&mut stream, &caps, false).await.unwrap();

        assert_eq!(outcome.mechanism, Some(AuthMechanism::Sha256Memory));
        assert_eq!(outcome.connection_id, Some(42));
        assert_eq!(handshake.state(), HandshakeState::Authenticated);
    }

    #[tokio::test]
    async fn test_fallback_starts_fresh_cycle() {
        let config = config();
        let nonce: &'static [u8] = b"01234567890123456789";
        let mock = Builder::new()
            .write(&client(&start(AuthMechanism::Sha256Memory, &config)))
            .read(&server(&challenge(nonce)))
            .write(&client(&answer(AuthMechanism::Sha256Memory, &config, nonce)))
            .read(&server(&ServerMessage::Error(ServerError::new(
                1045,
                "HY000",
                "Access denied",
            ))))
            .write(&client(&start(AuthMechanism::Mysql41, &config)))
            .read(&server(&challenge(nonce)))
            .write(&client(&answer(AuthMechanism::Mysql41, &config, nonce)))
            .read(&server(&ServerMessage::AuthenticateOk(AuthenticateOk::default())))
            .build();

        let mut handshake = Handshake::new(&config);
        let mut stream = FrameStream::new(mock);
        let caps = ServerCapabilities::from(capabilities(false, &["SHA256_MEMORY", "MYSQL41"]));
        let outcome = handshake.authenticate(&mut stream, &caps, false).await.unwrap();
        assert_eq!(outcome.mechanism, Some(AuthMechanism::Mysql41));
    }

    #[tokio::test]
    async fn test_rejection_without_fallback() {
        let config = config().auth_mechanisms([AuthMechanism::Mysql41]);
        let nonce: &'static [u8] = b"01234567890123456789";
        let mock = Builder::new()
            .write(&client(&start(AuthMechanism::Mysql41, &config)))
            .read(&server(&challenge(nonce)))
            .write(&client(&answer(AuthMechanism::Mysql41, &config, nonce)))
            .read(&server(&ServerMessage::Error(ServerError::new(
                1045,
                "HY000",
                "Access denied for user 'app'",
            ))))
            .build();

        let mut handshake = Handshake::new(&config);
        let mut stream = FrameStream::new(mock);
        let caps = ServerCapabilities::from(capabilities(false, &["SHA256_MEMORY", "MYSQL41"]));
        let err = handshake.authenticate(&mut stream, &caps, false).await.unwrap_err();

        match err {
            Error::Auth(AuthError::Rejected {
                mechanism, code, ..
            }) => {
                assert_eq!(mechanism, "MYSQL41");
                assert_eq!(code, 1045);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn test_non_access_denied_error_stops_fallback() {
        let config = config();
        let nonce: &'static [u8] = b"01234567890123456789";
        // Only the first cycle is scripted: a second AuthenticateStart would
        // be an unexpected write.
        let mock = Builder::new()
            .write(&client(&start(AuthMechanism::Sha256Memory, &config)))
            .read(&server(&challenge(nonce)))
            .write(&client(&answer(AuthMechanism::Sha256Memory, &config, nonce)))
            .read(&server(&ServerMessage::Error(ServerError::new(
                1251,
                "08004",
                "Client does not support authentication protocol",
            ))))
            .build();

        let mut handshake = Handshake::new(&config);
        let mut stream = FrameStream::new(mock);
        let caps = ServerCapabilities::from(capabilities(false, &["SHA256_MEMORY", "MYSQL41"]));
        let err = handshake.authenticate(&mut stream, &caps, false).await.unwrap_err();

        match err {
            Error::Auth(AuthError::Rejected {
                mechanism, code, ..
            }) => {
                assert_eq!(mechanism, "SHA256_MEMORY");
                assert_eq!(code, 1251);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn test_plain_refused_without_tls() {
        let config = config().auth_mechanisms([AuthMechanism::Plain]);
        let mock = Builder::new().build();
        let mut handshake = Handshake::new(&config);
        let mut stream = FrameStream::new(mock);
        let caps = ServerCapabilities::from(capabilities(false, &["PLAIN"]));
        let err = handshake.authenticate(&mut stream, &caps, false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Auth(AuthError::NoUsableMechanism { .. })
        ));
    }

    #[tokio::test]
    async fn test_unexpected_message_fails() {
        let mock = Builder::new()
            .write(&client(&ClientMessage::CapabilitiesGet))
            .read(&server(&ServerMessage::Ok(ServerOk::default())))
            .build();
        let config = config();
        let mut handshake = Handshake::new(&config);
        let mut stream = FrameStream::new(mock);
        let err = handshake.exchange_capabilities(&mut stream).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnexpectedMessage { .. })
        ));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }
}
