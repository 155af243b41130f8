//! Client error types.

use mysqlx_codec::CodecError;
use mysqlx_protocol::{ProtocolError, ServerError, Severity};
use thiserror::Error;

/// Message used when a row-scoped mutation has no condition.
pub(crate) const CONDITION_REQUIRED: &str =
    "Parameter can't be null or empty. Parameter name: condition";

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A byte stream to the server could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Framing or message format violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A required capability could not be negotiated.
    #[error("capability negotiation failed: {0}")]
    CapabilityNegotiation(String),

    /// Credentials rejected or no usable mechanism.
    #[error("authentication failed: {0}")]
    Auth(#[from] mysqlx_auth::AuthError),

    /// TLS upgrade failed while opening the session.
    #[error("TLS error: {0}")]
    Tls(#[from] mysqlx_tls::TlsError),

    /// Invalid input detected before contacting the server.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A placeholder in an expression has no bound value.
    #[error("no value bound for placeholder :{0}")]
    UnboundParameter(String),

    /// Another response is still streaming on this session.
    #[error("session is busy with another request")]
    SessionBusy,

    /// A value does not match its declared column type.
    #[error("decode error: {0}")]
    Decode(#[from] mysqlx_types::TypeError),

    /// The server answered with an error frame.
    #[error("server error {code} ({sql_state}): {message}")]
    Server {
        /// Server error code.
        code: u32,
        /// SQLSTATE.
        sql_state: String,
        /// Message text, verbatim.
        message: String,
        /// Severity reported by the server.
        severity: Severity,
    },

    /// The connection was lost mid-operation; the server-side effect is unknown.
    #[error("operation outcome unknown: {0}")]
    AmbiguousOutcome(String),

    /// The session was closed or is no longer usable.
    #[error("session is closed")]
    SessionClosed,
}

impl Error {
    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors are failures to connect and lost connections. A
    /// retry needs a fresh session.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::AmbiguousOutcome(_))
    }

    /// Check if this error indicates a protocol/driver bug.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Check if this is a server error with a specific code.
    #[must_use]
    pub fn is_server_error(&self, code: u32) -> bool {
        matches!(self, Self::Server { code: c, .. } if *c == code)
    }

    /// Server error code, if any.
    #[must_use]
    pub fn server_code(&self) -> Option<u32> {
        match self {
            Self::Server { code, .. } => Some(*code),
            Self::Auth(mysqlx_auth::AuthError::Rejected { code, .. }) => Some(*code),
            _ => None,
        }
    }

    /// SQLSTATE of a server error.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Server { sql_state, .. } => Some(sql_state),
            _ => None,
        }
    }

    /// Whether the session that raised this error can no longer be used.
    #[must_use]
    pub fn terminates_session(&self) -> bool {
        match self {
            Self::Protocol(_) | Self::AmbiguousOutcome(_) | Self::SessionClosed => true,
            Self::Server { severity, .. } => *severity == Severity::Fatal,
            _ => false,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Self::Server {
            code: err.code,
            sql_state: err.sql_state,
            message: err.msg,
            severity: err.severity,
        }
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Protocol(e) => Self::Protocol(e),
            CodecError::Aborted => {
                Self::AmbiguousOutcome("connection aborted while a response was pending".into())
            }
            CodecError::ConnectionClosed => {
                Self::AmbiguousOutcome("server closed the connection".into())
            }
            other => Self::AmbiguousOutcome(other.to_string()),
        }
    }
}

impl From<crate::expr::ParseError> for Error {
    fn from(err: crate::expr::ParseError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
