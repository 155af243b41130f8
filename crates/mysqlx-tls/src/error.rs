//! TLS-related error types.

use thiserror::Error;

/// Errors that can occur while upgrading a connection to TLS.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TlsError {
    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// The name used for SNI and certificate checks is not a valid server name.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    /// A certificate could not be parsed or added to the trust store.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// TLS configuration error.
    #[error("TLS configuration error: {0}")]
    Configuration(String),

    /// IO error during TLS operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rustls error.
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
}
