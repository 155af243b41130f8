//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// None of the preferred mechanisms can be used with this server.
    #[error("no usable authentication mechanism (server offers: {})", offered.join(", "))]
    NoUsableMechanism {
        /// Mechanisms the server advertised.
        offered: Vec<String>,
    },

    /// The server rejected the last mechanism tried.
    #[error("authentication with {mechanism} rejected: {message} (code {code})")]
    Rejected {
        /// Mechanism that was rejected.
        mechanism: String,
        /// Server error code.
        code: u32,
        /// Server error message.
        message: String,
    },

    /// Unknown mechanism name.
    #[error("unsupported authentication mechanism: {0}")]
    UnsupportedMechanism(String),

    /// The server's challenge could not be used.
    #[error("invalid authentication challenge: {0}")]
    InvalidChallenge(String),

    /// The server sent a challenge to a mechanism that takes none.
    #[error("unexpected challenge for {0}")]
    UnexpectedChallenge(&'static str),
}
