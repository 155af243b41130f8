//! Authentication provider trait and the built-in mechanisms.
//!
//! A provider drives one authentication cycle: it produces the
//! `AuthenticateStart` payload and answers each server challenge. The
//! handshake owns the message exchange; providers never touch the network.

use bytes::Bytes;

use crate::credentials::Credentials;
use crate::error::AuthError;
use crate::mechanism::AuthMechanism;
use crate::scramble::{mysql41_scramble, sha256_memory_scramble};

/// Payload of an `AuthenticateStart` message.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AuthStart {
    /// Mechanism-specific data.
    pub auth_data: Option<Bytes>,
    /// Response sent without waiting for a challenge.
    pub initial_response: Option<Bytes>,
}

impl std::fmt::Debug for AuthStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStart")
            .field("auth_data", &self.auth_data.as_ref().map(|_| "[REDACTED]"))
            .field(
                "initial_response",
                &self.initial_response.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Trait for authentication providers.
///
/// # Example
///
/// ```rust
/// use mysqlx_auth::{AuthMechanism, AuthProvider, Credentials, provider_for};
///
/// let creds = Credentials::new("app", "secret");
/// let provider = provider_for(AuthMechanism::Sha256Memory, &creds, Some("test"));
/// let start = provider.start();
/// assert!(start.initial_response.is_none());
///
/// let response = provider.respond(b"01234567890123456789").unwrap();
/// assert!(response.starts_with(b"test\0app\0"));
/// ```
pub trait AuthProvider: Send + Sync {
    /// The mechanism this provider runs.
    fn mechanism(&self) -> AuthMechanism;

    /// Build the `AuthenticateStart` payload.
    fn start(&self) -> AuthStart;

    /// Answer a server challenge.
    fn respond(&self, challenge: &[u8]) -> Result<Bytes, AuthError>;
}

/// Create the provider for a mechanism.
#[must_use]
pub fn provider_for(
    mechanism: AuthMechanism,
    credentials: &Credentials,
    schema: Option<&str>,
) -> Box<dyn AuthProvider> {
    let identity = Identity {
        schema: schema.unwrap_or_default().to_string(),
        credentials: credentials.clone(),
    };
    match mechanism {
        AuthMechanism::Sha256Memory => Box::new(Sha256MemoryAuth { identity }),
        AuthMechanism::Plain => Box::new(PlainAuth { identity }),
        AuthMechanism::Mysql41 => Box::new(Mysql41Auth { identity }),
    }
}

#[derive(Clone)]
struct Identity {
    schema: String,
    credentials: Credentials,
}

impl Identity {
    /// `schema\0user\0` followed by `tail`.
    fn message(&self, tail: &[u8]) -> Bytes {
        let user = self.credentials.username();
        let mut out = Vec::with_capacity(self.schema.len() + user.len() + 2 + tail.len());
        out.extend_from_slice(self.schema.as_bytes());
        out.push(0);
        out.extend_from_slice(user.as_bytes());
        out.push(0);
        out.extend_from_slice(tail);
        Bytes::from(out)
    }
}

fn check_nonce(challenge: &[u8]) -> Result<(), AuthError> {
    if challenge.is_empty() {
        return Err(AuthError::InvalidChallenge("empty nonce".into()));
    }
    Ok(())
}

/// `SHA256_MEMORY`: scramble against the server's cached password hash.
struct Sha256MemoryAuth {
    identity: Identity,
}

impl AuthProvider for Sha256MemoryAuth {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Sha256Memory
    }

    fn start(&self) -> AuthStart {
        AuthStart::default()
    }

    fn respond(&self, challenge: &[u8]) -> Result<Bytes, AuthError> {
        check_nonce(challenge)?;
        let password = self.identity.credentials.password().as_bytes();
        let scramble = sha256_memory_scramble(password, challenge);
        Ok(self.identity.message(hex::encode_upper(scramble).as_bytes()))
    }
}

/// `MYSQL41`: legacy SHA-1 scramble.
struct Mysql41Auth {
    identity: Identity,
}

impl AuthProvider for Mysql41Auth {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Mysql41
    }

    fn start(&self) -> AuthStart {
        AuthStart::default()
    }

    fn respond(&self, challenge: &[u8]) -> Result<Bytes, AuthError> {
        check_nonce(challenge)?;
        if self.identity.credentials.has_empty_password() {
            return Ok(self.identity.message(b""));
        }
        let password = self.identity.credentials.password().as_bytes();
        let scramble = mysql41_scramble(password, challenge);
        let mut tail = Vec::with_capacity(41);
        tail.push(b'*');
        tail.extend_from_slice(hex::encode_upper(scramble).as_bytes());
        Ok(self.identity.message(&tail))
    }
}

/// `PLAIN`: clear-text password in the start message, no challenge.
struct PlainAuth {
    identity: Identity,
}

impl AuthProvider for PlainAuth {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    fn start(&self) -> AuthStart {
        let password = self.identity.credentials.password().as_bytes();
        AuthStart {
            auth_data: Some(self.identity.message(password)),
            initial_response: None,
        }
    }

    fn respond(&self, _challenge: &[u8]) -> Result<Bytes, AuthError> {
        Err(AuthError::UnexpectedChallenge("PLAIN"))
    }
}
