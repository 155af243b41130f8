//! Authentication mechanism names.

use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// An authentication mechanism the client can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// Challenge/response against the server's in-memory SHA-256 cache.
    Sha256Memory,
    /// Clear-text password. Only used over TLS.
    Plain,
    /// Legacy SHA-1 challenge/response.
    Mysql41,
}

impl AuthMechanism {
    /// Default preference order.
    pub const DEFAULT_PREFERENCE: [AuthMechanism; 3] = [Self::Sha256Memory, Self::Plain, Self::Mysql41];

    /// Wire name of the mechanism.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256Memory => "SHA256_MEMORY",
            Self::Plain => "PLAIN",
            Self::Mysql41 => "MYSQL41",
        }
    }

    /// Whether the mechanism sends the password in clear and so needs TLS.
    #[must_use]
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Plain)
    }

    /// Whether the server answers the start message with a challenge.
    #[must_use]
    pub fn is_challenge_response(&self) -> bool {
        !matches!(self, Self::Plain)
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuthMechanism {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SHA256_MEMORY" => Ok(Self::Sha256Memory),
            "PLAIN" => Ok(Self::Plain),
            "MYSQL41" => Ok(Self::Mysql41),
            _ => Err(AuthError::UnsupportedMechanism(s.to_string())),
        }
    }
}

/// Filter a preference list down to what can run against this server.
///
/// Order follows `preferred`. Mechanisms that need TLS are dropped unless
/// `tls_active` is true.
#[must_use]
pub fn candidate_mechanisms(
    preferred: &[AuthMechanism],
    offered: &[String],
    tls_active: bool,
) -> Vec<AuthMechanism> {
    let mut candidates = Vec::with_capacity(preferred.len());
    for &mechanism in preferred {
        if candidates.contains(&mechanism) {
            continue;
        }
        if !offered.iter().any(|name| name.eq_ignore_ascii_case(mechanism.name())) {
            continue;
        }
        if mechanism.requires_tls() && !tls_active {
            tracing::debug!(mechanism = mechanism.name(), "skipping mechanism without TLS");
            continue;
        }
        candidates.push(mechanism);
    }
    candidates
}
