//! Session configuration.

use std::time::Duration;

use mysqlx_auth::{AuthMechanism, Credentials};
use mysqlx_protocol::DEFAULT_MAX_FRAME_SIZE;
use mysqlx_tls::TlsConfig;

/// Default X Protocol port.
pub const DEFAULT_PORT: u16 = 33060;

/// Whether the session runs over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SslMode {
    /// Never request TLS.
    Disabled,
    /// Use TLS when the server offers it; fall back to clear text otherwise.
    #[default]
    Preferred,
    /// Fail the handshake unless TLS is negotiated.
    Required,
}

/// Configuration for opening a [`Session`](crate::Session).
///
/// Built with consuming setters; the session copies what it needs, so the
/// configuration can be reused for further sessions.
///
/// ```rust
/// use mysqlx_client::{SessionConfig, SslMode};
///
/// let config = SessionConfig::new()
///     .host("db.example.com")
///     .user("app")
///     .password("secret")
///     .schema("shop")
///     .ssl_mode(SslMode::Required);
/// assert_eq!(config.port, 33060);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 33060).
    pub port: u16,

    /// Authentication credentials.
    pub credentials: Credentials,

    /// Default schema.
    pub schema: Option<String>,

    /// TLS policy.
    pub ssl_mode: SslMode,

    /// TLS configuration used when TLS is negotiated.
    pub tls: TlsConfig,

    /// Mechanisms to try, in order.
    pub auth_mechanisms: Vec<AuthMechanism>,

    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,

    /// Largest frame accepted or sent, header included.
    pub max_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            credentials: Credentials::new("", ""),
            schema: None,
            ssl_mode: SslMode::default(),
            tls: TlsConfig::default(),
            auth_mechanisms: AuthMechanism::DEFAULT_PREFERENCE.to_vec(),
            connect_timeout: Duration::from_secs(15),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the user name, keeping the password.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.credentials = Credentials::new(user.into(), self.credentials.password().to_string());
        self
    }

    /// Set the password, keeping the user name.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.credentials = Credentials::new(self.credentials.username().to_string(), password.into());
        self
    }

    /// Set both user name and password.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the default schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the TLS policy.
    #[must_use]
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Set the TLS configuration.
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Set the mechanism preference order.
    #[must_use]
    pub fn auth_mechanisms(mut self, mechanisms: impl IntoIterator<Item = AuthMechanism>) -> Self {
        self.auth_mechanisms = mechanisms.into_iter().collect();
        self
    }

    /// Set the TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum frame size.
    #[must_use]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// `host:port` for logging and connecting.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 33060);
        assert_eq!(config.ssl_mode, SslMode::Preferred);
        assert_eq!(
            config.auth_mechanisms,
            [
                AuthMechanism::Sha256Memory,
                AuthMechanism::Plain,
                AuthMechanism::Mysql41
            ]
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.max_frame_size, 64 * 1024 * 1024);
        assert!(config.schema.is_none());
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new()
            .host("10.0.0.5")
            .port(33070)
            .password("pw")
            .user("app")
            .schema("test")
            .ssl_mode(SslMode::Disabled)
            .auth_mechanisms([AuthMechanism::Mysql41]);

        assert_eq!(config.address(), "10.0.0.5:33070");
        assert_eq!(config.credentials.username(), "app");
        assert_eq!(config.credentials.password(), "pw");
        assert_eq!(config.schema.as_deref(), Some("test"));
        assert_eq!(config.auth_mechanisms, [AuthMechanism::Mysql41]);
    }

    #[test]
    fn test_debug_hides_password() {
        let config = SessionConfig::new().user("app").password("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
