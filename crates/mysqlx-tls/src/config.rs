//! TLS configuration options.

use rustls::pki_types::CertificateDer;

use crate::error::TlsError;

/// TLS configuration for the upgrade that follows capability negotiation.
///
/// The default validates the server certificate against the Mozilla root
/// store shipped in `webpki-roots`, using the host the session connects to
/// as the expected name.
#[derive(Clone, Debug)]
pub struct TlsConfig {
    /// Skip certificate validation. Test setups only.
    pub danger_accept_invalid_certs: bool,

    /// Extra trust anchors. When non-empty they replace the bundled roots.
    pub root_certificates: Vec<CertificateDer<'static>>,

    /// Name used for SNI and hostname checks instead of the connect host.
    pub server_name: Option<String>,

    /// Minimum TLS version.
    pub min_protocol_version: TlsVersion,

    /// Maximum TLS version.
    pub max_protocol_version: TlsVersion,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            danger_accept_invalid_certs: false,
            root_certificates: Vec::new(),
            server_name: None,
            min_protocol_version: TlsVersion::Tls12,
            max_protocol_version: TlsVersion::Tls13,
        }
    }
}

impl TlsConfig {
    /// Create a configuration with secure defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept any server certificate.
    ///
    /// **WARNING:** this disables validation entirely and exposes the
    /// connection to man-in-the-middle attacks.
    #[must_use]
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Trust an additional DER certificate.
    #[must_use]
    pub fn add_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.root_certificates.push(cert);
        self
    }

    /// Trust every certificate in a PEM bundle.
    pub fn add_root_certificates_pem(mut self, pem: &[u8]) -> Result<Self, TlsError> {
        let mut reader = pem;
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::InvalidCertificate(e.to_string()))?;
        if certs.is_empty() {
            return Err(TlsError::InvalidCertificate(
                "no certificates found in PEM input".into(),
            ));
        }
        self.root_certificates.extend(certs);
        Ok(self)
    }

    /// Override the name used for SNI and certificate checks.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Set the minimum TLS version.
    #[must_use]
    pub fn min_protocol_version(mut self, version: TlsVersion) -> Self {
        self.min_protocol_version = version;
        self
    }

    /// Set the maximum TLS version.
    #[must_use]
    pub fn max_protocol_version(mut self, version: TlsVersion) -> Self {
        self.max_protocol_version = version;
        self
    }
}

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TlsVersion {
    /// TLS 1.2.
    #[default]
    Tls12,
    /// TLS 1.3.
    Tls13,
}

impl TlsVersion {
    /// The matching rustls version constant.
    #[must_use]
    pub fn to_rustls(&self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}
