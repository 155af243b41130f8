//! # mysqlx-tls
//!
//! TLS upgrade for X protocol connections.
//!
//! The X protocol negotiates encryption in band: the client connects in
//! clear text, asks for TLS through `CapabilitiesSet`, and after the server
//! replies `Ok` both sides run the TLS handshake on the same socket.
//!
//! ```text
//! TCP Connect → CapabilitiesGet → CapabilitiesSet{tls} → Ok → TLS Handshake → Authenticate
//! ```
//!
//! Server certificates are validated against the Mozilla root store unless
//! extra roots are configured. `danger_accept_invalid_certs` turns
//! validation off and logs a warning.
//!
//! ```rust,no_run
//! use mysqlx_tls::{TlsConfig, TlsConnector};
//!
//! # async fn upgrade(tcp: tokio::net::TcpStream) -> Result<(), mysqlx_tls::TlsError> {
//! let connector = TlsConnector::new(TlsConfig::new().with_server_name("db.example.com"))?;
//! let _tls = connector.connect(tcp, "10.0.0.5").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;

pub use config::{TlsConfig, TlsVersion};
pub use connector::TlsConnector;
pub use error::TlsError;

pub use rustls::pki_types::CertificateDer;
pub use tokio_rustls::client::TlsStream;
