//! Capability negotiation messages.

use bytes::{Buf, BufMut};

use crate::codec::{read_field, required, write_message_field, write_string_field};
use crate::error::ProtocolError;
use crate::scalar::{Any, Scalar};

/// Capability name for TLS.
pub const TLS: &str = "tls";
/// Capability name for the advertised authentication mechanisms.
pub const AUTHENTICATION_MECHANISMS: &str = "authentication.mechanisms";
/// Capability name for the document formats the server produces.
pub const DOC_FORMATS: &str = "doc.formats";
/// Capability name for the node type.
pub const NODE_TYPE: &str = "node_type";
/// Capability that lets expired-password accounts log in to change it.
pub const CLIENT_PWD_EXPIRE_OK: &str = "client.pwd_expire_ok";

/// One named capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    /// Capability name.
    pub name: String,
    /// Capability value.
    pub value: Any,
}

impl Capability {
    /// Create a capability.
    pub fn new(name: impl Into<String>, value: impl Into<Any>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    fn encode(&self, dst: &mut impl BufMut) {
        write_string_field(dst, 1, &self.name);
        write_message_field(dst, 2, |b| self.value.encode(b));
    }

    fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut name = None;
        let mut value = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => name = Some(field.into_string("capability name")?),
                2 => value = Some(Any::decode(&mut field.into_bytes()?)?),
                _ => {}
            }
        }
        Ok(Self {
            name: required(name, "Capability.name")?,
            value: required(value, "Capability.value")?,
        })
    }
}

/// The server's capability list (also the body of `CapabilitiesSet`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Capabilities {
    /// Capabilities in server order.
    pub capabilities: Vec<Capability>,
}

impl Capabilities {
    /// Look up a capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Any> {
        self.capabilities
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.value)
    }

    /// Whether the server offers TLS.
    #[must_use]
    pub fn tls(&self) -> bool {
        self.get(TLS).and_then(Any::as_bool).unwrap_or(false)
    }

    /// Advertised authentication mechanism names.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        match self.get(AUTHENTICATION_MECHANISMS) {
            Some(Any::Array(items)) => items
                .iter()
                .filter_map(|a| a.as_str().map(str::to_string))
                .collect(),
            Some(Any::Scalar(Scalar::String(single))) => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    /// Encode as a `Mysqlx.Connection.Capabilities` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        for c in &self.capabilities {
            write_message_field(dst, 1, |b| c.encode(b));
        }
    }

    /// Decode a `Mysqlx.Connection.Capabilities` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut capabilities = Vec::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == 1 {
                capabilities.push(Capability::decode(&mut field.into_bytes()?)?);
            }
        }
        Ok(Self { capabilities })
    }
}

/// Request to change capabilities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CapabilitiesSet {
    /// Requested values.
    pub capabilities: Capabilities,
}

impl CapabilitiesSet {
    /// Request a TLS upgrade.
    #[must_use]
    pub fn tls() -> Self {
        Self {
            capabilities: Capabilities {
                capabilities: vec![Capability::new(TLS, Scalar::Bool(true))],
            },
        }
    }

    /// Encode the request.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_message_field(dst, 1, |b| self.capabilities.encode(b));
    }

    /// Decode the request.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut capabilities = Capabilities::default();
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == 1 {
                capabilities = Capabilities::decode(&mut field.into_bytes()?)?;
            }
        }
        Ok(Self { capabilities })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_capabilities_accessors() {
        let caps = Capabilities {
            capabilities: vec![
                Capability::new(TLS, Scalar::Bool(true)),
                Capability::new(
                    AUTHENTICATION_MECHANISMS,
                    Any::Array(vec![
                        Any::Scalar(Scalar::from("MYSQL41")),
                        Any::Scalar(Scalar::from("SHA256_MEMORY")),
                    ]),
                ),
            ],
        };

        let mut buf = BytesMut::new();
        caps.encode(&mut buf);
        let decoded = Capabilities::decode(&mut buf.freeze()).unwrap();

        assert!(decoded.tls());
        assert_eq!(decoded.auth_mechanisms(), vec!["MYSQL41", "SHA256_MEMORY"]);
    }

    #[test]
    fn test_missing_capabilities_default() {
        let caps = Capabilities::default();
        assert!(!caps.tls());
        assert!(caps.auth_mechanisms().is_empty());
    }

    #[test]
    fn test_tls_request() {
        let set = CapabilitiesSet::tls();
        assert!(set.capabilities.tls());

        let mut buf = BytesMut::new();
        set.encode(&mut buf);
        // CapabilitiesSet{capabilities{capabilities{name "tls", value Any{SCALAR, Scalar{V_BOOL, true}}}}}
        let expected: &[u8] = &[
            0x0a, 0x11, 0x0a, 0x0f, 0x0a, 0x03, b't', b'l', b's', 0x12, 0x08, 0x08, 0x01, 0x12,
            0x04, 0x08, 0x07, 0x40, 0x01,
        ];
        assert_eq!(&buf[..], expected);
        assert_eq!(CapabilitiesSet::decode(&mut buf.freeze()).unwrap(), set);
    }

    #[test]
    fn test_unknown_capability_fields_skipped() {
        let mut buf = BytesMut::new();
        Capabilities {
            capabilities: vec![Capability::new(NODE_TYPE, Scalar::from("mysql"))],
        }
        .encode(&mut buf);
        // A field number the client does not know, as a newer server might add
        buf.extend_from_slice(&[0x10, 0x01]);

        let decoded = Capabilities::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.get(NODE_TYPE).and_then(Any::as_str), Some("mysql"));
    }
}
