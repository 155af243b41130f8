//! Authentication, session and status messages.

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{
    read_field, required, write_bool_field, write_bytes_field, write_string_field,
    write_uint_field,
};
use crate::error::ProtocolError;

/// Begin authentication with a named mechanism.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticateStart {
    /// Mechanism name (`SHA256_MEMORY`, `MYSQL41`, `PLAIN`).
    pub mech_name: String,
    /// Mechanism-specific data.
    pub auth_data: Option<Bytes>,
    /// Response sent without waiting for a challenge.
    pub initial_response: Option<Bytes>,
}

impl AuthenticateStart {
    /// Encode the message.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_string_field(dst, 1, &self.mech_name);
        if let Some(data) = &self.auth_data {
            write_bytes_field(dst, 2, data);
        }
        if let Some(response) = &self.initial_response {
            write_bytes_field(dst, 3, response);
        }
    }

    /// Decode the message.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut mech_name = None;
        let mut auth_data = None;
        let mut initial_response = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => mech_name = Some(field.into_string("mechanism name")?),
                2 => auth_data = Some(field.into_bytes()?),
                3 => initial_response = Some(field.into_bytes()?),
                _ => {}
            }
        }
        Ok(Self {
            mech_name: required(mech_name, "AuthenticateStart.mech_name")?,
            auth_data,
            initial_response,
        })
    }
}

// PLAIN puts the clear-text password in `auth_data`.
impl std::fmt::Debug for AuthenticateStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateStart")
            .field("mech_name", &self.mech_name)
            .field("auth_data", &self.auth_data.as_ref().map(|_| "[REDACTED]"))
            .field(
                "initial_response",
                &self.initial_response.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// A challenge (server to client) or a response (client to server).
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticateContinue {
    /// Challenge or response bytes.
    pub auth_data: Bytes,
}

impl AuthenticateContinue {
    /// Encode the message.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_bytes_field(dst, 1, &self.auth_data);
    }

    /// Decode the message.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut auth_data = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == 1 {
                auth_data = Some(field.into_bytes()?);
            }
        }
        Ok(Self {
            auth_data: required(auth_data, "AuthenticateContinue.auth_data")?,
        })
    }
}

impl std::fmt::Debug for AuthenticateContinue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateContinue")
            .field("auth_data_len", &self.auth_data.len())
            .finish()
    }
}

/// Authentication succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthenticateOk {
    /// Optional final server data.
    pub auth_data: Option<Bytes>,
}

impl AuthenticateOk {
    /// Encode the message.
    pub fn encode(&self, dst: &mut impl BufMut) {
        if let Some(data) = &self.auth_data {
            write_bytes_field(dst, 1, data);
        }
    }

    /// Decode the message.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut auth_data = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == 1 {
                auth_data = Some(field.into_bytes()?);
            }
        }
        Ok(Self { auth_data })
    }
}

/// Reset the session, optionally keeping it authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionReset {
    /// Keep the session open instead of requiring re-authentication.
    pub keep_open: bool,
}

impl SessionReset {
    /// Encode the message.
    pub fn encode(&self, dst: &mut impl BufMut) {
        if self.keep_open {
            write_bool_field(dst, 1, true);
        }
    }

    /// Decode the message.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut keep_open = false;
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == 1 {
                keep_open = field.as_bool()?;
            }
        }
        Ok(Self { keep_open })
    }
}

/// Generic success, optionally with a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerOk {
    /// Message text.
    pub msg: Option<String>,
}

impl ServerOk {
    /// Encode the message.
    pub fn encode(&self, dst: &mut impl BufMut) {
        if let Some(msg) = &self.msg {
            write_string_field(dst, 1, msg);
        }
    }

    /// Decode the message.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut msg = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            if field.number == 1 {
                msg = Some(field.into_string("ok message")?);
            }
        }
        Ok(Self { msg })
    }
}

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Severity {
    /// The request failed; the session remains usable.
    #[default]
    Error = 0,
    /// The session is no longer usable.
    Fatal = 1,
}

/// An error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Severity.
    pub severity: Severity,
    /// Server error code.
    pub code: u32,
    /// SQLSTATE.
    pub sql_state: String,
    /// Human-readable message.
    pub msg: String,
}

impl ServerError {
    /// Create an error with `Error` severity.
    pub fn new(code: u32, sql_state: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            sql_state: sql_state.into(),
            msg: msg.into(),
        }
    }

    /// Encode as a `Mysqlx.Error` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        if self.severity != Severity::Error {
            write_uint_field(dst, 1, self.severity as u64);
        }
        write_uint_field(dst, 2, u64::from(self.code));
        write_string_field(dst, 3, &self.msg);
        write_string_field(dst, 4, &self.sql_state);
    }

    /// Decode a `Mysqlx.Error` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut severity = Severity::Error;
        let mut code = None;
        let mut msg = None;
        let mut sql_state = None;
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => {
                    severity = match field.as_u32()? {
                        0 => Severity::Error,
                        1 => Severity::Fatal,
                        other => {
                            return Err(ProtocolError::InvalidTag {
                                field: "severity",
                                value: other,
                            });
                        }
                    }
                }
                2 => code = Some(field.as_u32()?),
                3 => msg = Some(field.into_string("error message")?),
                4 => sql_state = Some(field.into_string("sql state")?),
                _ => {}
            }
        }
        Ok(Self {
            severity,
            code: required(code, "Error.code")?,
            sql_state: required(sql_state, "Error.sql_state")?,
            msg: required(msg, "Error.msg")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_authenticate_start_debug_redacts() {
        let start = AuthenticateStart {
            mech_name: "PLAIN".into(),
            auth_data: Some(Bytes::from_static(b"\0root\0secret")),
            initial_response: None,
        };
        let debug = format!("{start:?}");
        assert!(debug.contains("PLAIN"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_authenticate_start_roundtrip() {
        let start = AuthenticateStart {
            mech_name: "SHA256_MEMORY".into(),
            auth_data: None,
            initial_response: None,
        };
        let mut buf = BytesMut::new();
        start.encode(&mut buf);
        assert_eq!(AuthenticateStart::decode(&mut buf.freeze()).unwrap(), start);
    }

    #[test]
    fn test_server_error_roundtrip() {
        let err = ServerError {
            severity: Severity::Fatal,
            code: 1045,
            sql_state: "HY000".into(),
            msg: "Access denied".into(),
        };
        let mut buf = BytesMut::new();
        err.encode(&mut buf);
        assert_eq!(ServerError::decode(&mut buf.freeze()).unwrap(), err);
    }

    #[test]
    fn test_server_error_from_server_bytes() {
        // severity omitted, code 1045, msg "denied", sql_state "28000"
        let wire: &[u8] = &[
            0x10, 0x95, 0x08, 0x1a, 0x06, b'd', b'e', b'n', b'i', b'e', b'd', 0x22, 0x05, b'2',
            b'8', b'0', b'0', b'0',
        ];
        let err = ServerError::decode(&mut Bytes::from_static(wire)).unwrap();
        assert_eq!(err.severity, Severity::Error);
        assert_eq!(err.code, 1045);
        assert_eq!(err.msg, "denied");
        assert_eq!(err.sql_state, "28000");
    }

    #[test]
    fn test_server_error_bad_severity() {
        let mut buf = BytesMut::new();
        write_uint_field(&mut buf, 1, 9);
        assert_eq!(
            ServerError::decode(&mut buf.freeze()),
            Err(ProtocolError::InvalidTag {
                field: "severity",
                value: 9
            })
        );
    }

    #[test]
    fn test_server_error_requires_code() {
        let mut buf = BytesMut::new();
        write_string_field(&mut buf, 3, "no code");
        write_string_field(&mut buf, 4, "HY000");
        assert_eq!(
            ServerError::decode(&mut buf.freeze()),
            Err(ProtocolError::MissingField("Error.code"))
        );
    }
}
