//! Out-of-band notices.
//!
//! Notices can arrive at any point of a response: warnings, session
//! variable changes and session state changes such as the number of rows
//! affected or the ids the server generated for inserted documents.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{
    read_field, required, write_bytes_field, write_message_field, write_string_field,
    write_uint_field,
};
use crate::error::ProtocolError;
use crate::scalar::Scalar;

/// Whether a notice concerns the whole server or this session.
///
/// Frames that leave the scope out are global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum NoticeScope {
    /// Server-wide.
    Global = 1,
    /// This session.
    #[default]
    Local = 2,
}

/// Warning level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum WarningLevel {
    /// Informational note.
    Note = 1,
    /// Warning.
    #[default]
    Warning = 2,
    /// Error downgraded to a warning.
    Error = 3,
}

/// A server warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Level.
    pub level: WarningLevel,
    /// Server code.
    pub code: u32,
    /// Message text.
    pub msg: String,
}

/// Session state parameter identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SessionStateParam {
    /// Default schema changed.
    CurrentSchema = 1,
    /// The account password has expired.
    AccountExpired = 2,
    /// Last auto-increment value.
    GeneratedInsertId = 3,
    /// Rows changed by the statement.
    RowsAffected = 4,
    /// Rows found.
    RowsFound = 5,
    /// Rows matched by the filter.
    RowsMatched = 6,
    /// Transaction committed.
    TrxCommitted = 7,
    /// Transaction rolled back.
    TrxRolledback = 9,
    /// Informational message.
    ProducedMessage = 10,
    /// Connection id assigned to this client.
    ClientIdAssigned = 11,
    /// Ids generated for inserted documents.
    GeneratedDocumentIds = 12,
}

impl SessionStateParam {
    /// Create a parameter from a raw value.
    pub fn from_u32(value: u32) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::CurrentSchema),
            2 => Ok(Self::AccountExpired),
            3 => Ok(Self::GeneratedInsertId),
            4 => Ok(Self::RowsAffected),
            5 => Ok(Self::RowsFound),
            6 => Ok(Self::RowsMatched),
            7 => Ok(Self::TrxCommitted),
            9 => Ok(Self::TrxRolledback),
            10 => Ok(Self::ProducedMessage),
            11 => Ok(Self::ClientIdAssigned),
            12 => Ok(Self::GeneratedDocumentIds),
            _ => Err(ProtocolError::InvalidTag {
                field: "session state parameter",
                value,
            }),
        }
    }
}

/// Notice body.
#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    /// Server warning.
    Warning(Warning),
    /// A session variable changed.
    SessionVariableChanged {
        /// Variable name.
        param: String,
        /// New value.
        value: Option<Scalar>,
    },
    /// Session state changed.
    SessionStateChanged {
        /// What changed.
        param: SessionStateParam,
        /// New values.
        values: Vec<Scalar>,
    },
    /// A notice this client does not interpret, such as the server hello or
    /// a group replication change, kept raw.
    Other {
        /// Frame type.
        frame_type: u32,
        /// Undecoded payload.
        payload: Bytes,
    },
}

/// A notice frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    /// Scope.
    pub scope: NoticeScope,
    /// Body.
    pub kind: NoticeKind,
}

impl Notice {
    const WARNING: u32 = 1;
    const SESSION_VARIABLE_CHANGED: u32 = 2;
    const SESSION_STATE_CHANGED: u32 = 3;

    /// A local warning.
    pub fn warning(level: WarningLevel, code: u32, msg: impl Into<String>) -> Self {
        Self {
            scope: NoticeScope::Local,
            kind: NoticeKind::Warning(Warning {
                level,
                code,
                msg: msg.into(),
            }),
        }
    }

    /// A local session state change.
    #[must_use]
    pub fn state_changed(param: SessionStateParam, values: Vec<Scalar>) -> Self {
        Self {
            scope: NoticeScope::Local,
            kind: NoticeKind::SessionStateChanged { param, values },
        }
    }

    /// Encode as a `Mysqlx.Notice.Frame` body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut payload = BytesMut::new();
        let frame_type = match &self.kind {
            NoticeKind::Warning(w) => {
                if w.level != WarningLevel::Warning {
                    write_uint_field(&mut payload, 1, w.level as u64);
                }
                write_uint_field(&mut payload, 2, u64::from(w.code));
                write_string_field(&mut payload, 3, &w.msg);
                Self::WARNING
            }
            NoticeKind::SessionVariableChanged { param, value } => {
                write_string_field(&mut payload, 1, param);
                if let Some(v) = value {
                    write_message_field(&mut payload, 2, |b| v.encode(b));
                }
                Self::SESSION_VARIABLE_CHANGED
            }
            NoticeKind::SessionStateChanged { param, values } => {
                write_uint_field(&mut payload, 1, *param as u64);
                for v in values {
                    write_message_field(&mut payload, 2, |b| v.encode(b));
                }
                Self::SESSION_STATE_CHANGED
            }
            NoticeKind::Other {
                frame_type,
                payload: raw,
            } => {
                payload.extend_from_slice(raw);
                *frame_type
            }
        };
        write_uint_field(dst, 1, u64::from(frame_type));
        write_uint_field(dst, 2, self.scope as u64);
        if !payload.is_empty() {
            write_bytes_field(dst, 3, &payload);
        }
    }

    /// Decode a `Mysqlx.Notice.Frame` body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut frame_type = None;
        let mut scope = NoticeScope::Global;
        let mut payload = Bytes::new();
        while src.has_remaining() {
            let field = read_field(src)?;
            match field.number {
                1 => frame_type = Some(field.as_u32()?),
                2 => {
                    scope = match field.as_u32()? {
                        1 => NoticeScope::Global,
                        2 => NoticeScope::Local,
                        other => {
                            return Err(ProtocolError::InvalidTag {
                                field: "notice scope",
                                value: other,
                            });
                        }
                    }
                }
                3 => payload = field.into_bytes()?,
                _ => {}
            }
        }
        let frame_type = required(frame_type, "Frame.type")?;
        let kind = match frame_type {
            Self::WARNING => NoticeKind::Warning(decode_warning(&mut payload)?),
            Self::SESSION_VARIABLE_CHANGED => decode_variable_changed(&mut payload)?,
            Self::SESSION_STATE_CHANGED => {
                decode_state_changed(payload.clone())?.unwrap_or(NoticeKind::Other {
                    frame_type,
                    payload,
                })
            }
            _ => NoticeKind::Other {
                frame_type,
                payload,
            },
        };
        Ok(Self { scope, kind })
    }
}

fn decode_warning(src: &mut Bytes) -> Result<Warning, ProtocolError> {
    let mut level = WarningLevel::Warning;
    let mut code = None;
    let mut msg = None;
    while src.has_remaining() {
        let field = read_field(src)?;
        match field.number {
            1 => {
                level = match field.as_u32()? {
                    1 => WarningLevel::Note,
                    2 => WarningLevel::Warning,
                    3 => WarningLevel::Error,
                    other => {
                        return Err(ProtocolError::InvalidTag {
                            field: "warning level",
                            value: other,
                        });
                    }
                }
            }
            2 => code = Some(field.as_u32()?),
            3 => msg = Some(field.into_string("warning message")?),
            _ => {}
        }
    }
    Ok(Warning {
        level,
        code: required(code, "Warning.code")?,
        msg: required(msg, "Warning.msg")?,
    })
}

fn decode_variable_changed(src: &mut Bytes) -> Result<NoticeKind, ProtocolError> {
    let mut param = None;
    let mut value = None;
    while src.has_remaining() {
        let field = read_field(src)?;
        match field.number {
            1 => param = Some(field.into_string("variable name")?),
            2 => value = Some(Scalar::decode(&mut field.into_bytes()?)?),
            _ => {}
        }
    }
    Ok(NoticeKind::SessionVariableChanged {
        param: required(param, "SessionVariableChanged.param")?,
        value,
    })
}

/// `None` when the parameter is one this client does not know.
fn decode_state_changed(mut src: Bytes) -> Result<Option<NoticeKind>, ProtocolError> {
    let mut param = None;
    let mut values = Vec::new();
    while src.has_remaining() {
        let field = read_field(&mut src)?;
        match field.number {
            1 => param = Some(field.as_u32()?),
            2 => values.push(Scalar::decode(&mut field.into_bytes()?)?),
            _ => {}
        }
    }
    let param = required(param, "SessionStateChanged.param")?;
    Ok(SessionStateParam::from_u32(param)
        .ok()
        .map(|param| NoticeKind::SessionStateChanged { param, values }))
}
