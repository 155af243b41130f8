//! Typed client and server messages.
//!
//! A message is the decoded payload of one frame. `ClientMessage` covers
//! everything a client sends, `ServerMessage` everything a server sends.
//!
//! ```rust
//! use bytes::BytesMut;
//! use mysqlx_protocol::{ClientMessage, ClientMessageType};
//!
//! let mut payload = BytesMut::new();
//! let msg = ClientMessage::CapabilitiesGet;
//! msg.encode_payload(&mut payload);
//! assert_eq!(msg.message_type(), ClientMessageType::CapabilitiesGet);
//! assert!(payload.is_empty());
//! ```

use bytes::{Buf, BufMut};

use crate::capabilities::{Capabilities, CapabilitiesSet};
use crate::codec::skip_message;
use crate::crud::{Delete, Find, Insert, Update};
use crate::error::ProtocolError;
use crate::frame::{ClientMessageType, ServerMessageType};
use crate::notice::Notice;
use crate::resultset::{ColumnMetaData, Row};
use crate::session::{
    AuthenticateContinue, AuthenticateOk, AuthenticateStart, ServerError, ServerOk, SessionReset,
};
use crate::sql::StmtExecute;

/// A message sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Ask for capabilities.
    CapabilitiesGet,
    /// Change capabilities.
    CapabilitiesSet(CapabilitiesSet),
    /// Close the connection.
    Close,
    /// Start authentication.
    AuthenticateStart(AuthenticateStart),
    /// Answer a challenge.
    AuthenticateContinue(AuthenticateContinue),
    /// Reset the session.
    SessionReset(SessionReset),
    /// Close the session.
    SessionClose,
    /// Execute a statement.
    StmtExecute(StmtExecute),
    /// Find.
    Find(Find),
    /// Insert.
    Insert(Insert),
    /// Update.
    Update(Update),
    /// Delete.
    Delete(Delete),
}

impl ClientMessage {
    /// Wire type of this message.
    #[must_use]
    pub fn message_type(&self) -> ClientMessageType {
        match self {
            Self::CapabilitiesGet => ClientMessageType::CapabilitiesGet,
            Self::CapabilitiesSet(_) => ClientMessageType::CapabilitiesSet,
            Self::Close => ClientMessageType::Close,
            Self::AuthenticateStart(_) => ClientMessageType::AuthenticateStart,
            Self::AuthenticateContinue(_) => ClientMessageType::AuthenticateContinue,
            Self::SessionReset(_) => ClientMessageType::SessionReset,
            Self::SessionClose => ClientMessageType::SessionClose,
            Self::StmtExecute(_) => ClientMessageType::StmtExecute,
            Self::Find(_) => ClientMessageType::CrudFind,
            Self::Insert(_) => ClientMessageType::CrudInsert,
            Self::Update(_) => ClientMessageType::CrudUpdate,
            Self::Delete(_) => ClientMessageType::CrudDelete,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CapabilitiesGet => "CapabilitiesGet",
            Self::CapabilitiesSet(_) => "CapabilitiesSet",
            Self::Close => "Close",
            Self::AuthenticateStart(_) => "AuthenticateStart",
            Self::AuthenticateContinue(_) => "AuthenticateContinue",
            Self::SessionReset(_) => "SessionReset",
            Self::SessionClose => "SessionClose",
            Self::StmtExecute(_) => "StmtExecute",
            Self::Find(_) => "Find",
            Self::Insert(_) => "Insert",
            Self::Update(_) => "Update",
            Self::Delete(_) => "Delete",
        }
    }

    /// Encode the payload (without frame header).
    pub fn encode_payload(&self, dst: &mut impl BufMut) {
        match self {
            Self::CapabilitiesGet | Self::Close | Self::SessionClose => {}
            Self::CapabilitiesSet(m) => m.encode(dst),
            Self::AuthenticateStart(m) => m.encode(dst),
            Self::AuthenticateContinue(m) => m.encode(dst),
            Self::SessionReset(m) => m.encode(dst),
            Self::StmtExecute(m) => m.encode(dst),
            Self::Find(m) => m.encode(dst),
            Self::Insert(m) => m.encode(dst),
            Self::Update(m) => m.encode(dst),
            Self::Delete(m) => m.encode(dst),
        }
    }

    /// Decode a payload of the given type.
    ///
    /// Unknown fields are skipped, including any on messages without a body.
    pub fn decode(message_type: u8, src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let msg = match ClientMessageType::from_u8(message_type)? {
            ClientMessageType::CapabilitiesGet => Self::CapabilitiesGet,
            ClientMessageType::CapabilitiesSet => {
                Self::CapabilitiesSet(CapabilitiesSet::decode(src)?)
            }
            ClientMessageType::Close => Self::Close,
            ClientMessageType::AuthenticateStart => {
                Self::AuthenticateStart(AuthenticateStart::decode(src)?)
            }
            ClientMessageType::AuthenticateContinue => {
                Self::AuthenticateContinue(AuthenticateContinue::decode(src)?)
            }
            ClientMessageType::SessionReset => Self::SessionReset(SessionReset::decode(src)?),
            ClientMessageType::SessionClose => Self::SessionClose,
            ClientMessageType::StmtExecute => Self::StmtExecute(StmtExecute::decode(src)?),
            ClientMessageType::CrudFind => Self::Find(Find::decode(src)?),
            ClientMessageType::CrudInsert => Self::Insert(Insert::decode(src)?),
            ClientMessageType::CrudUpdate => Self::Update(Update::decode(src)?),
            ClientMessageType::CrudDelete => Self::Delete(Delete::decode(src)?),
        };
        skip_message(src)?;
        Ok(msg)
    }
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Success.
    Ok(ServerOk),
    /// Error.
    Error(ServerError),
    /// Capability list.
    Capabilities(Capabilities),
    /// Authentication challenge.
    AuthenticateContinue(AuthenticateContinue),
    /// Authentication success.
    AuthenticateOk(AuthenticateOk),
    /// Notice.
    Notice(Notice),
    /// Column metadata.
    ColumnMetaData(ColumnMetaData),
    /// Row.
    Row(Row),
    /// All result sets done.
    FetchDone,
    /// One result set done, another follows.
    FetchDoneMoreResultsets,
    /// Statement done.
    StmtExecuteOk,
}

impl ServerMessage {
    /// Wire type of this message.
    #[must_use]
    pub fn message_type(&self) -> ServerMessageType {
        match self {
            Self::Ok(_) => ServerMessageType::Ok,
            Self::Error(_) => ServerMessageType::Error,
            Self::Capabilities(_) => ServerMessageType::Capabilities,
            Self::AuthenticateContinue(_) => ServerMessageType::AuthenticateContinue,
            Self::AuthenticateOk(_) => ServerMessageType::AuthenticateOk,
            Self::Notice(_) => ServerMessageType::Notice,
            Self::ColumnMetaData(_) => ServerMessageType::ColumnMetaData,
            Self::Row(_) => ServerMessageType::Row,
            Self::FetchDone => ServerMessageType::FetchDone,
            Self::FetchDoneMoreResultsets => ServerMessageType::FetchDoneMoreResultsets,
            Self::StmtExecuteOk => ServerMessageType::StmtExecuteOk,
        }
    }

    /// Short name for logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok(_) => "Ok",
            Self::Error(_) => "Error",
            Self::Capabilities(_) => "Capabilities",
            Self::AuthenticateContinue(_) => "AuthenticateContinue",
            Self::AuthenticateOk(_) => "AuthenticateOk",
            Self::Notice(_) => "Notice",
            Self::ColumnMetaData(_) => "ColumnMetaData",
            Self::Row(_) => "Row",
            Self::FetchDone => "FetchDone",
            Self::FetchDoneMoreResultsets => "FetchDoneMoreResultsets",
            Self::StmtExecuteOk => "StmtExecuteOk",
        }
    }

    /// Encode the payload (without frame header).
    pub fn encode_payload(&self, dst: &mut impl BufMut) {
        match self {
            Self::Ok(m) => m.encode(dst),
            Self::Error(m) => m.encode(dst),
            Self::Capabilities(m) => m.encode(dst),
            Self::AuthenticateContinue(m) => m.encode(dst),
            Self::AuthenticateOk(m) => m.encode(dst),
            Self::Notice(m) => m.encode(dst),
            Self::ColumnMetaData(m) => m.encode(dst),
            Self::Row(m) => m.encode(dst),
            Self::FetchDone | Self::FetchDoneMoreResultsets | Self::StmtExecuteOk => {}
        }
    }

    /// Decode a payload of the given type.
    ///
    /// Unknown fields are skipped, including any on messages without a body.
    pub fn decode(message_type: u8, src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let msg = match ServerMessageType::from_u8(message_type)? {
            ServerMessageType::Ok => Self::Ok(ServerOk::decode(src)?),
            ServerMessageType::Error => Self::Error(ServerError::decode(src)?),
            ServerMessageType::Capabilities => Self::Capabilities(Capabilities::decode(src)?),
            ServerMessageType::AuthenticateContinue => {
                Self::AuthenticateContinue(AuthenticateContinue::decode(src)?)
            }
            ServerMessageType::AuthenticateOk => {
                Self::AuthenticateOk(AuthenticateOk::decode(src)?)
            }
            ServerMessageType::Notice => Self::Notice(Notice::decode(src)?),
            ServerMessageType::ColumnMetaData => {
                Self::ColumnMetaData(ColumnMetaData::decode(src)?)
            }
            ServerMessageType::Row => Self::Row(Row::decode(src)?),
            ServerMessageType::FetchDone => Self::FetchDone,
            ServerMessageType::FetchDoneMoreResultsets => Self::FetchDoneMoreResultsets,
            ServerMessageType::StmtExecuteOk => Self::StmtExecuteOk,
        };
        skip_message(src)?;
        Ok(msg)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::frame::{DEFAULT_MAX_FRAME_SIZE, decode_frame, encode_frame};
    use crate::session::Severity;
    use bytes::BytesMut;

    #[test]
    fn test_server_message_through_frame() {
        let msg = ServerMessage::Error(ServerError {
            severity: Severity::Error,
            code: 5115,
            sql_state: "HY000".into(),
            msg: "Document is missing a required field".into(),
        });

        let mut payload = BytesMut::new();
        msg.encode_payload(&mut payload);
        let mut wire = BytesMut::new();
        encode_frame(msg.message_type() as u8, &payload, &mut wire);

        let (ty, mut body) = decode_frame(&mut wire, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(ServerMessage::decode(ty, &mut body).unwrap(), msg);
    }

    #[test]
    fn test_empty_messages() {
        for msg in [
            ServerMessage::FetchDone,
            ServerMessage::FetchDoneMoreResultsets,
            ServerMessage::StmtExecuteOk,
        ] {
            let mut payload = BytesMut::new();
            msg.encode_payload(&mut payload);
            assert!(payload.is_empty());
            let decoded =
                ServerMessage::decode(msg.message_type() as u8, &mut payload.freeze()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_unknown_fields_on_empty_message() {
        let mut payload = BytesMut::from(&[0x08, 0x01][..]);
        assert_eq!(
            ServerMessage::decode(ServerMessageType::FetchDone as u8, &mut payload).unwrap(),
            ServerMessage::FetchDone
        );

        let mut malformed = BytesMut::from(&[0x0b][..]);
        assert_eq!(
            ServerMessage::decode(ServerMessageType::StmtExecuteOk as u8, &mut malformed),
            Err(ProtocolError::InvalidWireType {
                field: 1,
                wire_type: 3
            })
        );
    }

    #[test]
    fn test_capabilities_from_server_bytes() {
        // Capabilities{ capabilities{ name: "tls", value: Any{ SCALAR, Scalar{ V_BOOL, true } } } }
        let wire: &[u8] = &[
            0x0a, 0x0f, 0x0a, 0x03, b't', b'l', b's', 0x12, 0x08, 0x08, 0x01, 0x12, 0x04, 0x08,
            0x07, 0x40, 0x01,
        ];
        let msg = ServerMessage::decode(
            ServerMessageType::Capabilities as u8,
            &mut bytes::Bytes::from_static(wire),
        )
        .unwrap();
        match msg {
            ServerMessage::Capabilities(caps) => assert!(caps.tls()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_client_message_types() {
        assert_eq!(
            ClientMessage::SessionClose.message_type(),
            ClientMessageType::SessionClose
        );
        assert_eq!(ClientMessage::Close.name(), "Close");
        assert!(ClientMessage::decode(9, &mut BytesMut::new()).is_err());
    }
}
