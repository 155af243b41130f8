//! X Protocol frame header and message type definitions.
//!
//! Every message on the wire is a frame:
//!
//! ```text
//! +----------------+------+------------------+
//! | length (u32le) | type | payload          |
//! +----------------+------+------------------+
//!   4 bytes          1      length - 1 bytes
//! ```
//!
//! The length counts the type byte plus the payload, never itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Frame header size in bytes (length prefix plus message type).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Default maximum frame size accepted by a decoder (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Smallest maximum frame size a decoder may be configured with.
pub const MIN_MAX_FRAME_SIZE: usize = 16;

/// Message types sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientMessageType {
    /// Ask the server for its capabilities.
    CapabilitiesGet = 1,
    /// Change capabilities (for example, turn on TLS).
    CapabilitiesSet = 2,
    /// Close the connection.
    Close = 3,
    /// Begin an authentication exchange.
    AuthenticateStart = 4,
    /// Continue an authentication exchange.
    AuthenticateContinue = 5,
    /// Reset session state.
    SessionReset = 6,
    /// Close the session.
    SessionClose = 7,
    /// Execute a statement in a namespace (`sql`, `mysqlx`).
    StmtExecute = 12,
    /// Read documents or rows.
    CrudFind = 17,
    /// Insert documents or rows.
    CrudInsert = 18,
    /// Update documents or rows.
    CrudUpdate = 19,
    /// Delete documents or rows.
    CrudDelete = 20,
}

impl ClientMessageType {
    /// Create a message type from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::CapabilitiesGet),
            2 => Ok(Self::CapabilitiesSet),
            3 => Ok(Self::Close),
            4 => Ok(Self::AuthenticateStart),
            5 => Ok(Self::AuthenticateContinue),
            6 => Ok(Self::SessionReset),
            7 => Ok(Self::SessionClose),
            12 => Ok(Self::StmtExecute),
            17 => Ok(Self::CrudFind),
            18 => Ok(Self::CrudInsert),
            19 => Ok(Self::CrudUpdate),
            20 => Ok(Self::CrudDelete),
            _ => Err(ProtocolError::InvalidClientMessageType(value)),
        }
    }
}

/// Message types sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerMessageType {
    /// Generic success.
    Ok = 0,
    /// Error report.
    Error = 1,
    /// Capability list.
    Capabilities = 2,
    /// Authentication challenge.
    AuthenticateContinue = 3,
    /// Authentication success.
    AuthenticateOk = 4,
    /// Out-of-band notice.
    Notice = 11,
    /// Column metadata, one frame per column.
    ColumnMetaData = 12,
    /// One row of a result set.
    Row = 13,
    /// End of all result sets.
    FetchDone = 14,
    /// End of one result set, another follows.
    FetchDoneMoreResultsets = 16,
    /// Statement completed.
    StmtExecuteOk = 17,
}

impl ServerMessageType {
    /// Create a message type from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Error),
            2 => Ok(Self::Capabilities),
            3 => Ok(Self::AuthenticateContinue),
            4 => Ok(Self::AuthenticateOk),
            11 => Ok(Self::Notice),
            12 => Ok(Self::ColumnMetaData),
            13 => Ok(Self::Row),
            14 => Ok(Self::FetchDone),
            16 => Ok(Self::FetchDoneMoreResultsets),
            17 => Ok(Self::StmtExecuteOk),
            _ => Err(ProtocolError::InvalidServerMessageType(value)),
        }
    }
}

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the type byte plus payload.
    pub length: u32,
    /// Raw message type byte.
    pub message_type: u8,
}

impl FrameHeader {
    /// Create a header for a payload of the given size.
    #[must_use]
    pub const fn new(message_type: u8, payload_len: usize) -> Self {
        Self {
            length: payload_len as u32 + 1,
            message_type,
        }
    }

    /// Parse a frame header from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: FRAME_HEADER_SIZE,
                actual: src.remaining(),
            });
        }
        let length = src.get_u32_le();
        if length == 0 {
            return Err(ProtocolError::InvalidLength(length));
        }
        let message_type = src.get_u8();
        Ok(Self {
            length,
            message_type,
        })
    }

    /// Encode the frame header to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.length);
        dst.put_u8(self.message_type);
    }

    /// Payload length (frame length minus the type byte).
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length.saturating_sub(1) as usize
    }

    /// Total frame size on the wire, header included.
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        self.length as usize + 4
    }
}

/// Append one frame to `dst`.
pub fn encode_frame(message_type: u8, payload: &[u8], dst: &mut impl BufMut) {
    FrameHeader::new(message_type, payload.len()).encode(dst);
    dst.put_slice(payload);
}

/// Split one complete frame off the front of `src`.
///
/// Returns `Ok(None)` and leaves `src` untouched until the whole frame is
/// buffered, so callers never observe a partial frame.
pub fn decode_frame(
    src: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<(u8, Bytes)>, ProtocolError> {
    if src.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
    if length == 0 {
        return Err(ProtocolError::InvalidLength(length));
    }

    let frame_size = length as usize + 4;
    if frame_size > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: frame_size,
            max: max_frame_size,
        });
    }

    if src.len() < frame_size {
        src.reserve(frame_size - src.len());
        return Ok(None);
    }

    let mut frame = src.split_to(frame_size);
    frame.advance(4);
    let message_type = frame.get_u8();
    Ok(Some((message_type, frame.freeze())))
}

/// Check what is left in the buffer once the byte source is exhausted.
///
/// Leftover bytes mean the peer stopped in the middle of a frame.
pub fn check_end_of_stream(src: &BytesMut) -> Result<(), ProtocolError> {
    if src.is_empty() {
        return Ok(());
    }
    let expected = if src.len() >= 4 {
        u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize + 4
    } else {
        FRAME_HEADER_SIZE
    };
    Err(ProtocolError::Truncated {
        expected,
        actual: src.len(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader::new(ServerMessageType::Row as u8, 42);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), FRAME_HEADER_SIZE);

        let mut cursor = buf.freeze();
        let decoded = FrameHeader::decode(&mut cursor).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.payload_length(), 42);
        assert_eq!(decoded.frame_size(), 47);
    }

    #[test]
    fn test_decode_frame_waits_for_full_payload() {
        let mut full = BytesMut::new();
        encode_frame(ClientMessageType::StmtExecute as u8, b"payload", &mut full);

        let mut partial = BytesMut::from(&full[..8]);
        assert!(decode_frame(&mut partial, DEFAULT_MAX_FRAME_SIZE).unwrap().is_none());
        assert_eq!(partial.len(), 8);

        partial.extend_from_slice(&full[8..]);
        let (ty, payload) = decode_frame(&mut partial, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(ty, ClientMessageType::StmtExecute as u8);
        assert_eq!(&payload[..], b"payload");
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_frame_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(1000);
        buf.put_u8(13);
        let err = decode_frame(&mut buf, 64).unwrap_err();
        assert_eq!(err, ProtocolError::FrameTooLarge { size: 1004, max: 64 });
    }

    #[test]
    fn test_decode_frame_zero_length() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0, 0][..]);
        assert_eq!(
            decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(ProtocolError::InvalidLength(0))
        );
    }

    #[test]
    fn test_check_end_of_stream() {
        assert!(check_end_of_stream(&BytesMut::new()).is_ok());

        let mut buf = BytesMut::new();
        buf.put_u32_le(11);
        buf.put_u8(13);
        buf.put_slice(b"abc");
        assert_eq!(
            check_end_of_stream(&buf),
            Err(ProtocolError::Truncated {
                expected: 15,
                actual: 8
            })
        );

        let short = BytesMut::from(&[1u8, 0][..]);
        assert_eq!(
            check_end_of_stream(&short),
            Err(ProtocolError::Truncated {
                expected: FRAME_HEADER_SIZE,
                actual: 2
            })
        );
    }

    #[test]
    fn test_message_type_from_u8() {
        assert_eq!(ClientMessageType::from_u8(17).unwrap(), ClientMessageType::CrudFind);
        assert_eq!(ServerMessageType::from_u8(11).unwrap(), ServerMessageType::Notice);
        assert!(ServerMessageType::from_u8(15).is_err());
        assert!(ClientMessageType::from_u8(99).is_err());
    }
}
