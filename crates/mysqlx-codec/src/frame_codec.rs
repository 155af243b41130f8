//! X Protocol frame codec implementation.

use bytes::{Bytes, BytesMut};
use mysqlx_protocol::frame::{
    DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, FrameHeader, MIN_MAX_FRAME_SIZE,
    check_end_of_stream, decode_frame,
};
use mysqlx_protocol::{ClientMessage, ProtocolError, ServerMessage};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// One frame: a message type byte and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw message type.
    pub message_type: u8,
    /// Payload (excluding header).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(message_type: u8, payload: Bytes) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    /// Total frame size on the wire.
    #[must_use]
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Decode the payload as a message sent by a server.
    pub fn into_server_message(self) -> Result<ServerMessage, ProtocolError> {
        let mut payload = self.payload;
        ServerMessage::decode(self.message_type, &mut payload)
    }

    /// Decode the payload as a message sent by a client.
    pub fn into_client_message(self) -> Result<ClientMessage, ProtocolError> {
        let mut payload = self.payload;
        ClientMessage::decode(self.message_type, &mut payload)
    }
}

impl From<&ClientMessage> for Frame {
    fn from(msg: &ClientMessage) -> Self {
        let mut payload = BytesMut::new();
        msg.encode_payload(&mut payload);
        Self::new(msg.message_type() as u8, payload.freeze())
    }
}

impl From<&ServerMessage> for Frame {
    fn from(msg: &ServerMessage) -> Self {
        let mut payload = BytesMut::new();
        msg.encode_payload(&mut payload);
        Self::new(msg.message_type() as u8, payload.freeze())
    }
}

/// X Protocol codec for tokio-util framing.
///
/// Splits a byte stream at frame boundaries and refuses frames above a
/// configurable maximum size.
#[derive(Debug, Clone)]
pub struct XCodec {
    /// Maximum frame size to accept or emit, header included.
    max_frame_size: usize,
}

impl XCodec {
    /// Create a new codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a new codec with a custom maximum frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(MIN_MAX_FRAME_SIZE);
        self
    }

    /// The configured maximum frame size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for XCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for XCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((message_type, payload)) = decode_frame(src, self.max_frame_size)? else {
            return Ok(None);
        };

        tracing::trace!(
            message_type = message_type,
            length = payload.len(),
            "decoded X frame"
        );

        Ok(Some(Frame::new(message_type, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        check_end_of_stream(src)?;
        Ok(None)
    }
}

impl Encoder<Frame> for XCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = item.total_size();
        if total_length > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: total_length,
                max: self.max_frame_size,
            }
            .into());
        }

        dst.reserve(total_length);
        FrameHeader::new(item.message_type, item.payload.len()).encode(dst);
        dst.extend_from_slice(&item.payload);

        tracing::trace!(
            message_type = item.message_type,
            length = total_length,
            "encoded X frame"
        );

        Ok(())
    }
}
