//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing or parsing X Protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The byte stream ended before a full frame was available.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes needed to complete the frame.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// A length prefix exceeds the configured maximum frame size.
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Announced frame size including the header.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A length prefix too small to hold the message type byte.
    #[error("invalid frame length {0}")]
    InvalidLength(u32),

    /// A message payload ended before all of its fields were read.
    #[error("unexpected end of message payload")]
    UnexpectedEof,

    /// Unknown client message type identifier.
    #[error("invalid client message type: {0}")]
    InvalidClientMessageType(u8),

    /// Unknown server message type identifier.
    #[error("invalid server message type: {0}")]
    InvalidServerMessageType(u8),

    /// A well-formed message arrived in a state that does not accept it.
    #[error("unexpected {received} message, expected {expected}")]
    UnexpectedMessage {
        /// What the receiver was waiting for.
        expected: &'static str,
        /// Name of the message that arrived.
        received: String,
    },

    /// An enumerated field carried an unknown tag.
    #[error("invalid {field} tag: {value}")]
    InvalidTag {
        /// Field being decoded.
        field: &'static str,
        /// Offending value.
        value: u32,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A LEB128 varint ran past 64 bits.
    #[error("varint overflows 64 bits")]
    VarintOverflow,

    /// Expression or value nesting exceeded the decoder limit.
    #[error("nesting depth exceeds {0}")]
    NestingTooDeep(usize),

    /// A field key carried a wire type this protocol never uses.
    #[error("unsupported wire type {wire_type} for field {field}")]
    InvalidWireType {
        /// Field number from the key.
        field: u32,
        /// Wire type from the key.
        wire_type: u8,
    },

    /// A known field arrived with the wrong wire type.
    #[error("field {field} has wire type {actual}, expected {expected}")]
    WireTypeMismatch {
        /// Field number.
        field: u32,
        /// Wire type the schema declares.
        expected: u8,
        /// Wire type found on the wire.
        actual: u8,
    },

    /// A required message field was absent.
    #[error("missing required field {0}")]
    MissingField(&'static str),
}
