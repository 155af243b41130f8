//! # mysqlx-protocol
//!
//! Pure implementation of the X Protocol wire model spoken by document/table
//! database servers on port 33060.
//!
//! This crate describes frames, message type identifiers and the protobuf
//! encoding of every message the client and server exchange: capability
//! negotiation, SASL-style authentication, CRUD requests, raw statement
//! execution, notices and result sets. It also owns the protocol expression
//! tree that CRUD requests carry as criteria, projections and orderings.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic and
//! makes no assumptions about the async runtime. `mysqlx-codec` adds async
//! framing on top of it and `mysqlx-client` drives the conversation.
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use mysqlx_protocol::frame::{decode_frame, encode_frame, DEFAULT_MAX_FRAME_SIZE};
//!
//! let mut buf = BytesMut::new();
//! encode_frame(1, b"", &mut buf);
//!
//! let (message_type, payload) = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(message_type, 1);
//! assert!(payload.is_empty());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod capabilities;
pub mod codec;
pub mod crud;
pub mod error;
pub mod expr;
pub mod frame;
pub mod message;
pub mod notice;
pub mod resultset;
pub mod scalar;
pub mod session;
pub mod sql;

pub use capabilities::{Capabilities, CapabilitiesSet, Capability};
pub use crud::{
    Collection, DataModel, Delete, Find, Insert, Limit, Order, OrderDirection, Projection,
    Update, UpdateOperation, UpdateType,
};
pub use error::ProtocolError;
pub use expr::{ColumnIdentifier, DocumentPathItem, Expr, FunctionCall, Identifier, Operator};
pub use frame::{
    ClientMessageType, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, FrameHeader, ServerMessageType,
};
pub use message::{ClientMessage, ServerMessage};
pub use notice::{Notice, NoticeKind, NoticeScope, SessionStateParam, Warning, WarningLevel};
pub use resultset::{ColumnFlags, ColumnMetaData, ColumnType, ContentType, Row};
pub use scalar::{Any, ObjectField, Scalar};
pub use session::{
    AuthenticateContinue, AuthenticateOk, AuthenticateStart, ServerError, ServerOk, SessionReset,
    Severity,
};
pub use sql::StmtExecute;
