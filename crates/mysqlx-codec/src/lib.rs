//! # mysqlx-codec
//!
//! Async framing layer for X Protocol messages.
//!
//! This crate turns a raw byte stream into whole frames and back, on top of
//! tokio-util's codec framework, and provides a split-IO [`Connection`]
//! used once a session is established.
//!
//! ## Architecture
//!
//! ```text
//! TCP/TLS stream → XCodec (frame boundaries) → Frame → ServerMessage → Session
//! ```
//!
//! Two wrappers are offered:
//!
//! - [`FrameStream`] is a combined `Stream + Sink` used during the handshake,
//!   where the transport must be taken back for the TLS upgrade.
//! - [`Connection`] splits the transport into read and write halves so an
//!   [`AbortHandle`] can tear the connection down from another task while a
//!   reader is parked on a long result set.
//!
//! ```rust,ignore
//! use mysqlx_codec::{Connection, FrameStream};
//!
//! let stream = FrameStream::new(tcp_stream);
//! // ... handshake ...
//! let mut conn = Connection::from_stream(stream);
//! let abort = conn.abort_handle();
//!
//! tokio::spawn(async move {
//!     abort.abort().await;
//! });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod frame_codec;
pub mod framed;

pub use connection::{AbortHandle, Connection};
pub use error::CodecError;
pub use frame_codec::{Frame, XCodec};
pub use framed::{FrameReader, FrameStream, FrameWriter};
