//! Framed streams for async I/O.
//!
//! This module provides both combined and split stream types:
//! - `FrameStream<T>` - Combined read/write stream, used during the handshake
//! - `FrameReader<T>` - Read-only stream for receiving frames
//! - `FrameWriter<T>` - Write-only sink for sending frames
//!
//! The split types are used by `Connection` so that the write side can be
//! shut down while a read is pending.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use futures_core::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, FramedParts, FramedRead, FramedWrite};

use crate::error::CodecError;
use crate::frame_codec::{Frame, XCodec};

pin_project! {
    /// A framed stream over an async I/O transport.
    ///
    /// This wraps a tokio-util `Framed` codec and provides a higher-level
    /// interface for sending and receiving X Protocol frames.
    pub struct FrameStream<T> {
        #[pin]
        inner: Framed<T, XCodec>,
    }
}

impl<T> FrameStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new frame stream over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Framed::new(transport, XCodec::new()),
        }
    }

    /// Create a new frame stream with a custom codec.
    pub fn with_codec(transport: T, codec: XCodec) -> Self {
        Self {
            inner: Framed::new(transport, codec),
        }
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Get a mutable reference to the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &XCodec {
        self.inner.codec()
    }

    /// Consume the stream and return the underlying transport.
    ///
    /// Bytes already buffered for reading are discarded; only call this at a
    /// point where the peer is waiting for us (for example before a TLS
    /// handshake).
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Consume the stream and return transport, codec and buffers.
    pub fn into_parts(self) -> FramedParts<T, XCodec> {
        self.inner.into_parts()
    }

    /// Get a reference to the read buffer.
    pub fn read_buffer(&self) -> &BytesMut {
        self.inner.read_buffer()
    }
}

impl<T> FrameStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send one frame and flush.
    pub async fn send_frame(&mut self, frame: impl Into<Frame>) -> Result<(), CodecError> {
        self.send(frame.into()).await
    }

    /// Read the next frame; `None` on a clean end of stream.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        self.next().await.transpose()
    }
}

impl<T> Stream for FrameStream<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Frame, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> Sink<Frame> for FrameStream<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

impl<T> std::fmt::Debug for FrameStream<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}

// =============================================================================
// Split stream types
// =============================================================================

pin_project! {
    /// A read-only stream of X Protocol frames.
    pub struct FrameReader<T> {
        #[pin]
        inner: FramedRead<T, XCodec>,
    }
}

impl<T> FrameReader<T>
where
    T: AsyncRead,
{
    /// Create a new frame reader over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: FramedRead::new(transport, XCodec::new()),
        }
    }

    /// Create a new frame reader with a custom codec.
    pub fn with_codec(transport: T, codec: XCodec) -> Self {
        Self {
            inner: FramedRead::new(transport, codec),
        }
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &XCodec {
        self.inner.decoder()
    }

    /// Get a mutable reference to the read buffer.
    pub fn read_buffer_mut(&mut self) -> &mut BytesMut {
        self.inner.read_buffer_mut()
    }
}

impl<T> Stream for FrameReader<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Frame, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> std::fmt::Debug for FrameReader<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}

pin_project! {
    /// A write-only sink of X Protocol frames.
    pub struct FrameWriter<T> {
        #[pin]
        inner: FramedWrite<T, XCodec>,
    }
}

impl<T> FrameWriter<T>
where
    T: AsyncWrite,
{
    /// Create a new frame writer over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: FramedWrite::new(transport, XCodec::new()),
        }
    }

    /// Create a new frame writer with a custom codec.
    pub fn with_codec(transport: T, codec: XCodec) -> Self {
        Self {
            inner: FramedWrite::new(transport, codec),
        }
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &XCodec {
        self.inner.encoder()
    }
}

impl<T> Sink<Frame> for FrameWriter<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

impl<T> std::fmt::Debug for FrameWriter<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}
