//! Split I/O connection for abort safety.
//!
//! Once a session is established the transport is split into separate read
//! and write halves, so that another task can tear the connection down while
//! the owner is parked reading a long result set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify};

use crate::error::CodecError;
use crate::frame_codec::{Frame, XCodec};
use crate::framed::{FrameReader, FrameStream, FrameWriter};

/// An X Protocol connection with split I/O.
///
/// # Aborting
///
/// The protocol has no out-of-band cancel. The only way to stop a statement
/// whose results are still streaming is to close the transport. An
/// [`AbortHandle`] obtained from [`Connection::abort_handle`] does exactly
/// that and wakes any pending [`Connection::read_frame`], which then fails
/// with [`CodecError::Aborted`].
///
/// # Example
///
/// ```rust,ignore
/// use mysqlx_codec::Connection;
/// use tokio::net::TcpStream;
///
/// let stream = TcpStream::connect("localhost:33060").await?;
/// let mut conn = Connection::new(stream);
///
/// let abort = conn.abort_handle();
/// tokio::spawn(async move {
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     abort.abort().await;
/// });
/// ```
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Read half wrapped in a frame reader.
    reader: FrameReader<ReadHalf<T>>,
    /// Write half protected by mutex for concurrent abort access.
    writer: Arc<Mutex<FrameWriter<WriteHalf<T>>>>,
    /// Wakes a pending read when the connection is aborted.
    abort_notify: Arc<Notify>,
    /// Set once the connection has been aborted.
    aborted: Arc<AtomicBool>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new connection from a transport.
    ///
    /// The transport is immediately split into read and write halves.
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, XCodec::new())
    }

    /// Create a new connection with a custom codec.
    pub fn with_codec(transport: T, codec: XCodec) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            reader: FrameReader::with_codec(read_half, codec.clone()),
            writer: Arc::new(Mutex::new(FrameWriter::with_codec(write_half, codec))),
            abort_notify: Arc::new(Notify::new()),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a connection from a handshake stream.
    ///
    /// Bytes the handshake stream already buffered (for example a notice
    /// sent right after `AuthenticateOk`) are carried over to the new reader.
    pub fn from_stream(stream: FrameStream<T>) -> Self {
        let parts = stream.into_parts();
        if !parts.write_buf.is_empty() {
            tracing::debug!(
                pending = parts.write_buf.len(),
                "discarding unflushed handshake bytes"
            );
        }

        let mut conn = Self::with_codec(parts.io, parts.codec);
        conn.reader.read_buffer_mut().extend_from_slice(&parts.read_buf);
        conn
    }

    /// Get a handle that can abort this connection from another task.
    ///
    /// The handle can be cloned and sent to other tasks.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle<T> {
        AbortHandle {
            writer: Arc::clone(&self.writer),
            notify: Arc::clone(&self.abort_notify),
            aborted: Arc::clone(&self.aborted),
        }
    }

    /// Check if the connection has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Get a reference to the read codec.
    pub fn codec(&self) -> &XCodec {
        self.reader.codec()
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the next frame from the connection.
    ///
    /// Returns `Ok(None)` when the peer closed the stream on a frame
    /// boundary.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        let notified = self.abort_notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so an abort in between is seen.
        notified.as_mut().enable();

        if self.is_aborted() {
            return Err(CodecError::Aborted);
        }

        tokio::select! {
            biased;
            () = &mut notified => Err(CodecError::Aborted),
            frame = self.reader.next() => frame.transpose(),
        }
    }

    /// Send one frame and flush it.
    pub async fn send_frame(&mut self, frame: impl Into<Frame>) -> Result<(), CodecError> {
        if self.is_aborted() {
            return Err(CodecError::Aborted);
        }
        let mut writer = self.writer.lock().await;
        writer.send(frame.into()).await
    }

    /// Queue several frames and flush once.
    pub async fn send_frames<I>(&mut self, frames: I) -> Result<(), CodecError>
    where
        I: IntoIterator<Item = Frame>,
    {
        if self.is_aborted() {
            return Err(CodecError::Aborted);
        }
        let mut writer = self.writer.lock().await;
        for frame in frames {
            writer.feed(frame).await?;
        }
        writer.flush().await
    }

    /// Flush the write buffer.
    pub async fn flush(&mut self) -> Result<(), CodecError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await
    }

    /// Shut down the write side of the transport.
    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        let mut writer = self.writer.lock().await;
        writer.close().await
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

/// Handle for aborting a connection.
///
/// This can be cloned and sent to other tasks. Aborting is idempotent.
pub struct AbortHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    writer: Arc<Mutex<FrameWriter<WriteHalf<T>>>>,
    notify: Arc<Notify>,
    aborted: Arc<AtomicBool>,
}

impl<T> AbortHandle<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Mark the connection aborted, wake any pending read and close the
    /// write half.
    pub async fn abort(&self) {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("aborting X Protocol connection");
        self.notify.notify_waiters();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            tracing::debug!(error = %e, "error closing transport during abort");
        }
    }

    /// Check if the connection has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

impl<T> Clone for AbortHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            notify: Arc::clone(&self.notify),
            aborted: Arc::clone(&self.aborted),
        }
    }
}

impl<T> std::fmt::Debug for AbortHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.aborted.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
