//! Reading one response off the wire.
//!
//! A [`ResponseStream`] owns the session's link for as long as it lives.
//! It turns server frames into [`ResponseUnit`]s, folds notices into a side
//! collection and releases the link once the terminal status arrives.

use std::sync::Arc;

use mysqlx_protocol::{ProtocolError, ServerMessage, Severity};
use tokio::sync::OwnedMutexGuard;

use crate::error::{Error, Result};
use crate::notice::Notices;
use crate::row::Column;
use crate::session::{Link, SessionInner};

/// One unit of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseUnit {
    /// Metadata of a new result set, in declared column order.
    Columns(Vec<Column>),
    /// A raw row of the current result set.
    Row(mysqlx_protocol::Row),
    /// The current result set is complete.
    ResultSetDone {
        /// Another result set follows.
        more: bool,
    },
}

/// The response to one request.
///
/// While a stream is alive and not drained, the session rejects new
/// requests with [`Error::SessionBusy`]. Dropping a stream early is fine:
/// the next request reads and discards what is left.
pub struct ResponseStream {
    link: Option<OwnedMutexGuard<Link>>,
    session: Arc<SessionInner>,
    seq: u64,
    notices: Notices,
    stashed: Option<ServerMessage>,
}

impl ResponseStream {
    pub(crate) fn new(link: OwnedMutexGuard<Link>, session: Arc<SessionInner>, seq: u64) -> Self {
        Self {
            link: Some(link),
            session,
            seq,
            notices: Notices::default(),
            stashed: None,
        }
    }

    /// Sequence number of the request that produced this stream.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether the terminal status has been read.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.link.is_none() && self.stashed.is_none()
    }

    /// Notices collected so far.
    #[must_use]
    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Read the next unit.
    ///
    /// Returns `Ok(None)` once the terminal `Ok`/`StmtExecuteOk` has been
    /// read, and keeps doing so afterwards.
    pub async fn next_unit(&mut self) -> Result<Option<ResponseUnit>> {
        loop {
            let Some(message) = self.next_message().await? else {
                return Ok(None);
            };

            match message {
                ServerMessage::Notice(notice) => {
                    self.notices.record(notice);
                    if let Some(schema) = &self.notices.current_schema {
                        self.session.set_default_schema(Some(schema.clone()));
                    }
                }
                ServerMessage::ColumnMetaData(first) => {
                    let mut metadata = vec![first];
                    loop {
                        match self.next_message().await? {
                            Some(ServerMessage::ColumnMetaData(next)) => metadata.push(next),
                            Some(other) => {
                                self.stashed = Some(other);
                                break;
                            }
                            None => break,
                        }
                    }
                    let columns = metadata
                        .into_iter()
                        .enumerate()
                        .map(|(index, meta)| Column::new(index, meta))
                        .collect();
                    return Ok(Some(ResponseUnit::Columns(columns)));
                }
                ServerMessage::Row(row) => return Ok(Some(ResponseUnit::Row(row))),
                ServerMessage::FetchDone => {
                    return Ok(Some(ResponseUnit::ResultSetDone { more: false }));
                }
                ServerMessage::FetchDoneMoreResultsets => {
                    return Ok(Some(ResponseUnit::ResultSetDone { more: true }));
                }
                ServerMessage::Ok(_) | ServerMessage::StmtExecuteOk => {
                    tracing::trace!(seq = self.seq, "response complete");
                    self.release();
                    return Ok(None);
                }
                ServerMessage::Error(e) => {
                    self.release();
                    if e.severity == Severity::Fatal {
                        self.session.mark_broken();
                    }
                    return Err(Error::from(e));
                }
                other => {
                    let err = Error::Protocol(ProtocolError::UnexpectedMessage {
                        expected: "result set, notice or status",
                        received: other.name().to_string(),
                    });
                    return Err(self.break_link(err));
                }
            }
        }
    }

    /// Read and discard everything up to the terminal status.
    pub async fn drain(&mut self) -> Result<()> {
        while self.next_unit().await?.is_some() {}
        Ok(())
    }

    /// Drain and return the collected notices.
    pub async fn finish(mut self) -> Result<Notices> {
        self.drain().await?;
        Ok(std::mem::take(&mut self.notices))
    }

    async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        if let Some(message) = self.stashed.take() {
            return Ok(Some(message));
        }
        let Some(link) = self.link.as_mut() else {
            return Ok(None);
        };

        match link.conn.read_frame().await {
            Ok(Some(frame)) => {
                tracing::trace!(
                    message_type = frame.message_type,
                    length = frame.payload.len(),
                    "frame received"
                );
                match frame.into_server_message() {
                    Ok(message) => Ok(Some(message)),
                    Err(e) => Err(self.break_link(Error::Protocol(e))),
                }
            }
            Ok(None) => Err(self.break_link(Error::AmbiguousOutcome(
                "connection closed before the response completed".into(),
            ))),
            Err(e) => Err(self.break_link(Error::from(e))),
        }
    }

    fn release(&mut self) {
        self.link = None;
    }

    fn break_link(&mut self, err: Error) -> Error {
        tracing::debug!(seq = self.seq, error = %err, "response failed, session is unusable");
        self.session.mark_broken();
        self.stashed = None;
        self.link = None;
        err
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.pending = true;
        }
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("seq", &self.seq)
            .field("finished", &self.is_finished())
            .field("notices", &self.notices)
            .finish()
    }
}
