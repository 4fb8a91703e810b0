//! Response writer that streams into a hyper response.
//!
//! The dispatch chain runs on a blocking thread. The writer sends the
//! response head over a oneshot channel the first time the response is
//! committed and forwards every body chunk over a bounded channel that
//! feeds the hyper body stream, so slow clients apply backpressure to the
//! handler.

use std::io;

use bytes::Bytes;
use harmony_core::writer::{Connection, Flush, Hijack, Hijacked, ResponseWriter};
use harmony_core::{Error, Result};
use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::sync::{mpsc, oneshot};

/// Body chunks in flight between the handler thread and hyper.
pub(crate) const BODY_CHANNEL_CAPACITY: usize = 16;

/// Item carried by the body channel.
pub(crate) type Chunk = io::Result<Bytes>;

/// Status line and headers of a committed response.
#[derive(Debug)]
pub(crate) struct Head {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
}

/// [`ResponseWriter`] bound to one hyper request.
///
/// Supports [`Flush`], which commits the head so the client sees it
/// before the body is complete, and [`Hijack`], which answers `101
/// Switching Protocols` and hands the upgraded connection to the handler.
pub struct HyperResponseWriter {
    headers: HeaderMap,
    head: Option<oneshot::Sender<Head>>,
    body: Option<mpsc::Sender<Chunk>>,
    upgrade: Option<OnUpgrade>,
    committed: bool,
    hijacked: bool,
}

impl HyperResponseWriter {
    pub(crate) fn new(
        head: oneshot::Sender<Head>,
        body: mpsc::Sender<Chunk>,
        upgrade: Option<OnUpgrade>,
    ) -> Self {
        Self {
            headers: HeaderMap::new(),
            head: Some(head),
            body: Some(body),
            upgrade,
            committed: false,
            hijacked: false,
        }
    }

    /// Whether the head has been sent.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn commit(&mut self, status: StatusCode) {
        if self.committed {
            return;
        }
        self.committed = true;
        if let Some(tx) = self.head.take() {
            let head = Head {
                status,
                headers: self.headers.clone(),
            };
            if tx.send(head).is_err() {
                tracing::debug!(%status, "response head dropped, request already answered");
            }
        }
    }
}

impl ResponseWriter for HyperResponseWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.committed {
            tracing::debug!(%status, "superfluous write_header call ignored");
            return;
        }
        self.commit(status);
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.hijacked {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection has been hijacked",
            )));
        }
        self.commit(StatusCode::OK);
        if buf.is_empty() {
            return Ok(0);
        }

        let tx = self.body.as_ref().ok_or_else(closed)?;
        tx.blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| closed())?;
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        Some(self)
    }
}

impl Flush for HyperResponseWriter {
    fn flush(&mut self) -> Result<()> {
        // Chunks are handed to hyper as they are written; only the head
        // can be pending.
        self.commit(StatusCode::OK);
        Ok(())
    }
}

impl Hijack for HyperResponseWriter {
    fn hijack(&mut self) -> Result<Hijacked> {
        if self.hijacked {
            return Err(Error::internal("connection already hijacked"));
        }
        if self.committed {
            return Err(Error::internal(
                "cannot hijack after the response was committed",
            ));
        }
        let upgrade = self
            .upgrade
            .take()
            .ok_or_else(|| Error::unsupported("hijack"))?;

        self.commit(StatusCode::SWITCHING_PROTOCOLS);
        self.hijacked = true;
        self.body = None;

        Ok(Box::pin(async move {
            let upgraded = upgrade.await.map_err(io::Error::other)?;
            Ok::<_, io::Error>(Box::new(TokioIo::new(upgraded)) as Box<dyn Connection>)
        }))
    }
}

impl Drop for HyperResponseWriter {
    fn drop(&mut self) {
        if self.hijacked {
            return;
        }
        if std::thread::panicking() {
            // An uncommitted head is answered with 500 by the server; a
            // committed one has its body aborted.
            if let Some(tx) = self.body.take() {
                let _ = tx.try_send(Err(io::Error::other("handler panicked")));
            }
            return;
        }
        self.commit(StatusCode::OK);
    }
}

fn closed() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "client connection closed",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> (
        HyperResponseWriter,
        oneshot::Receiver<Head>,
        mpsc::Receiver<Chunk>,
    ) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        (HyperResponseWriter::new(head_tx, body_tx, None), head_rx, body_rx)
    }

    #[test]
    fn test_first_write_commits_ok() {
        let (mut w, mut head_rx, mut body_rx) = writer();
        w.headers_mut()
            .insert(http::header::CONTENT_TYPE, "text/plain".parse().unwrap());
        w.write_all(b"hello").unwrap();
        assert!(w.is_committed());

        let head = head_rx.try_recv().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers[http::header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_rx.try_recv().unwrap().unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_status_is_sent_once() {
        let (mut w, mut head_rx, _body_rx) = writer();
        w.write_header(StatusCode::CREATED);
        w.write_header(StatusCode::NOT_FOUND);
        assert_eq!(head_rx.try_recv().unwrap().status, StatusCode::CREATED);
    }

    #[test]
    fn test_drop_commits_default_status() {
        let (w, mut head_rx, mut body_rx) = writer();
        drop(w);
        assert_eq!(head_rx.try_recv().unwrap().status, StatusCode::OK);
        assert!(matches!(
            body_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_flush_commits_head() {
        let (mut w, mut head_rx, _body_rx) = writer();
        harmony_core::writer::flush(&mut w).unwrap();
        assert_eq!(head_rx.try_recv().unwrap().status, StatusCode::OK);
    }

    #[test]
    fn test_write_after_client_gone() {
        let (mut w, _head_rx, body_rx) = writer();
        drop(body_rx);
        let err = w.write(b"late").unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn test_hijack_without_upgrade_is_unsupported() {
        let (mut w, _head_rx, _body_rx) = writer();
        assert!(matches!(
            harmony_core::writer::hijack(&mut w),
            Err(Error::UnsupportedOperation { operation: "hijack" })
        ));
    }

    #[test]
    fn test_hijack_after_commit_fails() {
        let (mut w, _head_rx, _body_rx) = writer();
        w.write_header(StatusCode::OK);
        assert!(matches!(
            harmony_core::writer::hijack(&mut w),
            Err(Error::Internal { .. })
        ));
    }
}
