//! The response writer contract.
//!
//! A [`ResponseWriter`] is the outbound half of a request: a header map,
//! a one-shot status line and a byte sink. Decorators such as gzip or the
//! access logger implement the same trait around an inner writer and are
//! swapped into the [`Context`](crate::Context) by middleware.
//!
//! Optional capabilities are exposed through [`ResponseWriter::flusher`]
//! and [`ResponseWriter::hijacker`]. A writer that lacks one returns
//! `None`; a decorator that cannot forward one reports
//! [`Error::UnsupportedOperation`].

use std::any::Any;
use std::io;

use futures_util::future::BoxFuture;
use http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

/// Upcasting helper so decorators can be recovered from a boxed writer.
pub trait IntoAny: Any {
    /// Converts a boxed value into `Box<dyn Any>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    /// Borrows the value as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> IntoAny for T {
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Writer capability: push buffered bytes to the client now.
pub trait Flush {
    /// Flushes everything written so far.
    fn flush(&mut self) -> Result<()>;
}

/// A raw bidirectional connection handed out by [`Hijack`].
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// Future resolving to the raw connection once the switch is complete.
pub type Hijacked = BoxFuture<'static, io::Result<Box<dyn Connection>>>;

/// Writer capability: take over the underlying connection.
pub trait Hijack {
    /// Requests the connection. The returned future resolves after the
    /// response head has been sent.
    fn hijack(&mut self) -> Result<Hijacked>;
}

/// The outbound side of a request.
///
/// Semantics follow the usual HTTP writer conventions:
///
/// - headers may be edited until the status is written
/// - [`write_header`](Self::write_header) takes effect once; later calls
///   are ignored
/// - [`write`](Self::write) sends an implicit `200 OK` first if no status
///   was written
pub trait ResponseWriter: IntoAny + Send {
    /// Headers to be sent with the response.
    fn headers(&self) -> &HeaderMap;

    /// Mutable access to the pending headers.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and headers.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Writes the whole buffer.
    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(Error::Io(io::ErrorKind::WriteZero.into()));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Returns the flush capability, if supported.
    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        None
    }

    /// Returns the hijack capability, if supported.
    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        None
    }
}

impl std::fmt::Debug for dyn ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("headers", self.headers())
            .finish_non_exhaustive()
    }
}

/// Flushes `writer`, failing if it cannot.
pub fn flush(writer: &mut dyn ResponseWriter) -> Result<()> {
    writer
        .flusher()
        .ok_or_else(|| Error::unsupported("flush"))?
        .flush()
}

/// Hijacks `writer`, failing if it cannot.
pub fn hijack(writer: &mut dyn ResponseWriter) -> Result<Hijacked> {
    writer
        .hijacker()
        .ok_or_else(|| Error::unsupported("hijack"))?
        .hijack()
}

/// Placeholder writer held by a [`Context`](crate::Context) that is not
/// serving a request. Every body write fails.
#[derive(Debug, Default)]
pub struct Detached {
    headers: HeaderMap,
}

impl ResponseWriter for Detached {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        tracing::debug!(%status, "status written to a detached context");
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            "context is not attached to a response",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_rejects_writes() {
        let mut writer = Detached::default();
        let err = writer.write_all(b"hello").unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::NotConnected));
    }

    #[test]
    fn test_missing_capabilities_are_unsupported() {
        let mut writer = Detached::default();
        assert!(matches!(
            flush(&mut writer),
            Err(Error::UnsupportedOperation { operation: "flush" })
        ));
        assert!(matches!(
            hijack(&mut writer),
            Err(Error::UnsupportedOperation { operation: "hijack" })
        ));
    }

    #[test]
    fn test_boxed_writer_downcasts() {
        let boxed: Box<dyn ResponseWriter> = Box::new(Detached::default());
        assert!((*boxed).as_any().is::<Detached>());
        assert!(boxed.into_any().downcast::<Detached>().is_ok());
    }
}
