use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::hints::{Hint, HintList};
use crate::stream::IoStream;

/// Attaches a hint list to a stream.
///
/// Handlers that unwrap a transport (TLS, a tunnel, ...) wrap their decrypted
/// stream in a `HintedStream` before returning it from [`crate::Matcher::handle`],
/// appending their own state to the hint list. The dispatcher then adopts the
/// returned stream's hints for the recursive detection pass it runs on the
/// inner transport; if the returned stream doesn't expose hints, the
/// dispatcher inherits the hints it already had instead.
pub struct HintedStream<S> {
    inner: S,
    hints: HintList,
}

impl<S> HintedStream<S> {
    pub fn new(inner: S, hints: HintList) -> Self {
        HintedStream { inner, hints }
    }

    /// Append a single hint to this stream's list, returning the updated
    /// wrapper. Convenient for a handler that owns exactly one piece of
    /// transport state to contribute.
    pub fn with_hint(mut self, hint: Arc<dyn Hint>) -> Self {
        self.hints.push(hint);
        self
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for HintedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for HintedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> IoStream for HintedStream<S> {
    fn hints(&self) -> Option<&[Arc<dyn Hint>]> {
        Some(&self.hints)
    }
}
