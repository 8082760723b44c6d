use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::stream::IoStream;

/// A stream that replays an already-consumed prefix before falling through to
/// the underlying connection.
///
/// This is the abstraction that makes detection transparent to handlers: the
/// dispatcher reads a header prefix to figure out which matcher should own
/// the connection, then wraps the raw stream in a `PeekStream` so the winning
/// handler's first reads see exactly the bytes the dispatcher already
/// consumed, in order, before anything else.
///
/// A read-side error observed during detection (e.g. the peer closed the
/// connection right after sending a short header) can be carried along too,
/// so it is still delivered to the handler instead of silently vanishing.
/// Rust's `AsyncRead` can't return both buffered bytes and an error from the
/// same `poll_read` call the way Go's `io.Reader` can, so the stored error is
/// instead surfaced on the read immediately following the one that drains the
/// prefix — the same "bytes, then error" order, just split across two polls
/// rather than coexisting in one.
pub struct PeekStream<S> {
    inner: S,
    prefix: Vec<u8>,
    pos: usize,
    stored_err: Option<io::Error>,
}

impl<S> PeekStream<S> {
    /// Wrap `inner`, replaying `prefix` before falling through to it. If
    /// `stored_err` is set, it is returned (once) on the first read after the
    /// prefix is drained — even if `prefix` is empty, in which case it
    /// surfaces immediately.
    pub fn new(inner: S, prefix: Vec<u8>, stored_err: Option<io::Error>) -> Self {
        PeekStream {
            inner,
            prefix,
            pos: 0,
            stored_err,
        }
    }

    fn remaining(&self) -> usize {
        self.prefix.len() - self.pos
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PeekStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.remaining() > 0 {
            let n = std::cmp::min(buf.remaining(), this.remaining());
            buf.put_slice(&this.prefix[this.pos..this.pos + n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }

        if let Some(err) = this.stored_err.take() {
            return Poll::Ready(Err(err));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PeekStream<S> {
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

impl<S: AsyncRead + AsyncWrite + Unpin + Send> IoStream for PeekStream<S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn replays_prefix_before_inner() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"world").await.unwrap();
        drop(client);

        let mut peek = PeekStream::new(server, b"hello ".to_vec(), None);
        let mut out = Vec::new();
        peek.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn stored_error_surfaces_after_prefix_drains() {
        let (_client, server) = tokio::io::duplex(64);
        let err = io::Error::new(io::ErrorKind::Other, "boom");
        let mut peek = PeekStream::new(server, b"hi".to_vec(), Some(err));

        let mut buf = [0u8; 2];
        let n = peek.read(&mut buf).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf, b"hi");

        let mut buf2 = [0u8; 1];
        let result = peek.read(&mut buf2).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[tokio::test]
    async fn empty_prefix_with_stored_error_surfaces_immediately() {
        let (_client, server) = tokio::io::duplex(64);
        let err = io::Error::new(io::ErrorKind::Other, "boom");
        let mut peek = PeekStream::new(server, Vec::new(), Some(err));

        let mut buf = [0u8; 4];
        let result = peek.read(&mut buf).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn writes_pass_through_to_inner() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut peek = PeekStream::new(server, Vec::new(), None);

        peek.write_all(b"ping").await.unwrap();
        peek.flush().await.unwrap();

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn short_reads_drain_prefix_incrementally() {
        let (_client, server) = tokio::io::duplex(64);
        let mut peek = PeekStream::new(server, b"abcdef".to_vec(), None);

        let mut buf = [0u8; 4];
        let n = peek.read(&mut buf).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"abcd");

        let mut buf2 = [0u8; 4];
        let n2 = peek.read(&mut buf2).await.unwrap();
        assert_eq!(n2, 2);
        assert_eq!(&buf2[..2], b"ef");
    }
}
