//! The connection abstraction every matcher and wrapper in this crate speaks.
//!
//! A detection pass may hand a matcher a raw `TcpStream`, a peek-buffered
//! wrapper replaying looked-ahead bytes, or a transport a handler unwrapped
//! (e.g. a decrypted TLS stream). All of these need to be interchangeable
//! behind a single type so the dispatcher can box and re-box them across
//! recursive passes; `IoStream` is that common seam.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::hints::Hint;

/// A bidirectional byte stream that can optionally expose the hints it
/// carries (see [`crate::hints`]).
///
/// The default `hints` implementation returns `None`, meaning "no opinion" —
/// the dispatcher inherits whatever hint list it already had. Wrappers that
/// *do* carry hints (see [`crate::conn::HintedStream`]) override it.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// The hints this stream carries, if any.
    fn hints(&self) -> Option<&[Arc<dyn Hint>]> {
        None
    }
}

/// A type-erased, boxed connection. This is the type matchers and the
/// dispatcher actually pass around.
pub type BoxedStream = Box<dyn IoStream>;

impl IoStream for TcpStream {}

impl IoStream for Box<dyn IoStream> {
    fn hints(&self) -> Option<&[Arc<dyn Hint>]> {
        (**self).hints()
    }
}

// `tokio::io::duplex` is the usual stand-in for a socket in tests (both unit
// tests in this crate and integration tests in `tests/`), so it gets the same
// treatment as `TcpStream` rather than being gated behind `cfg(test)`.
impl IoStream for tokio::io::DuplexStream {}
