//! Protocol-multiplexing detection dispatcher for one-port, many-services TCP
//! servers.
//!
//! Register a handful of [`Matcher`]s with a [`Server`], point it at a
//! listener, and each accepted connection is routed to whichever matcher
//! recognizes its opening bytes — HTTP, TLS, SSH, your own wire format,
//! whatever. The matcher that wins receives the connection exactly as if
//! detection never happened: every byte the dispatcher peeked at is replayed
//! first. A matcher that unwraps a transport (TLS terminating into
//! cleartext, say) can ask the dispatcher to recursively re-detect on what it
//! unwrapped.
//!
//! ```no_run
//! use std::sync::Arc;
//! use promux::{Config, Server};
//!
//! # async fn run(echo_matcher: Arc<dyn promux::Matcher>) -> promux::Result<()> {
//! let mut server = Server::with_config(Config::new().with_default_logger());
//! server.add_matcher(echo_matcher);
//!
//! let listener = Arc::new(tokio::net::TcpListener::bind("0.0.0.0:8080").await?);
//! Arc::new(server).serve(listener).await
//! # }
//! ```

mod config;
mod conn;
mod dispatch;
mod error;
mod hints;
mod listener;
mod matcher;
mod server;
mod sink;
mod stream;

pub use config::{Config, DEFAULT_BYTES_TO_CHECK};
pub use conn::{HintedStream, PeekStream};
pub use error::{Error, Result};
pub use hints::{Hint, HintList};
pub use listener::ChannelListener;
pub use matcher::{Matcher, Probe, Verdict};
pub use server::{Listener, Server};
pub use sink::{DefaultSink, Sink};
pub use stream::{BoxedStream, IoStream};
