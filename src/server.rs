//! The server facade: matcher registry, accept loop, dispatch entry point.
//!
//! Grounded on `router-core`'s own TCP server driver — register collaborators
//! up front, prepare them once, then spawn one task per accepted connection —
//! generalized so the "collaborator" is a protocol [`Matcher`] instead of a
//! fixed service, and "prepare" is the canonical matcher ordering described
//! in the original source's `Serve`.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::config::Config;
use crate::dispatch::{dispatch, DispatchContext};
use crate::error::Result;
use crate::hints::HintList;
use crate::matcher::Matcher;
use crate::sink::Sink;
use crate::stream::BoxedStream;

/// A passive source of already-connected streams. Implemented by
/// [`tokio::net::TcpListener`] and by [`crate::listener::ChannelListener`].
#[async_trait]
pub trait Listener: Send + Sync {
    async fn accept(&self) -> Result<BoxedStream>;
}

#[async_trait]
impl Listener for tokio::net::TcpListener {
    async fn accept(&self) -> Result<BoxedStream> {
        let (stream, _addr) = tokio::net::TcpListener::accept(self).await?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl Listener for crate::listener::ChannelListener {
    async fn accept(&self) -> Result<BoxedStream> {
        crate::listener::ChannelListener::accept(self).await
    }
}

/// Holds the registered matchers and server-wide limits, and drives both the
/// accept loop and the recursive detection entry point.
///
/// Matchers are added with [`Server::add_matcher`]/[`Server::add_matchers`]
/// before the server starts serving. The first call that needs the canonical
/// ordering (sorted ascending by each matcher's minimum byte requirement,
/// with insertion order as a tie-break) computes and caches it; after that,
/// the matcher list is read-only and safe to share across every detection
/// task.
pub struct Server {
    matchers: Vec<Arc<dyn Matcher>>,
    config: Config,
    prepared: OnceLock<Arc<DispatchContext>>,
}

impl Server {
    /// A server with defaults: `bytes_to_check = 128`, no logger, no default
    /// protocol.
    pub fn new() -> Self {
        Self::with_config(Config::new())
    }

    pub fn with_config(config: Config) -> Self {
        Server {
            matchers: Vec::new(),
            config,
            prepared: OnceLock::new(),
        }
    }

    /// Register a matcher. Must be called before the canonical order is
    /// computed — i.e. before the first [`Server::serve`] or
    /// [`Server::handle_conn`] call.
    pub fn add_matcher(&mut self, matcher: Arc<dyn Matcher>) {
        self.matchers.push(matcher);
    }

    pub fn add_matchers(&mut self, matchers: impl IntoIterator<Item = Arc<dyn Matcher>>) {
        self.matchers.extend(matchers);
    }

    fn context(&self) -> Arc<DispatchContext> {
        self.prepared
            .get_or_init(|| {
                let mut ordered = self.matchers.clone();
                ordered.sort_by_key(|m| m.probe(&[], &[]).needed);
                // A matcher may legitimately report `needed = 0` on the empty
                // probe (e.g. a zero-byte matcher that always matches); the
                // `while header.len() < target` guard in `detect_once` turns
                // `target = 0` into a no-op read, so there's no need to force
                // a floor of one byte here.
                let minimum_read = ordered.first().map(|m| m.probe(&[], &[]).needed).unwrap_or(0);
                if let Some(logger) = &self.config.logger {
                    logger.info(&format!("sorted {} matchers", ordered.len()));
                }
                Arc::new(DispatchContext {
                    matchers: ordered,
                    minimum_read,
                    bytes_to_check: self.config.bytes_to_check,
                    default_protocol: self.config.default_protocol.clone(),
                    logger: self.config.logger.clone(),
                })
            })
            .clone()
    }

    /// Run detection on an already-accepted connection. Re-entrant: a
    /// handler that unwraps a transport (TLS, say) may call this again on
    /// the decrypted stream, which is exactly what [`crate::dispatch`] does
    /// internally when a matcher's `handle` returns a transport stream.
    pub async fn handle_conn(&self, stream: BoxedStream, hints: HintList) -> Result<()> {
        dispatch(self.context(), stream, hints, false).await
    }

    /// Run the accept loop: prepares the matcher list once, then spawns a
    /// detection task per accepted connection. Returns once `listener`
    /// yields a fatal accept error.
    pub async fn serve<L: Listener + Send + Sync + 'static>(
        self: Arc<Self>,
        listener: Arc<L>,
    ) -> Result<()> {
        let ctx = self.context();
        loop {
            let stream = listener.accept().await?;
            let ctx = ctx.clone();
            tokio::spawn(async move {
                if let Err(err) = dispatch(ctx, stream, HintList::new(), false).await {
                    log::warn!(target: "promux", "connection dispatch failed: {err}");
                }
            });
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
