//! # Error Types for the Detection Dispatcher
//!
//! This module defines the error taxonomy returned from [`crate::Server::handle_conn`]
//! and [`crate::Server::serve`], modeled on the client error enum used throughout
//! this codebase: a single `thiserror`-derived type with a crate-local `Result`
//! alias, rather than threading raw `io::Error` or `String` through the dispatcher.
//!
//! ## Error Categories
//!
//! - **Greedy survivors**: matchers that collectively demand more header bytes
//!   than the server's configured budget allows.
//! - **I/O errors**: the underlying stream failing or closing mid-detection.
//! - **No match**: every matcher eliminated itself and no default protocol was
//!   configured to fall back to.
//! - **Handler failures**: the winning (or default) matcher's `handle` returning
//!   an error after it has already taken ownership of the connection.
//! - **Listener errors**: a [`crate::ChannelListener`] that has been closed.
//!
//! ## Usage
//!
//! ```rust
//! use promux::{Error, Result};
//!
//! fn describe(result: Result<()>) {
//!     match result {
//!         Ok(()) => {}
//!         Err(Error::GreedyHandler(needed, max)) => {
//!             eprintln!("survivors wanted {needed} bytes, budget is {max}");
//!         }
//!         Err(e) => eprintln!("detection failed: {e}"),
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Errors that can occur while detecting a connection's protocol and handing
/// it off to a matcher.
#[derive(Error, Debug)]
pub enum Error {
    /// Surviving matchers collectively demand more bytes than the server's
    /// configured `bytes_to_check` budget allows.
    ///
    /// Raised when [`crate::matcher::Matcher::probe`] on every remaining
    /// candidate reports `needed` greater than `bytes_to_check` before any of
    /// them reaches a definitive `match`/`reject`. The first field is the
    /// smallest `needed` among the survivors; the second is the configured
    /// budget they exceeded.
    #[error("next check requires {0} bytes but maximum is {1}")]
    GreedyHandler(usize, usize),

    /// The underlying stream failed, or closed, before detection could finish.
    ///
    /// Wraps the `io::Error` the dispatcher observed on its last read. If a
    /// default protocol is configured, it still receives the bytes read so
    /// far and this same error on its own first read, via the peek-buffered
    /// wrapper's deferred-error mechanism — this variant is only returned to
    /// the caller when there was no default to fall back to.
    #[error("I/O error during protocol detection: {0}")]
    Io(#[from] io::Error),

    /// Every matcher eliminated itself and no default protocol was configured.
    ///
    /// The connection is closed without ever reaching a handler.
    #[error("no matcher recognized the connection and no default protocol is configured")]
    NoMatch,

    /// The winning (or default) matcher's `handle` returned an error.
    ///
    /// Ownership of the connection had already transferred to `matcher` by
    /// this point, so the dispatcher does not attempt any recovery — it only
    /// logs the failure (tagged with `matcher`'s [`describe`](crate::Matcher::describe)
    /// label) and propagates it to the caller.
    #[error("handler {matcher} failed: {source}")]
    Handler {
        matcher: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A listener adapter was closed and can no longer accept or be pushed to.
    ///
    /// Returned from [`crate::ChannelListener::accept`] once the queue has
    /// drained after [`crate::ChannelListener::close`], and from
    /// [`crate::ChannelListener::push`] for any call made after `close`.
    #[error("listener closed")]
    ListenerClosed,
}

/// Result type for dispatcher and server operations.
///
/// This alias simplifies return types throughout the crate by providing a
/// standardized `Result` that uses [`Error`] as the error variant.
///
/// # Example
///
/// ```rust
/// use promux::Result;
///
/// fn example() -> Result<()> {
///     // ... dispatcher operations that can fail with `Error` ...
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
