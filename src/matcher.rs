//! The pluggable detection+dispatch contract every protocol plugin satisfies.
//!
//! Concrete protocol handlers (HTTP, TLS, SSH, ...) are external collaborators
//! of this crate: this module only describes the interface the dispatcher
//! consumes from them, matching the `ServiceProtocol` trait this codebase
//! already uses to describe pluggable request handlers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::hints::Hint;
use crate::stream::BoxedStream;

/// The outcome of asking a matcher whether a header matches its protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The header (and hints) are recognized; this matcher wins.
    Match,
    /// The header can never match this protocol, regardless of how many more
    /// bytes arrive.
    Reject,
    /// Not enough evidence yet; ask again once `needed` bytes are available.
    Undecided,
}

/// The result of [`Matcher::probe`].
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub verdict: Verdict,
    /// `0` if `verdict` is definitive (`Match`, or a `Reject` that will never
    /// be reconsidered). Otherwise the minimum total header length at which
    /// this matcher would next change its answer.
    pub needed: usize,
}

impl Probe {
    /// This matcher recognizes the connection.
    pub fn matched() -> Self {
        Probe {
            verdict: Verdict::Match,
            needed: 0,
        }
    }

    /// This matcher will never recognize the connection; don't ask again.
    pub fn reject() -> Self {
        Probe {
            verdict: Verdict::Reject,
            needed: 0,
        }
    }

    /// Not enough data yet; re-probe once the header reaches `needed` bytes.
    pub fn undecided(needed: usize) -> Self {
        Probe {
            verdict: Verdict::Undecided,
            needed,
        }
    }
}

/// A pluggable protocol detector and handler.
///
/// Implementations must be pure with respect to `probe`'s inputs: calling it
/// twice with an identical `(header, hints)` pair must yield identical
/// results, since the dispatcher may re-probe surviving matchers on every
/// growth of the header.
#[async_trait]
pub trait Matcher: Send + Sync {
    /// Human-readable label for logs.
    fn describe(&self) -> &str;

    /// Inspect the header accumulated so far (and any transport hints) and
    /// report whether this matcher recognizes the connection.
    ///
    /// Probing the empty header (`header = &[], hints = &[]`) must be
    /// well-defined and return this matcher's minimum byte budget as
    /// `needed` — the dispatcher uses that value to compute the first read
    /// size for every connection.
    fn probe(&self, header: &[u8], hints: &[Arc<dyn Hint>]) -> Probe;

    /// Take ownership of the connection. `stream` transparently replays the
    /// bytes the dispatcher consumed while detecting the protocol.
    ///
    /// Returning `Ok(Some(transport))` asks the dispatcher to recursively
    /// re-run detection on `transport` (used by tunneling protocols such as
    /// TLS, which decrypt and want the dispatcher to pick the inner
    /// protocol). Returning `Ok(None)` means this matcher has taken full
    /// ownership of the connection and the dispatcher should simply return.
    async fn handle(
        &self,
        stream: BoxedStream,
    ) -> std::result::Result<Option<BoxedStream>, Box<dyn std::error::Error + Send + Sync>>;
}
