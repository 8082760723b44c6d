//! Connection wrappers the dispatcher hands to matchers.
//!
//! `peek` replays the bytes the dispatcher looked ahead at, transparently, so
//! a handler can never tell detection happened. `hinted` attaches the current
//! hint list to whatever it wraps. The dispatcher composes both at handoff
//! time: `HintedStream::new(PeekStream::new(raw, header, deferred_err), hints)`.

mod hinted;
mod peek;

pub use hinted::HintedStream;
pub use peek::PeekStream;
