//! A pluggable logging sink for the dispatcher's event surface.
//!
//! The rest of this codebase logs straight through the `log` facade's global
//! macros (`log::info!`, `log::warn!`, ...), which is fine for an
//! application's own modules. The dispatcher's `Config`, however, accepts an
//! optional per-instance logger, so callers embedding several independent
//! servers can tag or route their log lines separately. `Sink` is the small
//! capability that makes that possible; [`DefaultSink`] is the one that just
//! forwards to the `log` facade, matching the rest of the crate.

use log::Level;

/// Receives the dispatcher's structured log events.
pub trait Sink: Send + Sync {
    /// Record a single log line at the given level.
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Forwards every event to the global `log` facade, under the `"promux"`
/// target.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSink;

impl Sink for DefaultSink {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "promux", level, "{}", message);
    }
}
