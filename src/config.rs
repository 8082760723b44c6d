//! Server configuration.
//!
//! A single plain record, built with a chain of `with_*` setters — the same
//! shape this codebase's own per-module configuration structs use for their
//! defaults, but local and explicit rather than backed by a global
//! configuration store: the core deliberately consumes no environment
//! variables or files.

use std::sync::Arc;

use crate::matcher::Matcher;
use crate::sink::{DefaultSink, Sink};

/// Hard upper bound on header-buffer growth during detection, unless
/// overridden.
pub const DEFAULT_BYTES_TO_CHECK: usize = 128;

/// Server-wide detection limits and optional collaborators.
#[derive(Clone)]
pub struct Config {
    /// Maximum number of bytes the header buffer may grow to during
    /// detection before surviving matchers are considered too greedy.
    pub bytes_to_check: usize,
    /// Matcher invoked when every registered matcher eliminates itself.
    pub default_protocol: Option<Arc<dyn Matcher>>,
    /// Sink for the dispatcher's structured log events.
    pub logger: Option<Arc<dyn Sink>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bytes_to_check: DEFAULT_BYTES_TO_CHECK,
            default_protocol: None,
            logger: None,
        }
    }
}

impl Config {
    /// A config with defaults: `bytes_to_check = 128`, no default protocol,
    /// no logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the header-buffer budget.
    pub fn with_bytes_to_check(mut self, bytes_to_check: usize) -> Self {
        self.bytes_to_check = bytes_to_check;
        self
    }

    /// Install a fallback matcher invoked when detection exhausts every
    /// candidate without a winner.
    pub fn with_default_protocol(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.default_protocol = Some(matcher);
        self
    }

    /// Install a structured log sink. Without one, dispatcher events are
    /// simply not logged — installing [`DefaultSink`] routes them through the
    /// global `log` facade.
    pub fn with_logger(mut self, logger: Arc<dyn Sink>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Convenience for `with_logger(Arc::new(DefaultSink))`.
    pub fn with_default_logger(self) -> Self {
        self.with_logger(Arc::new(DefaultSink))
    }
}
