//! Opaque transport metadata carried alongside a connection across recursive
//! detection passes (e.g. the TLS connection state a post-handshake matcher
//! needs in order to check SNI or ALPN).
//!
//! The original source models hints as an untyped `[]interface{}` inspected
//! with a type assertion (`h, ok := h.(connectionStater)`). A statically typed
//! port can't do that safely, so hints here are a small capability-query
//! trait: any `Send + Sync + 'static` value can be stored as a hint, and
//! matchers that care about a particular kind of hint downcast to it.

use std::any::Any;
use std::sync::Arc;

/// A single opaque piece of transport metadata.
///
/// Handlers that unwrap a transport (TLS, a multiplexed tunnel, ...) append a
/// hint describing what they unwrapped; matchers on the inner detection pass
/// downcast to the concrete hint type they understand and ignore the rest.
pub trait Hint: Any + Send + Sync {
    /// Type-erased view used by [`downcast_ref`](dyn Hint::downcast_ref).
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> Hint for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Hint {
    /// Attempt to view this hint as a concrete type.
    pub fn downcast_ref<T: Hint + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// An ordered sequence of hints; the most recently appended entry is the
/// innermost transport.
pub type HintList = Vec<Arc<dyn Hint>>;
