//! Cooperative cancellation primitives.
//!
//! A [`CancelSource`] is the owner side: the engine holds one source for
//! command execution and a separate one per rewind. A [`CancelToken`] is
//! the observer side handed to commands; it can link several sources so
//! that a command aborts when *any* of them fires. Cancellation is
//! cooperative: observers poll [`is_cancelled`](CancelToken::is_cancelled)
//! at their suspension points and return early without raising.

use smallvec::{smallvec, SmallVec};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owner side of a cancellation signal.
///
/// Cloning shares the underlying flag; firing any clone fires them all.
#[derive(Clone, Debug, Default)]
pub struct CancelSource {
    flag: Arc<AtomicBool>,
}

impl CancelSource {
    /// Create a new, un-fired source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// An observer token for this source alone.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            flags: smallvec![Arc::clone(&self.flag)],
        }
    }
}

/// Observer side of one or more cancellation signals.
///
/// # Examples
///
/// ```
/// use hanabi_core::{CancelSource, CancelToken};
///
/// let commands = CancelSource::new();
/// let rewind = CancelSource::new();
/// let token = CancelToken::any(&[&commands, &rewind]);
///
/// assert!(!token.is_cancelled());
/// rewind.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancelToken {
    /// Two inline slots cover the common case: a command token linked to
    /// the shared command source plus one transient source.
    flags: SmallVec<[Arc<AtomicBool>; 2]>,
}

impl CancelToken {
    /// A token that can never be cancelled.
    pub fn never() -> Self {
        Self {
            flags: SmallVec::new(),
        }
    }

    /// A token that fires when any of the given sources fires.
    pub fn any(sources: &[&CancelSource]) -> Self {
        Self {
            flags: sources.iter().map(|s| Arc::clone(&s.flag)).collect(),
        }
    }

    /// Whether any linked source has requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_starts_unfired() {
        let src = CancelSource::new();
        assert!(!src.is_cancelled());
        assert!(!src.token().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_through_token() {
        let src = CancelSource::new();
        let token = src.token();
        src.cancel();
        assert!(token.is_cancelled());
        // Idempotent.
        src.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let src = CancelSource::new();
        let other = src.clone();
        other.cancel();
        assert!(src.is_cancelled());
    }

    #[test]
    fn token_links_only_its_own_source() {
        let a = CancelSource::new();
        let b = CancelSource::new();
        let token = a.token();
        b.cancel();
        assert!(!token.is_cancelled());
        a.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn any_fires_on_either_source() {
        let a = CancelSource::new();
        let b = CancelSource::new();
        let token = CancelToken::any(&[&a, &b]);
        assert!(!token.is_cancelled());
        b.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn never_token_stays_live() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }
}
