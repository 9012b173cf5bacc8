//! The command descriptor contract and its capability traits.
//!
//! A [`Command`] is one executable unit of a compiled script. Descriptors
//! are produced once per script load and are immutable; only the
//! evaluation of [`should_execute`](Command::should_execute) is dynamic,
//! since it may read mutable variable state.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::{CommandError, PreloadError};
use crate::spot::PlaybackSpot;
use crate::state::ServiceRegistry;

/// Key identifying a loadable resource (sprite sheet, audio clip, ...).
///
/// Opaque to the engine; the resource backend interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(pub Arc<str>);

impl ResourceKey {
    /// Create a key from any string-like value.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identity of a resource holder for reference counting.
///
/// Holds are keyed by `(resource, holder)` so a resource referenced by
/// two descriptors stays loaded until both release it. Descriptors use
/// their playlist index; the engine itself uses [`HolderId::ENGINE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId(pub u64);

impl HolderId {
    /// The engine's own holder identity (save-point holds etc.).
    pub const ENGINE: HolderId = HolderId(u64::MAX);

    /// Holder identity for the descriptor at a playlist index.
    pub fn descriptor(index: usize) -> Self {
        Self(index as u64)
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ENGINE {
            write!(f, "engine")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// What a command asks of the run loop after executing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommandEffect {
    /// Nothing; the loop advances.
    #[default]
    None,
    /// Suspend until input is received (suppressed while skipping).
    WaitForInput,
    /// Stop playback cleanly. Well-formed scripts end with one of these.
    StopPlayback,
}

/// Mutable collaborator access handed to an executing command.
///
/// Commands reach their subsystems through the registry (or through
/// handles they captured at construction); the engine never inspects
/// what a command does with it.
pub struct ExecuteContext<'a> {
    /// The stateful services registered with the engine.
    pub services: &'a mut ServiceRegistry,
}

/// One executable unit of a compiled script.
///
/// Implementations are supplied by collaborators (the script compiler
/// and the concrete actor commands); the engine only sequences them.
///
/// Blocking commands may take as long as they need inside `execute`;
/// the run loop awaits them. Non-blocking commands must return promptly
/// and launch any long-running work themselves, observing `cancel`.
/// The token is derived from the engine's shared command-execution
/// source so a hard stop can abandon in-flight work. A cancelled
/// command returns `Ok` early and must not mutate shared state after
/// observing cancellation.
pub trait Command: Send + Sync {
    /// The script position this descriptor originates from.
    fn spot(&self) -> &PlaybackSpot;

    /// Conditional gate, re-evaluated at every visit (it may depend on
    /// mutable variables). When false the run loop advances past the
    /// command with no side effects.
    fn should_execute(&self, _services: &ServiceRegistry) -> bool {
        true
    }

    /// Whether the command's work completes inside `execute`.
    ///
    /// Non-blocking commands return promptly with their work continuing
    /// in the background, observing `cancel`. The run loop notes the
    /// launch so a hard stop knows to fire the shared cancellation
    /// source.
    fn blocking(&self) -> bool {
        true
    }

    /// Perform the command's work.
    fn execute(
        &self,
        ctx: &mut ExecuteContext<'_>,
        cancel: &CancelToken,
    ) -> Result<CommandEffect, CommandError>;

    /// Optional preload capability. Descriptors that reference loadable
    /// resources return `Some` so the preload policy can hold them ahead
    /// of the cursor.
    fn preloadable(&self) -> Option<&dyn Preloadable> {
        None
    }
}

/// Capability of a descriptor that references loadable resources.
///
/// The preload policy holds every declared key before the descriptor
/// enters the active window and releases them once it leaves. Keys are
/// declarative; the actual loading goes through the resource backend.
pub trait Preloadable {
    /// The resource keys this descriptor needs in memory to execute.
    fn resources(&self) -> SmallVec<[ResourceKey; 2]>;

    /// Whether the resources may be released once the descriptor has
    /// executed. Defaults to true; commands whose effect outlives them
    /// (a background track, a persistent sprite) return false.
    fn releasable(&self) -> bool {
        true
    }
}

/// Loads and frees resources on behalf of the preload ledger.
///
/// Implementations live outside the engine (asset pipeline, cache).
/// `load` is called once per 0-to-1 holder transition, `free` once per
/// 1-to-0 transition.
pub trait ResourceBackend: Send {
    /// Bring the resource into memory.
    fn load(&mut self, key: &ResourceKey) -> Result<(), PreloadError>;

    /// Release the resource.
    fn free(&mut self, key: &ResourceKey);
}

/// Backend that loads nothing, for engines without managed resources.
#[derive(Debug, Default)]
pub struct NullBackend;

impl ResourceBackend for NullBackend {
    fn load(&mut self, _key: &ResourceKey) -> Result<(), PreloadError> {
        Ok(())
    }

    fn free(&mut self, _key: &ResourceKey) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holder_id_for_descriptor_and_engine() {
        assert_eq!(HolderId::descriptor(3), HolderId(3));
        assert_ne!(HolderId::descriptor(0), HolderId::ENGINE);
        assert_eq!(HolderId::ENGINE.to_string(), "engine");
        assert_eq!(HolderId(7).to_string(), "7");
    }

    #[test]
    fn resource_key_round_trip() {
        let key = ResourceKey::new("bgm/theme");
        assert_eq!(key.as_str(), "bgm/theme");
        assert_eq!(key, ResourceKey::from("bgm/theme"));
        assert_eq!(key.to_string(), "bgm/theme");
    }

    #[test]
    fn default_effect_is_none() {
        assert_eq!(CommandEffect::default(), CommandEffect::None);
    }

    #[test]
    fn null_backend_loads_anything() {
        let mut backend = NullBackend;
        assert!(backend.load(&ResourceKey::from("whatever")).is_ok());
        backend.free(&ResourceKey::from("whatever"));
    }
}
