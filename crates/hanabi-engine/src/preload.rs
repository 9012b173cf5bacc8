//! Resource preloading: hold policy and reference-counting ledger.
//!
//! Descriptors declare the resources they need through the
//! [`Preloadable`](hanabi_core::Preloadable) capability; the policy decides which descriptors'
//! resources must be resident for the current cursor and the ledger
//! reference-counts holds so a resource shared by two descriptors stays
//! loaded until both release it. Hold failures are warnings, never
//! fatal: the affected command executes with the resource absent and
//! handles its own fallback.

use std::collections::{HashMap, HashSet};

use hanabi_core::{HolderId, ResourceKey};
use log::warn;

use crate::playlist::Playlist;

pub use hanabi_core::{NullBackend, ResourceBackend};

// ── Ledger ───────────────────────────────────────────────────────────

/// Reference-counting table of resource holds.
///
/// Holds are keyed by `(resource, holder)`. The backend sees a load
/// when a resource gains its first holder and a free when it loses its
/// last one; intermediate holds and releases only touch the table.
pub struct ResourceLedger {
    backend: Box<dyn ResourceBackend>,
    holds: HashMap<ResourceKey, HashSet<HolderId>>,
}

impl ResourceLedger {
    /// Create an empty ledger over the given backend.
    pub fn new(backend: Box<dyn ResourceBackend>) -> Self {
        Self {
            backend,
            holds: HashMap::new(),
        }
    }

    /// Record a hold for `holder` on `key`, loading on the first hold.
    ///
    /// A load failure is logged and the hold is not recorded; a later
    /// hold on the same key retries the load.
    pub fn hold(&mut self, key: &ResourceKey, holder: HolderId) {
        let first = self.holds.get(key).is_none_or(HashSet::is_empty);
        if first {
            if let Err(e) = self.backend.load(key) {
                warn!("resource hold failed, continuing without it: {e}");
                return;
            }
        }
        self.holds.entry(key.clone()).or_default().insert(holder);
    }

    /// Release `holder`'s hold on `key`, freeing on the last release.
    ///
    /// Releasing a hold that was never recorded is a no-op.
    pub fn release(&mut self, key: &ResourceKey, holder: HolderId) {
        let Some(holders) = self.holds.get_mut(key) else {
            return;
        };
        holders.remove(&holder);
        if holders.is_empty() {
            self.holds.remove(key);
            self.backend.free(key);
        }
    }

    /// Whether the resource currently has at least one holder.
    pub fn is_held(&self, key: &ResourceKey) -> bool {
        self.holds.get(key).is_some_and(|h| !h.is_empty())
    }

    /// Number of holders currently recorded for the resource.
    pub fn holder_count(&self, key: &ResourceKey) -> usize {
        self.holds.get(key).map_or(0, HashSet::len)
    }

    /// Release every hold and free every resource.
    pub fn release_all(&mut self) {
        for key in self.holds.drain().map(|(k, _)| k).collect::<Vec<_>>() {
            self.backend.free(&key);
        }
    }
}

impl std::fmt::Debug for ResourceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLedger")
            .field("held", &self.holds.len())
            .finish_non_exhaustive()
    }
}

// ── Policy ───────────────────────────────────────────────────────────

/// Which descriptors' resources must be resident for a given cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreloadMode {
    /// Hold every resource in the playlist for its whole lifetime.
    Static,
    /// Hold a sliding window of `[cursor, cursor + lookahead_steps]`
    /// descriptors; release what falls out of the window.
    Dynamic {
        /// How many descriptors past the cursor to keep resident.
        lookahead_steps: usize,
    },
}

/// Drives the ledger from cursor movement.
pub struct PreloadPolicy {
    mode: PreloadMode,
    ledger: ResourceLedger,
    /// Descriptor indices currently holding resources.
    active: HashSet<usize>,
}

impl PreloadPolicy {
    /// Create a policy in the given mode over a backend.
    pub fn new(mode: PreloadMode, backend: Box<dyn ResourceBackend>) -> Self {
        Self {
            mode,
            ledger: ResourceLedger::new(backend),
            active: HashSet::new(),
        }
    }

    /// The configured mode.
    pub fn mode(&self) -> PreloadMode {
        self.mode
    }

    /// Read access to the ledger, for diagnostics and tests.
    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Establish holds for playback starting at `start`.
    ///
    /// `Static` walks the playlist once and holds everything from
    /// `start` to `end_bound` (exclusive, defaulting to playlist end).
    /// `Dynamic` holds the initial window.
    pub fn begin(&mut self, playlist: &Playlist, start: usize, end_bound: Option<usize>) {
        let desired: Vec<usize> = match self.mode {
            PreloadMode::Static => {
                let end = end_bound.unwrap_or(playlist.len()).min(playlist.len());
                (start..end).collect()
            }
            PreloadMode::Dynamic { .. } => self.window(playlist, start),
        };
        for index in desired {
            self.hold_descriptor(playlist, index);
        }
    }

    /// Move the window after the cursor changed from `old` to `new`.
    ///
    /// Handles single-step advances and arbitrary jumps (rollback,
    /// fast-forward) the same way: diff the old window against the new
    /// one. `Static` mode never moves. Descriptors that declare
    /// themselves non-releasable keep their holds when leaving the
    /// window.
    pub fn advance(&mut self, playlist: &Playlist, new_cursor: usize) {
        if matches!(self.mode, PreloadMode::Static) {
            return;
        }
        let desired: HashSet<usize> = self.window(playlist, new_cursor).into_iter().collect();

        let leaving: Vec<usize> = self.active.difference(&desired).copied().collect();
        for index in leaving {
            self.release_descriptor(playlist, index);
        }
        let entering: Vec<usize> = desired.difference(&self.active).copied().collect();
        for index in entering {
            self.hold_descriptor(playlist, index);
        }
    }

    /// Release everything; the playlist is being discarded.
    pub fn finish(&mut self) {
        self.active.clear();
        self.ledger.release_all();
    }

    fn window(&self, playlist: &Playlist, cursor: usize) -> Vec<usize> {
        match self.mode {
            PreloadMode::Static => (0..playlist.len()).collect(),
            PreloadMode::Dynamic { lookahead_steps } => {
                let end = cursor.saturating_add(lookahead_steps);
                (cursor..=end).filter(|&i| i < playlist.len()).collect()
            }
        }
    }

    fn hold_descriptor(&mut self, playlist: &Playlist, index: usize) {
        let Some(command) = playlist.get(index) else {
            return;
        };
        if let Some(preloadable) = command.preloadable() {
            for key in preloadable.resources() {
                self.ledger.hold(&key, HolderId::descriptor(index));
            }
        }
        self.active.insert(index);
    }

    fn release_descriptor(&mut self, playlist: &Playlist, index: usize) {
        let Some(command) = playlist.get(index) else {
            self.active.remove(&index);
            return;
        };
        if let Some(preloadable) = command.preloadable() {
            if !preloadable.releasable() {
                // Keep the hold; the effect outlives the descriptor.
                self.active.remove(&index);
                return;
            }
            for key in preloadable.resources() {
                self.ledger.release(&key, HolderId::descriptor(index));
            }
        }
        self.active.remove(&index);
    }
}

impl std::fmt::Debug for PreloadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadPolicy")
            .field("mode", &self.mode)
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hanabi_test_utils::{scripted, BackendProbe, CountingBackend, ScriptLog};
    use std::sync::Arc;

    fn playlist_with_resources(resources: &[&[&str]]) -> Playlist {
        let log = ScriptLog::new();
        let commands = resources
            .iter()
            .enumerate()
            .map(|(line, keys)| {
                scripted("s", line as u32, 0, &log)
                    .resources(keys)
                    .build_arc()
            })
            .collect();
        Playlist::new("s", commands)
    }

    fn counting() -> (Box<CountingBackend>, BackendProbe) {
        let backend = CountingBackend::new();
        let probe = backend.probe();
        (Box::new(backend), probe)
    }

    #[test]
    fn static_mode_holds_whole_playlist() {
        let playlist = playlist_with_resources(&[&["a"], &["b"], &["a"]]);
        let (backend, probe) = counting();
        let mut policy = PreloadPolicy::new(PreloadMode::Static, backend);

        policy.begin(&playlist, 0, None);
        assert_eq!(probe.loaded(), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(policy.ledger().holder_count(&ResourceKey::from("a")), 2);

        // Cursor movement never releases in static mode.
        policy.advance(&playlist, 2);
        assert!(probe.freed().is_empty());

        policy.finish();
        assert!(!policy.ledger().is_held(&ResourceKey::from("a")));
        assert!(!policy.ledger().is_held(&ResourceKey::from("b")));
    }

    #[test]
    fn dynamic_window_holds_cursor_plus_lookahead() {
        // Descriptors 0..10, each with its own resource "r<i>".
        let names: Vec<String> = (0..10).map(|i| format!("r{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let per: Vec<&[&str]> = refs.iter().map(std::slice::from_ref).collect();
        let playlist = playlist_with_resources(&per);

        let (backend, probe) = counting();
        let mut policy =
            PreloadPolicy::new(PreloadMode::Dynamic { lookahead_steps: 2 }, backend);

        policy.begin(&playlist, 4, None);
        for i in [4, 5, 6] {
            assert!(policy.ledger().is_held(&ResourceKey::from(refs[i])), "r{i}");
        }
        assert!(!policy.ledger().is_held(&ResourceKey::from("r3")));
        assert!(!policy.ledger().is_held(&ResourceKey::from("r7")));

        policy.advance(&playlist, 5);
        assert!(!policy.ledger().is_held(&ResourceKey::from("r4")));
        assert!(policy.ledger().is_held(&ResourceKey::from("r7")));
        assert!(probe.freed().contains(&"r4".to_owned()));
    }

    #[test]
    fn dynamic_window_clips_at_playlist_end() {
        let playlist = playlist_with_resources(&[&["a"], &["b"], &["c"]]);
        let (backend, _probe) = counting();
        let mut policy =
            PreloadPolicy::new(PreloadMode::Dynamic { lookahead_steps: 4 }, backend);

        policy.begin(&playlist, 2, None);
        assert!(policy.ledger().is_held(&ResourceKey::from("c")));
        assert!(!policy.ledger().is_held(&ResourceKey::from("a")));
    }

    #[test]
    fn shared_resource_stays_held_until_both_release() {
        // Descriptors 0 and 1 both use "shared".
        let playlist = playlist_with_resources(&[&["shared"], &["shared"], &["other"]]);
        let (backend, probe) = counting();
        let mut policy =
            PreloadPolicy::new(PreloadMode::Dynamic { lookahead_steps: 1 }, backend);

        policy.begin(&playlist, 0, None);
        assert_eq!(policy.ledger().holder_count(&ResourceKey::from("shared")), 2);

        // Window becomes {1, 2}: descriptor 0 releases, 1 still holds.
        policy.advance(&playlist, 1);
        assert!(policy.ledger().is_held(&ResourceKey::from("shared")));
        assert!(!probe.freed().contains(&"shared".to_owned()));

        // Window becomes {2}: last holder gone, backend sees the free.
        policy.advance(&playlist, 2);
        assert!(!policy.ledger().is_held(&ResourceKey::from("shared")));
        assert!(probe.freed().contains(&"shared".to_owned()));
    }

    #[test]
    fn load_failure_is_nonfatal_and_retried() {
        let (mut backend, probe) = counting();
        backend.fail_on("broken");
        let mut ledger = ResourceLedger::new(backend);

        ledger.hold(&ResourceKey::from("broken"), HolderId::descriptor(0));
        assert!(!ledger.is_held(&ResourceKey::from("broken")));

        // A later holder retries.
        ledger.hold(&ResourceKey::from("broken"), HolderId::descriptor(1));
        assert_eq!(probe.load_attempts("broken"), 2);
    }

    #[test]
    fn non_releasable_descriptor_keeps_its_hold() {
        let log = ScriptLog::new();
        let commands: Vec<Arc<dyn hanabi_core::Command>> = vec![
            scripted("s", 0, 0, &log)
                .resources(&["bgm"])
                .keep_resources_loaded()
                .build_arc(),
            scripted("s", 1, 0, &log).build_arc(),
        ];
        let playlist = Playlist::new("s", commands);

        let (backend, probe) = counting();
        let mut policy =
            PreloadPolicy::new(PreloadMode::Dynamic { lookahead_steps: 0 }, backend);
        policy.begin(&playlist, 0, None);
        policy.advance(&playlist, 1);

        assert!(policy.ledger().is_held(&ResourceKey::from("bgm")));
        assert!(!probe.freed().contains(&"bgm".to_owned()));
    }
}
