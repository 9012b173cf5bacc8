//! The ordered command sequence the engine plays through.

use std::fmt;
use std::sync::Arc;

use hanabi_core::{Command, PlaybackSpot};

/// An immutable, randomly-indexable sequence of command descriptors for
/// one script.
///
/// Built once per script load from the compiler's output. Descriptors
/// arrive in script order, so their `(line, inline)` positions are
/// nondecreasing and position lookups are binary searches.
pub struct Playlist {
    script_id: Arc<str>,
    commands: Vec<Arc<dyn Command>>,
}

impl Playlist {
    /// Build a playlist from descriptors in script order.
    ///
    /// # Panics
    ///
    /// Debug builds panic if descriptor positions are not nondecreasing
    /// or a descriptor belongs to a different script.
    pub fn new(script_id: impl Into<Arc<str>>, commands: Vec<Arc<dyn Command>>) -> Self {
        let script_id = script_id.into();
        debug_assert!(
            commands.iter().all(|c| c.spot().script_id() == &*script_id),
            "descriptor from a different script"
        );
        debug_assert!(
            commands
                .windows(2)
                .all(|w| w[0].spot().position() <= w[1].spot().position()),
            "descriptor positions out of order"
        );
        Self {
            script_id,
            commands,
        }
    }

    /// The script this playlist was compiled from.
    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    /// Shared handle to the script id.
    pub fn script_id_arc(&self) -> Arc<str> {
        Arc::clone(&self.script_id)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the playlist has no descriptors.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The descriptor at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&Arc<dyn Command>> {
        self.commands.get(index)
    }

    /// The spot of the descriptor at `index`, if in range.
    pub fn spot_at(&self, index: usize) -> Option<&PlaybackSpot> {
        self.commands.get(index).map(|c| c.spot())
    }

    /// Index of the first descriptor at or after `(line, inline)`.
    ///
    /// `None` means no descriptor exists at or past that position.
    /// Callers treat that as "target not in playlist", never as end of
    /// script.
    pub fn first_at_or_after(&self, line_index: u32, inline_index: u32) -> Option<usize> {
        let target = (line_index, inline_index);
        let idx = self
            .commands
            .partition_point(|c| c.spot().position() < target);
        (idx < self.commands.len()).then_some(idx)
    }

    /// Index of the descriptor at exactly `spot`, if any.
    pub fn index_of_spot(&self, spot: &PlaybackSpot) -> Option<usize> {
        if spot.script_id() != &*self.script_id {
            return None;
        }
        let idx = self.first_at_or_after(spot.line_index(), spot.inline_index())?;
        (self.commands[idx].spot().position() == spot.position()).then_some(idx)
    }
}

impl fmt::Debug for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playlist")
            .field("script_id", &self.script_id)
            .field("len", &self.commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hanabi_test_utils::{scripted, ScriptLog};

    fn playlist_of(positions: &[(u32, u32)]) -> Playlist {
        let log = ScriptLog::new();
        let commands = positions
            .iter()
            .map(|&(line, inline)| scripted("s", line, inline, &log).build_arc())
            .collect();
        Playlist::new("s", commands)
    }

    #[test]
    fn first_at_or_after_finds_exact_and_next() {
        let playlist = playlist_of(&[(0, 0), (1, 0), (1, 1), (4, 0)]);
        assert_eq!(playlist.first_at_or_after(1, 0), Some(1));
        assert_eq!(playlist.first_at_or_after(1, 1), Some(2));
        // Gap: resolves to the next descriptor.
        assert_eq!(playlist.first_at_or_after(2, 0), Some(3));
    }

    #[test]
    fn first_at_or_after_past_end_is_none() {
        let playlist = playlist_of(&[(0, 0), (1, 0)]);
        assert_eq!(playlist.first_at_or_after(1, 1), None);
        assert_eq!(playlist.first_at_or_after(9, 0), None);
    }

    #[test]
    fn index_of_spot_requires_exact_position() {
        let playlist = playlist_of(&[(0, 0), (2, 0)]);
        assert_eq!(playlist.index_of_spot(&PlaybackSpot::new("s", 2, 0)), Some(1));
        assert_eq!(playlist.index_of_spot(&PlaybackSpot::new("s", 1, 0)), None);
        assert_eq!(playlist.index_of_spot(&PlaybackSpot::new("other", 2, 0)), None);
    }

    #[test]
    fn empty_playlist_resolves_nothing() {
        let playlist = playlist_of(&[]);
        assert!(playlist.is_empty());
        assert_eq!(playlist.first_at_or_after(0, 0), None);
    }
}
