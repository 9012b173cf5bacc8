//! Playback position identifiers.

use std::fmt;
use std::sync::Arc;

/// An immutable position in a named script.
///
/// Identifies a unique executable unit by script id, line index, and
/// inline index (several commands may share one text line). Spots are
/// value-equal and hashable: they are the join key between rollback
/// snapshots and script positions, and the key for rewind targets.
///
/// Ordering compares `(script_id, line_index, inline_index)`; comparing
/// spots from different scripts is lexicographic on the id and only
/// meaningful within one script.
///
/// # Examples
///
/// ```
/// use hanabi_core::PlaybackSpot;
///
/// let a = PlaybackSpot::new("prologue", 4, 0);
/// let b = PlaybackSpot::new("prologue", 4, 1);
///
/// assert_ne!(a, b);
/// assert!(a < b);
/// assert_eq!(a.script_id(), "prologue");
/// assert_eq!(format!("{a}"), "prologue:4.0");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackSpot {
    script_id: Arc<str>,
    line_index: u32,
    inline_index: u32,
}

impl PlaybackSpot {
    /// Create a spot for the given script position.
    pub fn new(script_id: impl Into<Arc<str>>, line_index: u32, inline_index: u32) -> Self {
        Self {
            script_id: script_id.into(),
            line_index,
            inline_index,
        }
    }

    /// The script this spot belongs to.
    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    /// Shared handle to the script id, for cheap spot construction.
    pub fn script_id_arc(&self) -> Arc<str> {
        Arc::clone(&self.script_id)
    }

    /// Zero-based line index within the script.
    pub fn line_index(&self) -> u32 {
        self.line_index
    }

    /// Zero-based inline index within the line.
    pub fn inline_index(&self) -> u32 {
        self.inline_index
    }

    /// The `(line, inline)` pair, used for position comparisons.
    pub fn position(&self) -> (u32, u32) {
        (self.line_index, self.inline_index)
    }
}

impl fmt::Display for PlaybackSpot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.script_id, self.line_index, self.inline_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn value_equality_and_hash() {
        let a = PlaybackSpot::new("s", 1, 0);
        let b = PlaybackSpot::new("s", 1, 0);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn inline_index_distinguishes_same_line() {
        let a = PlaybackSpot::new("s", 3, 0);
        let b = PlaybackSpot::new("s", 3, 1);
        assert_ne!(a, b);
        assert_eq!(a.position(), (3, 0));
        assert_eq!(b.position(), (3, 1));
    }

    #[test]
    fn ordering_is_line_then_inline() {
        let early = PlaybackSpot::new("s", 2, 5);
        let late = PlaybackSpot::new("s", 3, 0);
        assert!(early < late);
        assert!(PlaybackSpot::new("s", 3, 0) < PlaybackSpot::new("s", 3, 1));
    }

    #[test]
    fn display_format() {
        let spot = PlaybackSpot::new("chapter1", 12, 2);
        assert_eq!(spot.to_string(), "chapter1:12.2");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ordering_within_a_script_matches_positions(
                a_line in 0u32..100,
                a_inline in 0u32..8,
                b_line in 0u32..100,
                b_inline in 0u32..8,
            ) {
                let a = PlaybackSpot::new("s", a_line, a_inline);
                let b = PlaybackSpot::new("s", b_line, b_inline);
                prop_assert_eq!(a.cmp(&b), a.position().cmp(&b.position()));
            }
        }
    }
}
