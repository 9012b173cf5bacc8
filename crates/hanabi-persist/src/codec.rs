//! Binary encode/decode for save-game records.
//!
//! All integers are little-endian. Strings and byte arrays are
//! length-prefixed with a `u32` length. The format is intentionally
//! simple: no compression, no alignment padding, no self-describing
//! schema.

use std::io::{Read, Write};

use indexmap::IndexMap;

use hanabi_core::{PlaybackSpot, StateSnapshot};

use crate::error::PersistError;

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), PersistError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), PersistError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> Result<(), PersistError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> Result<(), PersistError> {
    write_u32_le(w, s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Write a length-prefixed byte array (u32 length + bytes).
pub fn write_length_prefixed_bytes(w: &mut dyn Write, b: &[u8]) -> Result<(), PersistError> {
    write_u32_le(w, b.len() as u32)?;
    w.write_all(b)?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, PersistError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, PersistError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut dyn Read) -> Result<u64, PersistError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str(r: &mut dyn Read) -> Result<String, PersistError> {
    let len = read_u32_le(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| PersistError::Malformed {
        detail: format!("invalid UTF-8 string: {e}"),
    })
}

/// Read a length-prefixed byte array.
pub fn read_length_prefixed_bytes(r: &mut dyn Read) -> Result<Vec<u8>, PersistError> {
    let len = read_u32_le(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

// ── Playback spots ──────────────────────────────────────────────

/// Encode a playback spot: script id, line, inline.
pub fn write_spot(w: &mut dyn Write, spot: &PlaybackSpot) -> Result<(), PersistError> {
    write_length_prefixed_str(w, spot.script_id())?;
    write_u32_le(w, spot.line_index())?;
    write_u32_le(w, spot.inline_index())?;
    Ok(())
}

/// Decode a playback spot.
pub fn read_spot(r: &mut dyn Read) -> Result<PlaybackSpot, PersistError> {
    let script_id = read_length_prefixed_str(r)?;
    let line_index = read_u32_le(r)?;
    let inline_index = read_u32_le(r)?;
    Ok(PlaybackSpot::new(script_id, line_index, inline_index))
}

// ── State snapshots ─────────────────────────────────────────────

/// Encode a state snapshot: capture spot, timestamp, then each
/// service fragment as a name and an opaque blob, in capture order.
pub fn write_snapshot(w: &mut dyn Write, snapshot: &StateSnapshot) -> Result<(), PersistError> {
    write_spot(w, snapshot.captured_at())?;
    write_u64_le(w, snapshot.created_at_ms())?;
    write_u32_le(w, snapshot.fragments().len() as u32)?;
    for (name, blob) in snapshot.fragments() {
        write_length_prefixed_str(w, name)?;
        write_length_prefixed_bytes(w, blob)?;
    }
    Ok(())
}

/// Decode a state snapshot.
pub fn read_snapshot(r: &mut dyn Read) -> Result<StateSnapshot, PersistError> {
    let captured_at = read_spot(r)?;
    let created_at_ms = read_u64_le(r)?;
    let count = read_u32_le(r)? as usize;
    let mut fragments = IndexMap::with_capacity(count);
    for _ in 0..count {
        let name = read_length_prefixed_str(r)?;
        let blob = read_length_prefixed_bytes(r)?;
        if fragments.insert(name.clone(), blob).is_some() {
            return Err(PersistError::Malformed {
                detail: format!("duplicate snapshot fragment '{name}'"),
            });
        }
    }
    Ok(StateSnapshot::from_parts(fragments, captured_at, created_at_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip_spot(spot: &PlaybackSpot) -> PlaybackSpot {
        let mut buf = Vec::new();
        write_spot(&mut buf, spot).unwrap();
        read_spot(&mut buf.as_slice()).unwrap()
    }

    #[test]
    fn spot_round_trips() {
        let spot = PlaybackSpot::new("chapter-2", 41, 3);
        assert_eq!(round_trip_spot(&spot), spot);
    }

    #[test]
    fn snapshot_round_trips_with_fragment_order() {
        let mut fragments = IndexMap::new();
        fragments.insert("actors".to_owned(), vec![1, 2, 3]);
        fragments.insert("audio".to_owned(), vec![]);
        fragments.insert("vars".to_owned(), vec![0xff; 32]);
        let snapshot =
            StateSnapshot::from_parts(fragments, PlaybackSpot::new("s", 9, 1), 1_234_567);

        let mut buf = Vec::new();
        write_snapshot(&mut buf, &snapshot).unwrap();
        let decoded = read_snapshot(&mut buf.as_slice()).unwrap();

        assert_eq!(decoded, snapshot);
        let names: Vec<_> = decoded.fragments().keys().cloned().collect();
        assert_eq!(names, vec!["actors", "audio", "vars"]);
    }

    #[test]
    fn truncated_snapshot_is_an_error() {
        let mut fragments = IndexMap::new();
        fragments.insert("vars".to_owned(), vec![7; 16]);
        let snapshot = StateSnapshot::from_parts(fragments, PlaybackSpot::new("s", 0, 0), 0);

        let mut buf = Vec::new();
        write_snapshot(&mut buf, &snapshot).unwrap();
        buf.truncate(buf.len() - 4);

        assert!(read_snapshot(&mut buf.as_slice()).is_err());
    }

    proptest! {
        #[test]
        fn any_spot_round_trips(
            script in "[a-z0-9_-]{1,24}",
            line in any::<u32>(),
            inline in any::<u32>(),
        ) {
            let spot = PlaybackSpot::new(script, line, inline);
            prop_assert_eq!(round_trip_spot(&spot), spot);
        }

        #[test]
        fn any_snapshot_round_trips(
            names in proptest::collection::btree_set("[a-z]{1,8}", 0..5),
            blob in proptest::collection::vec(any::<u8>(), 0..64),
            line in any::<u32>(),
            ts in any::<u64>(),
        ) {
            let mut fragments = IndexMap::new();
            for name in names {
                fragments.insert(name, blob.clone());
            }
            let snapshot = StateSnapshot::from_parts(
                fragments,
                PlaybackSpot::new("s", line, 0),
                ts,
            );
            let mut buf = Vec::new();
            write_snapshot(&mut buf, &snapshot).unwrap();
            let decoded = read_snapshot(&mut buf.as_slice()).unwrap();
            prop_assert_eq!(decoded, snapshot);
        }
    }
}
