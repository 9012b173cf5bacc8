//! The persisted save-game record.

use std::collections::HashSet;
use std::io::{Read, Write};

use hanabi_core::{PlaybackSpot, StateSnapshot};

use crate::codec::{
    read_snapshot, read_spot, read_u32_le, read_u8, write_snapshot, write_spot, write_u32_le,
    write_u8,
};
use crate::error::PersistError;
use crate::{FORMAT_VERSION, MAGIC};

/// Everything a saved game embeds from the playback core.
///
/// The rollback entries are newest first, exactly as the engine hands
/// them out, and round-trip in that order. The play history backs skip
/// eligibility across sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveGame {
    /// The spot playback resumes at: the save-point snapshot's capture
    /// position.
    pub resume_at: PlaybackSpot,
    /// Rollback history eligible for restoration, newest first.
    pub rollback: Vec<StateSnapshot>,
    /// Every spot executed at least once, for skip eligibility.
    pub play_history: HashSet<PlaybackSpot>,
}

/// Write a save-game record, headed by magic bytes and the format
/// version.
pub fn write_save(w: &mut dyn Write, save: &SaveGame) -> Result<(), PersistError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)?;

    write_spot(w, &save.resume_at)?;

    write_u32_le(w, save.rollback.len() as u32)?;
    for snapshot in &save.rollback {
        write_snapshot(w, snapshot)?;
    }

    // Sorted so identical saves are byte-identical.
    let mut history: Vec<&PlaybackSpot> = save.play_history.iter().collect();
    history.sort();
    write_u32_le(w, history.len() as u32)?;
    for spot in history {
        write_spot(w, spot)?;
    }
    Ok(())
}

/// Read a save-game record, validating magic and version.
pub fn read_save(r: &mut dyn Read) -> Result<SaveGame, PersistError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(PersistError::InvalidMagic);
    }
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion { found: version });
    }

    let resume_at = read_spot(r)?;

    let count = read_u32_le(r)? as usize;
    let mut rollback = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        rollback.push(read_snapshot(r)?);
    }

    let count = read_u32_le(r)? as usize;
    let mut play_history = HashSet::with_capacity(count.min(4096));
    for _ in 0..count {
        play_history.insert(read_spot(r)?);
    }

    Ok(SaveGame {
        resume_at,
        rollback,
        play_history,
    })
}
