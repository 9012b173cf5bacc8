//! Error types for the Hanabi playback engine.
//!
//! One enum per subsystem: play (start/navigation), step (run loop),
//! rewind (fast-forward/rollback), command execution, state capture and
//! restore, and resource preloading. No error here is fatal to the
//! process; every failure leaves the engine in its last consistent state.

use std::error::Error;
use std::fmt;

use crate::spot::PlaybackSpot;

/// Errors starting playback or resolving a playlist position.
///
/// Navigation failures never move the cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayError {
    /// No playlist is loaded.
    NoPlaylist,
    /// The requested start index is outside the playlist.
    OutOfRange {
        /// The requested index.
        index: usize,
        /// The playlist length.
        len: usize,
    },
    /// The playlist is empty.
    EmptyPlaylist,
}

impl fmt::Display for PlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPlaylist => write!(f, "no playlist loaded"),
            Self::OutOfRange { index, len } => {
                write!(f, "start index {index} out of range (playlist has {len} commands)")
            }
            Self::EmptyPlaylist => write!(f, "playlist is empty"),
        }
    }
}

impl Error for PlayError {}

/// Errors from one run-loop step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepError {
    /// `step()` was called while the engine was not running.
    NotRunning,
    /// The command at the given spot failed; the engine stops.
    CommandFailed {
        /// Where the failing command sits in the script.
        spot: PlaybackSpot,
        /// The underlying command error.
        reason: CommandError,
    },
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => write!(f, "engine is not running"),
            Self::CommandFailed { spot, reason } => {
                write!(f, "command at {spot} failed: {reason}")
            }
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CommandFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Errors from [`rewind`] requests (fast-forward or rollback).
///
/// Every variant leaves the engine at a consistent cursor: either the
/// position it held before the request (navigation and rollback
/// failures) or the position the fast-forward legitimately reached
/// before being interrupted.
///
/// [`rewind`]: https://docs.rs/hanabi-engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RewindError {
    /// No descriptor exists at or after the requested position.
    TargetNotFound {
        /// Requested line index.
        line_index: u32,
        /// Requested inline index.
        inline_index: u32,
    },
    /// No playlist is loaded.
    NoPlaylist,
    /// Rolling back: no snapshot is recorded for the target spot.
    /// The rollback stack is untouched.
    SnapshotMissing {
        /// The spot that had no snapshot.
        spot: PlaybackSpot,
    },
    /// Fast-forwarding: the playlist ran out before reaching the target.
    PlaylistExhausted {
        /// The target index that was never reached.
        target: usize,
    },
    /// Fast-forwarding: a stop terminator executed before the target.
    /// Expected when conditional commands make the target unreachable.
    TerminatorReached {
        /// Where the terminator fired.
        spot: PlaybackSpot,
    },
    /// The rewind's cancellation token fired mid-flight.
    Cancelled,
    /// Restoring a snapshot failed.
    Restore(StateError),
    /// A run-loop step failed during fast-forward.
    Step(StepError),
}

impl fmt::Display for RewindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetNotFound {
                line_index,
                inline_index,
            } => write!(f, "target position {line_index}.{inline_index} not in playlist"),
            Self::NoPlaylist => write!(f, "no playlist loaded"),
            Self::SnapshotMissing { spot } => {
                write!(f, "no rollback snapshot recorded for {spot}")
            }
            Self::PlaylistExhausted { target } => {
                write!(f, "playlist exhausted before reaching index {target}")
            }
            Self::TerminatorReached { spot } => {
                write!(f, "stop terminator at {spot} reached before target")
            }
            Self::Cancelled => write!(f, "rewind cancelled"),
            Self::Restore(e) => write!(f, "snapshot restore failed: {e}"),
            Self::Step(e) => write!(f, "fast-forward step failed: {e}"),
        }
    }
}

impl Error for RewindError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Restore(e) => Some(e),
            Self::Step(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StateError> for RewindError {
    fn from(e: StateError) -> Self {
        Self::Restore(e)
    }
}

impl From<StepError> for RewindError {
    fn from(e: StepError) -> Self {
        Self::Step(e)
    }
}

/// Errors from individual command execution.
///
/// Cancellation is deliberately absent: a cancelled command returns
/// `Ok` early without mutating shared state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// The command's work failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
        }
    }
}

impl Error for CommandError {}

/// Errors restoring service state from a snapshot fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateError {
    /// A snapshot fragment names a service that is not registered.
    UnknownService {
        /// The fragment's service name.
        name: String,
    },
    /// A service rejected its fragment as corrupt.
    Corrupt {
        /// The service that rejected the fragment.
        service: String,
        /// Description of what was wrong.
        detail: String,
    },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownService { name } => {
                write!(f, "snapshot fragment for unknown service '{name}'")
            }
            Self::Corrupt { service, detail } => {
                write!(f, "corrupt state for service '{service}': {detail}")
            }
        }
    }
}

impl Error for StateError {}

/// Errors holding resources ahead of execution.
///
/// Hold failures are warnings, never fatal: playback proceeds and the
/// affected command is responsible for its own fallback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreloadError {
    /// The backend has no resource under this key.
    MissingResource {
        /// The requested resource key.
        key: String,
    },
    /// The backend failed to load the resource.
    BackendFailed {
        /// The requested resource key.
        key: String,
        /// Description of the backend failure.
        reason: String,
    },
}

impl fmt::Display for PreloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingResource { key } => write!(f, "resource '{key}' not found"),
            Self::BackendFailed { key, reason } => {
                write!(f, "failed to load resource '{key}': {reason}")
            }
        }
    }
}

impl Error for PreloadError {}
