//! The Hanabi playback engine.
//!
//! Sequences the command descriptors of a compiled script: executes
//! them in order, suspends on input gates, skips previously-seen
//! content, auto-plays on a timer, fast-forwards and rolls back on
//! rewind requests, and keeps the resources the upcoming commands need
//! resident.
//!
//! [`engine::PlaybackEngine`] is the synchronous state machine, driven
//! one step at a time; [`session::PlaybackSession`] runs it on a
//! dedicated thread behind a channel control surface.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod engine;
pub mod playlist;
pub mod preload;
pub mod rollback;
pub mod session;

pub use engine::{EngineConfig, PlaybackEngine, PlaybackState, StepOutcome};
pub use playlist::Playlist;
pub use preload::{NullBackend, PreloadMode, PreloadPolicy, ResourceBackend, ResourceLedger};
pub use rollback::RollbackStack;
pub use session::{InputEvent, PlaybackSession, SessionError};
