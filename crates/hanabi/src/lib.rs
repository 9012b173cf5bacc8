//! Hanabi: a script playback and rollback engine for visual-novel
//! style games.
//!
//! This is the top-level facade crate that re-exports the public API
//! from the Hanabi sub-crates. For most users, adding `hanabi` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use hanabi::prelude::*;
//! use std::sync::Arc;
//!
//! // A command that prints a line and waits for the player.
//! struct Say {
//!     spot: PlaybackSpot,
//!     text: String,
//! }
//! impl Command for Say {
//!     fn spot(&self) -> &PlaybackSpot { &self.spot }
//!     fn execute(
//!         &self,
//!         _ctx: &mut ExecuteContext<'_>,
//!         _cancel: &CancelToken,
//!     ) -> Result<CommandEffect, CommandError> {
//!         println!("{}", self.text);
//!         Ok(CommandEffect::WaitForInput)
//!     }
//! }
//!
//! let commands: Vec<Arc<dyn Command>> = vec![
//!     Arc::new(Say {
//!         spot: PlaybackSpot::new("intro", 0, 0),
//!         text: "It was raining the day we met.".into(),
//!     }),
//!     Arc::new(Say {
//!         spot: PlaybackSpot::new("intro", 1, 0),
//!         text: "Neither of us had an umbrella.".into(),
//!     }),
//! ];
//! let playlist = Playlist::new("intro", commands);
//!
//! let mut engine = PlaybackEngine::new(
//!     EngineConfig::default(),
//!     ServiceRegistry::new(),
//!     Box::new(NullBackend),
//! );
//! engine.load_playlist(playlist);
//! engine.play(0).unwrap();
//! engine.step().unwrap();
//! assert_eq!(engine.state(), PlaybackState::WaitingForInput);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `hanabi-core` | Spots, command/service contracts, cancellation, errors |
//! | [`engine`] | `hanabi-engine` | Playlist, rollback stack, preload policy, the engine and session |
//! | [`persist`] | `hanabi-persist` | Save-game encoding and decoding |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and contracts (`hanabi-core`).
///
/// Playback spots, the [`types::Command`] and
/// [`types::StatefulService`] traits, parameter bindings, cancellation
/// primitives, and the error taxonomy.
pub use hanabi_core as types;

/// The playback engine (`hanabi-engine`).
///
/// [`engine::PlaybackEngine`] is the synchronous state machine;
/// [`engine::PlaybackSession`] runs it on a dedicated thread behind a
/// channel control surface.
pub use hanabi_engine as engine;

/// Save-game serialization (`hanabi-persist`).
///
/// Encode the persistence boundary with [`persist::write_save`] and
/// decode it with [`persist::read_save`].
pub use hanabi_persist as persist;

/// Common imports for typical Hanabi usage.
///
/// ```rust
/// use hanabi::prelude::*;
/// ```
pub mod prelude {
    // Core contracts
    pub use hanabi_core::{
        CancelSource, CancelToken, Command, CommandEffect, CommandError, ExecuteContext,
        PlaybackSpot, Preloadable, ResourceKey, ServiceRegistry, StateSnapshot, StatefulService,
    };

    // Engine surface
    pub use hanabi_engine::{
        EngineConfig, InputEvent, NullBackend, PlaybackEngine, PlaybackSession, PlaybackState,
        Playlist, PreloadMode, ResourceBackend, RollbackStack, StepOutcome,
    };

    // Persistence boundary
    pub use hanabi_persist::{read_save, write_save, SaveGame};
}
