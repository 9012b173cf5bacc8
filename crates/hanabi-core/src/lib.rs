//! Core types and traits for the Hanabi script playback engine.
//!
//! This crate defines the vocabulary shared by every other Hanabi
//! crate: playback positions, the command descriptor contract, state
//! capture and restore, parameter bindings, cancellation primitives,
//! and the error taxonomy. It contains no sequencing logic; the run
//! loop lives in `hanabi-engine`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bind;
pub mod cancel;
pub mod command;
pub mod error;
pub mod spot;
pub mod state;

pub use bind::{BoundParam, BoundParams, ParamEvaluator};
pub use cancel::{CancelSource, CancelToken};
pub use command::{
    Command, CommandEffect, ExecuteContext, HolderId, NullBackend, Preloadable, ResourceBackend,
    ResourceKey,
};
pub use error::{CommandError, PlayError, PreloadError, RewindError, StateError, StepError};
pub use spot::PlaybackSpot;
pub use state::{ServiceRegistry, SharedSnapshot, StateSnapshot, StatefulService};
