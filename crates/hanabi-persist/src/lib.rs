//! Save-game serialization for the Hanabi playback engine.
//!
//! Encodes the engine's persistence boundary (resume spot, rollback
//! history, play history) into a compact binary form for save-game
//! embedding. All I/O uses a custom binary codec (no serde dependency).
//!
//! # Format
//!
//! ```text
//! [MAGIC "HNBI"] [VERSION u8]
//! [resume spot] [rollback count + snapshots, newest first]
//! [play-history count + spots, sorted]
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod save;

pub use error::PersistError;
pub use save::{read_save, write_save, SaveGame};

/// Magic bytes at the start of every save record.
pub const MAGIC: [u8; 4] = *b"HNBI";

/// Current binary format version.
pub const FORMAT_VERSION: u8 = 1;
