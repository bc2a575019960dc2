//! The parts library: every LDraw file reachable from the search path, catalogued by target key.
//!
//! - [`SearchPath`] ranks files: earlier roots beat later ones, and within a root `p` beats
//!   `parts` beats `models` beats anything else. Lower rank wins.
//! - [`LibraryIndex`] holds one [`IndexCard`] per target key, built from a header scan of each
//!   file, and applies [`FsMessage`](crate::event::FsMessage) batches incrementally.
//! - [`IndexSnapshot`] persists the index between runs.
//! - [`LibraryWatcher`] (feature `service`) turns filesystem notifications into message batches.

pub mod card;
pub mod index;
pub mod persist;
#[cfg(feature = "service")]
pub mod watch;

pub use card::{is_library_file, IndexCard, Location, SearchPath, KNOWN_CATEGORIES};
pub use index::{LibraryIndex, WalkStats};
pub use persist::{version_stamp, IndexSnapshot};
#[cfg(feature = "service")]
pub use watch::LibraryWatcher;
