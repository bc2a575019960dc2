//! The in-memory document tree.
//!
//! - [`document`]: [`Document`], an ordered set of uniquely named pages
//! - [`page`]: [`Page`], its header metadata and [`Step`]s
//! - [`element`]: everything a step can hold (comments, meta-commands, geometry, groups, texture
//!   blocks)
//! - [`reference`]: sub-file references and their memoised [`ResolutionState`]
//! - [`page_type`]: [`PageType`] and the target-name conventions derived from it

pub mod document;
pub mod element;
pub mod page;
pub mod page_type;
pub mod reference;

pub use document::{Document, DocumentId};
pub use element::{
    BfcCommand, Colour, Comment, CommentKind, Element, ElementFlag, ElementFlags, Group, Line,
    MetaCommand, OptionalLine, Projection, Quad, TexMap, TexMapForm, Transform, Triangle, Vertex,
    Winding,
};
pub use page::{BfcCertification, HistoryEntry, Page, PageHeader, Step, StepRotation};
pub use page_type::{normalize_target, PageType, ReleaseStatus};
pub use reference::{Reference, ResolutionSlot, ResolutionState};
