//! Parsing LDraw source into the [model](crate::model) tree.
//!
//! ## Key Components
//!
//! - [`PageParser`] - one page of line-oriented source into a [`Page`](crate::model::Page)
//! - [`DocumentParser`] - a whole (possibly multi-part) file into a
//!   [`Document`](crate::model::Document)
//! - [`scanner`] - header-only scan used by the [library index](crate::library::LibraryIndex)
//! - [`PageWriter`] - the tree back to canonical source
//! - [`ParseDiagnostic`] - non-fatal findings: deactivated lines, repaired structure
//!
//! ## Error Policy
//!
//! Unknown, duplicate or malformed header and meta lines never fail a parse. They are kept
//! verbatim as deactivated comments and reported as diagnostics. Geometry lines (types 1-5) with
//! the wrong number or type of fields, and non-numeric `ROTSTEP`/`!TEXMAP` arguments, abort with
//! [`LDrawError::Syntax`](crate::LDrawError::Syntax) carrying the path, line text and 1-based line
//! number.
//!
//! ## Progress
//!
//! Every emitted element is reported as `(element_kind, percent)`, with the percentage scaled to
//! `0..=50` by bytes consumed. Returning `false` aborts the parse with
//! [`LDrawError::OperationCancelled`](crate::LDrawError::OperationCancelled).
//!
//! ```rust
//! use ldraw_core::codec::{no_progress, DocumentParser};
//!
//! let source = "0 Brick 1 x 2\n0 !LDRAW_ORG Part\n1 16 0 0 0 1 0 0 0 1 0 0 0 1 s\\3004s01.dat\n";
//! let document = DocumentParser::parse(source, None, &mut no_progress).unwrap();
//! let page = document.main_page().unwrap();
//! assert_eq!(page.title().as_deref(), Some("Brick 1 x 2"));
//! assert_eq!(page.references()[0].target_name(), "s\\3004s01.dat");
//! ```

use std::path::Path;

use crate::error::LDrawError;

pub mod diagnostic;
pub mod document;
mod header;
mod line;
mod meta;
pub mod parser;
pub mod scanner;
pub mod writer;

pub use diagnostic::ParseDiagnostic;
pub use document::DocumentParser;
pub use parser::PageParser;
pub use scanner::{scan_file, scan_header, HeaderSummary};
pub use writer::PageWriter;

/// Progress callback: `(element_kind, percent)`, return `false` to cancel.
pub type ProgressFn<'a> = dyn FnMut(&str, u8) -> bool + 'a;

/// A progress callback that never cancels.
pub fn no_progress(_element: &str, _percent: u8) -> bool {
    true
}

/// Read a source file as text. LDraw files predate UTF-8; invalid sequences are replaced rather
/// than rejected, and a leading byte-order mark is dropped.
pub fn read_source(path: &Path) -> Result<String, LDrawError> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}
