//! # ldraw-core
//!
//! A document model for the line-oriented LDraw 3-D model format: a tolerant parser, lazy
//! cross-document reference resolution, and a live index over the on-disk parts library with a
//! shared cache of loaded files.
//!
//! ## Overview
//!
//! LDraw files describe *pages* (models, parts, sub-parts, primitives) built from *steps* of
//! elements. A page places other pages by name through type-1 reference lines, so one model
//! pulls in a large, possibly recursive graph of files from a shared library. ldraw-core turns
//! that graph into an in-memory tree where:
//!
//! - every file is parsed once and shared read-only through the [`cache::DocumentCache`]
//! - references resolve lazily, are memoised, and never own what they point at
//! - cycles, whether within a multi-part file or across several files, are detected rather
//!   than recursed into
//! - the [`library::LibraryIndex`] follows the library on disk, and the references and cache
//!   entries it invalidates are recomputed on next access
//!
//! ## Architecture
//!
//! - **[`model`]**: [`model::Document`], [`model::Page`], steps, elements and references
//! - **[`codec`]**: [`codec::PageParser`] and [`codec::DocumentParser`], the header scanner used
//!   by the index, and [`codec::PageWriter`] for re-emitting source
//! - **[`library`]**: search-path ranking, the index, its snapshot, and the filesystem watcher
//! - **[`cache`]**: claim/release of frozen documents
//! - **[`resolver`]**: [`resolver::ReferenceResolver`] and the
//!   [`resolver::DependencyDispatcher`] that fans out invalidations
//! - **[`service`]**: [`service::LibraryService`], wiring the above together
//! - **[`config`]**: the `[library]` configuration table
//! - **[`event`]**: filesystem messages, library changes and cache events
//!
//! ## Quick Start
//!
//! ```rust
//! use ldraw_core::{codec::{no_progress, DocumentParser}, model::ResolutionState};
//! use ldraw_core::{cache::DocumentCache, library::{LibraryIndex, SearchPath}};
//! use ldraw_core::resolver::{DependencyDispatcher, ReferenceResolver};
//! use std::sync::Arc;
//!
//! let source = "0 FILE car.ldr\n\
//!               1 4 0 0 0 1 0 0 0 1 0 0 0 1 wheel.ldr\n\
//!               0 FILE wheel.ldr\n\
//!               0 Wheel assembly\n";
//! let document = DocumentParser::parse(source, None, &mut no_progress)?;
//!
//! let index = Arc::new(LibraryIndex::new(SearchPath::default()));
//! let resolver = ReferenceResolver::new(DocumentCache::new(index), Arc::new(DependencyDispatcher::new()));
//! let summary = resolver.resolve_all(&document);
//! assert_eq!(summary.resolved, 1);
//!
//! let car = document.main_page().unwrap();
//! assert_eq!(car.references()[0].state(), ResolutionState::Resolved);
//! # Ok::<(), ldraw_core::LDrawError>(())
//! ```
//!
//! ## Features
//!
//! - **default**: `service`
//! - **service**: filesystem monitoring of the search path (`notify`)
//! - **bin**: the `ldraw` command-line tool

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod library;
pub mod model;
pub mod resolver;
pub mod service;
#[cfg(test)]
mod tests;

pub use error::*;
