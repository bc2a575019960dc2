use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
    path::PathBuf,
};

/// A raw filesystem observation, produced by the library watcher and consumed by
/// [crate::library::LibraryIndex::apply]. The watcher never touches the index directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsMessage {
    Created(PathBuf),
    Removed(PathBuf),
    /// From path, To path
    Renamed(PathBuf, PathBuf),
    Modified(PathBuf),
}

impl FsMessage {
    pub fn paths(&self) -> Vec<&PathBuf> {
        match self {
            FsMessage::Created(p) | FsMessage::Removed(p) | FsMessage::Modified(p) => vec![p],
            FsMessage::Renamed(from, to) => vec![from, to],
        }
    }
}

impl Display for FsMessage {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            FsMessage::Created(p) => write!(f, "Created({})", p.display()),
            FsMessage::Removed(p) => write!(f, "Removed({})", p.display()),
            FsMessage::Renamed(from, to) => {
                write!(f, "Renamed({} -> {})", from.display(), to.display())
            }
            FsMessage::Modified(p) => write!(f, "Modified({})", p.display()),
        }
    }
}

/// Coalesced set of target keys affected by one batch of filesystem messages.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryChange {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    /// Old target key -> new target key, for files that moved without a replacement.
    pub renamed: BTreeMap<String, String>,
}

impl LibraryChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.renamed.is_empty()
    }

    pub fn record_added(&mut self, key: &str) {
        // A key removed earlier in the same batch that comes back is a modification.
        if self.removed.remove(key) {
            self.modified.insert(key.to_string());
        } else if !self.modified.contains(key) {
            self.added.insert(key.to_string());
        }
    }

    pub fn record_removed(&mut self, key: &str) {
        if !self.added.remove(key) {
            self.modified.remove(key);
            self.removed.insert(key.to_string());
        }
    }

    pub fn record_modified(&mut self, key: &str) {
        if !self.added.contains(key) {
            self.removed.remove(key);
            self.modified.insert(key.to_string());
        }
    }

    /// Every key whose cached documents are no longer trustworthy.
    pub fn stale_keys(&self) -> BTreeSet<String> {
        self.removed
            .iter()
            .chain(self.modified.iter())
            .chain(self.renamed.keys())
            .cloned()
            .collect()
    }

    pub fn merge(&mut self, other: LibraryChange) {
        for key in other.removed.iter() {
            self.record_removed(key);
        }
        for key in other.added.iter() {
            self.record_added(key);
        }
        for key in other.modified.iter() {
            self.record_modified(key);
        }
        self.renamed.extend(other.renamed);
    }
}

impl Display for LibraryChange {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "LibraryChange(added: {}, removed: {}, modified: {}, renamed: {})",
            self.added.len(),
            self.removed.len(),
            self.modified.len(),
            self.renamed.len()
        )
    }
}

/// Notifications raised by [crate::cache::DocumentCache] to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// A document was frozen and published under this key.
    Published(String),
    /// The entry for this key was removed and its document released.
    Removed(String),
}

impl Display for CacheEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CacheEvent::Published(key) => write!(f, "Published({key})"),
            CacheEvent::Removed(key) => write!(f, "Removed({key})"),
        }
    }
}
