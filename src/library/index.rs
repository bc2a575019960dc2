use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::mpsc::{channel, Receiver, Sender},
};
use walkdir::WalkDir;

use crate::{
    codec::{no_progress, scan_file, ProgressFn},
    error::LDrawError,
    event::{FsMessage, LibraryChange},
    library::card::{IndexCard, Location, SearchPath},
    model::normalize_target,
};

/// Card table keyed by target key.
pub(crate) type CardMap = BTreeMap<String, IndexCard>;

/// Counts reported by a walk of the search path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub scanned: usize,
    pub reused: usize,
    pub shadowed: usize,
    pub failed: usize,
}

/// Searchable catalogue of every library file on the search path.
///
/// One card per target key: when several files provide the same key, the one with the lowest
/// rank wins. The table is guarded by an `RwLock` held only for lookups and mutations, never
/// while reading files.
#[derive(Debug)]
pub struct LibraryIndex {
    search_path: SearchPath,
    cards: RwLock<CardMap>,
    subscribers: Mutex<Vec<Sender<LibraryChange>>>,
}

impl LibraryIndex {
    /// An empty index over `search_path`. See [LibraryIndex::build] and
    /// [LibraryIndex::load_or_build].
    pub fn new(search_path: SearchPath) -> Self {
        LibraryIndex {
            search_path,
            cards: RwLock::new(CardMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Walk the search path and scan every library file's header.
    pub fn build(search_path: SearchPath) -> Result<Self, LDrawError> {
        Self::build_with_progress(search_path, &mut no_progress)
    }

    /// As [LibraryIndex::build], reporting `(file_name, percent)` per file. Returning `false`
    /// from the callback aborts with [LDrawError::OperationCancelled].
    #[tracing::instrument(skip_all)]
    pub fn build_with_progress(
        search_path: SearchPath,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Self, LDrawError> {
        let index = LibraryIndex::new(search_path);
        let (cards, stats) = index.walk(None, progress)?;
        tracing::info!(
            "Built library index: {} cards ({} files scanned, {} shadowed, {} failed)",
            cards.len(),
            stats.scanned,
            stats.shadowed,
            stats.failed
        );
        index.replace_cards(cards);
        Ok(index)
    }

    /// Library files under the search path, roots in order and names sorted within each root.
    /// Hidden files and directories are skipped.
    fn library_files(&self) -> Vec<(PathBuf, Location)> {
        let mut files = Vec::new();
        for root in self.search_path.roots() {
            if !root.is_dir() {
                tracing::warn!("Library root {root:?} is not a directory, skipping");
                continue;
            }
            let walker = WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
                });
            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        if let Some(location) = self.search_path.locate(entry.path()) {
                            files.push((entry.into_path(), location));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("{}", LDrawError::from(e)),
                }
            }
        }
        files
    }

    /// Walk the search path. Cards in `previous` whose file is unchanged (same path, rank, key
    /// and mtime) are reused instead of re-scanned. Unreadable files are logged and skipped.
    pub(crate) fn walk(
        &self,
        previous: Option<&HashMap<PathBuf, IndexCard>>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<(CardMap, WalkStats), LDrawError> {
        let files = self.library_files();
        let total = files.len().max(1);
        let mut cards = CardMap::new();
        let mut stats = WalkStats::default();

        for (position, (path, location)) in files.into_iter().enumerate() {
            let percent = (position * 100 / total) as u8;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !progress(&file_name, percent) {
                return Err(LDrawError::OperationCancelled);
            }
            if cards
                .get(&location.key)
                .is_some_and(|existing: &IndexCard| existing.rank <= location.rank)
            {
                stats.shadowed += 1;
                continue;
            }
            let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!("Could not stat {path:?}: {e}");
                    stats.failed += 1;
                    continue;
                }
            };
            let reusable = previous.and_then(|previous| previous.get(&path)).filter(|card| {
                card.modified == modified
                    && card.rank == location.rank
                    && card.target_key == location.key
            });
            let card = match reusable {
                Some(card) => {
                    stats.reused += 1;
                    card.clone()
                }
                None => match scan_card(location.clone(), &path) {
                    Ok(card) => {
                        stats.scanned += 1;
                        card
                    }
                    Err(e) => {
                        tracing::warn!("Could not index {path:?}: {e}");
                        stats.failed += 1;
                        continue;
                    }
                },
            };
            if cards.insert(location.key, card).is_some() {
                stats.shadowed += 1;
            }
        }
        progress("", 100);
        Ok((cards, stats))
    }

    pub(crate) fn replace_cards(&self, cards: CardMap) {
        *self.cards.write() = cards;
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn len(&self) -> usize {
        self.cards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.read().is_empty()
    }

    /// The card for a target name, in any spelling.
    pub fn get(&self, target: &str) -> Option<IndexCard> {
        self.cards.read().get(&normalize_target(target)).cloned()
    }

    /// Snapshot of every card, ordered by target key.
    pub fn cards(&self) -> Vec<IndexCard> {
        self.cards.read().values().cloned().collect()
    }

    /// Target key and rank a file would have, whether or not it is indexed.
    pub fn locate(&self, path: &Path) -> Option<Location> {
        self.search_path.locate(path)
    }

    /// The target key served by exactly this file, if it is the indexed provider of its key.
    pub fn key_for_path(&self, path: &Path) -> Option<String> {
        let location = self.search_path.locate(path)?;
        self.cards
            .read()
            .get(&location.key)
            .filter(|card| card.path == path)
            .map(|card| card.target_key.clone())
    }

    /// Probe the filesystem directly, bypassing the card table. Finds files the index has not
    /// caught up with yet.
    pub fn scan_search_path(&self, target: &str) -> Option<PathBuf> {
        self.search_path
            .probe(&normalize_target(target))
            .into_iter()
            .next()
            .map(|(_, path)| path)
    }

    /// Apply one batch of filesystem observations and return the coalesced change.
    ///
    /// - created/modified: the file's card is inserted, or replaces the existing card when it is
    ///   the same file with a new mtime or ranks strictly lower; otherwise the file is shadowed
    ///   or unchanged and ignored
    /// - removed: if the file was the indexed provider, the best remaining file for the key takes
    ///   over (reported as modified), else the key is removed
    /// - renamed: a removal plus a creation; when the old key disappears and the new file serves
    ///   a different key the pair is reported as renamed
    #[tracing::instrument(skip_all, fields(messages = messages.len()))]
    pub fn apply(&self, messages: &[FsMessage]) -> LibraryChange {
        let mut change = LibraryChange::default();
        for message in messages {
            tracing::debug!("Applying {message}");
            match message {
                FsMessage::Created(path) | FsMessage::Modified(path) => {
                    self.upsert(path, &mut change);
                }
                FsMessage::Removed(path) => {
                    self.remove(path, &mut change);
                }
                FsMessage::Renamed(from, to) => {
                    let old = self.remove(from, &mut change);
                    let new = self.upsert(to, &mut change);
                    if let (Some(old), Some(new)) = (old, new) {
                        if old != new {
                            change.renamed.insert(old, new);
                        }
                    }
                }
            }
        }
        if !change.is_empty() {
            tracing::info!("Library index updated: {change}");
        }
        change
    }

    /// Returns the key now served by `path`, if any.
    fn upsert(&self, path: &Path, change: &mut LibraryChange) -> Option<String> {
        let location = self.search_path.locate(path)?;
        let card = match scan_card(location.clone(), path) {
            Ok(card) => card,
            Err(e) => {
                tracing::debug!("Ignoring {path:?}: {e}");
                return None;
            }
        };
        let key = location.key;
        let mut cards = self.cards.write();
        match cards.get(&key) {
            None => {
                cards.insert(key.clone(), card);
                change.record_added(&key);
            }
            Some(existing) if existing.path == path && existing.modified == card.modified => {
                tracing::trace!("{path:?} is unchanged");
            }
            Some(existing) if existing.path == path || card.rank < existing.rank => {
                cards.insert(key.clone(), card);
                change.record_modified(&key);
            }
            Some(existing) => {
                tracing::debug!(
                    "{path:?} (rank {}) is shadowed by {:?} (rank {})",
                    card.rank,
                    existing.path,
                    existing.rank
                );
                return None;
            }
        }
        Some(key)
    }

    /// Returns the key if it disappeared from the index.
    fn remove(&self, path: &Path, change: &mut LibraryChange) -> Option<String> {
        let location = self.search_path.locate(path)?;
        let indexed = self
            .cards
            .read()
            .get(&location.key)
            .is_some_and(|card| card.path == path);
        if !indexed {
            return None;
        }

        let replacement = self
            .search_path
            .probe(&location.key)
            .into_iter()
            .filter(|(_, candidate)| candidate != path)
            .find_map(|(_, candidate)| {
                let candidate_location = self.search_path.locate(&candidate)?;
                if candidate_location.key != location.key {
                    return None;
                }
                scan_card(candidate_location, &candidate).ok()
            });

        let mut cards = self.cards.write();
        match replacement {
            Some(card) => {
                tracing::info!(
                    "{} now provided by {:?} after removal of {path:?}",
                    location.key,
                    card.path
                );
                cards.insert(location.key.clone(), card);
                change.record_modified(&location.key);
                None
            }
            None => {
                cards.remove(&location.key);
                change.record_removed(&location.key);
                Some(location.key)
            }
        }
    }

    /// Register for coalesced changes. Receivers that hang up are dropped on the next broadcast.
    pub fn subscribe(&self) -> Receiver<LibraryChange> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn broadcast(&self, change: &LibraryChange) {
        if change.is_empty() {
            return;
        }
        self.subscribers
            .lock()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }
}

fn scan_card(location: Location, path: &Path) -> Result<IndexCard, LDrawError> {
    let modified = fs::metadata(path)?.modified()?;
    let summary = scan_file(path)?;
    Ok(IndexCard::new(location, path.to_path_buf(), modified, summary))
}
