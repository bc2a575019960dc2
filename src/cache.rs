//! Process-wide cache of frozen library documents.
//!
//! Every file loaded through the cache exists once in memory. Callers hold a [CachedDocument]
//! claim for as long as they use the document; the entry is evicted when the last claim is
//! released or when the library changes underneath it.
//!
//! One mutex guards the entry table. It is never held while reading or parsing a file, since a
//! load resolves the new document's own references and may re-enter the cache.

use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    path::{Path, PathBuf},
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc, Weak,
    },
};

use crate::{
    error::LDrawError,
    event::{CacheEvent, LibraryChange},
    library::{card::find_path, LibraryIndex},
    model::{normalize_target, page_type::is_rooted, Document},
    resolver::DependencyKey,
};

/// Builds a document for the cache. Implementations must return a fully self-consistent
/// document: every reference it contains already resolved.
pub trait DocumentLoader {
    fn load(&self, key: &str, path: &Path) -> Result<Document, LDrawError>;
}

/// Where a load candidate came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Absolute,
    Relative,
    Index,
    SearchPath,
}

impl CandidateSource {
    fn is_library(&self) -> bool {
        matches!(self, CandidateSource::Index | CandidateSource::SearchPath)
    }
}

#[derive(Debug)]
struct CacheEntry {
    document: Arc<Document>,
    refcount: usize,
    path: PathBuf,
}

#[derive(Debug)]
struct CacheInner {
    index: Arc<LibraryIndex>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    subscribers: Mutex<Vec<Sender<CacheEvent>>>,
}

impl CacheInner {
    /// Lock order: `entries` before `subscribers`.
    fn notify(&self, event: CacheEvent) {
        tracing::trace!("Cache event {event}");
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Remove the entry for `key` when `document` is still the cached one and either the last
    /// claim is gone or eviction is forced. Returns the evicted document, to be dropped by the
    /// caller after the lock is released.
    fn release(&self, key: &str, document: &Arc<Document>, force_evict: bool) -> Option<Arc<Document>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key)?;
        if !Arc::ptr_eq(&entry.document, document) {
            // The entry was evicted and reloaded since this claim was taken.
            return None;
        }
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount > 0 && !force_evict {
            return None;
        }
        let evicted = entries.remove(key)?;
        tracing::debug!("Evicting {key} from the document cache");
        self.notify(CacheEvent::Removed(key.to_string()));
        Some(evicted.document)
    }
}

/// A claim on a cached document. Dropping it releases the claim.
pub struct CachedDocument {
    key: String,
    document: Arc<Document>,
    cache: Weak<CacheInner>,
    force_evict: bool,
}

impl CachedDocument {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }
}

impl fmt::Debug for CachedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedDocument")
            .field("key", &self.key)
            .field("document", &self.document.id())
            .finish()
    }
}

impl Drop for CachedDocument {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            let evicted = cache.release(&self.key, &self.document, self.force_evict);
            // Disposal may release claims held by the evicted document's own references.
            drop(evicted);
        }
    }
}

/// Shared, reference-counted store of frozen documents keyed by target key. Cloning yields
/// another handle to the same cache.
#[derive(Debug, Clone)]
pub struct DocumentCache {
    inner: Arc<CacheInner>,
}

impl DocumentCache {
    pub fn new(index: Arc<LibraryIndex>) -> Self {
        DocumentCache {
            inner: Arc::new(CacheInner {
                index,
                entries: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn index(&self) -> &Arc<LibraryIndex> {
        &self.inner.index
    }

    /// Claim the document for `target`, loading it on a miss.
    ///
    /// A hit increments the entry's claim count. On a miss the candidates are tried in order:
    /// the target as an absolute path, relative to the requesting document's folder, the index
    /// card, then a raw scan of the search path. The first candidate that loads becomes the
    /// entry.
    ///
    /// Returns `Ok(None)` when no candidate file exists. When every existing candidate fails,
    /// the last failure is returned. A [LDrawError::CircularReference] from the loader aborts
    /// the search immediately.
    pub fn claim(
        &self,
        target: &str,
        requester: Option<&Path>,
        loader: &dyn DocumentLoader,
    ) -> Result<Option<CachedDocument>, LDrawError> {
        let key = normalize_target(target);
        if let Some(hit) = self.claim_existing(&key) {
            tracing::debug!("Cache hit for {key}");
            return Ok(Some(hit));
        }
        tracing::debug!("Cache miss for {key}");

        let mut failure = None;
        for (source, path) in self.candidates(target, &key, requester) {
            match loader.load(&key, &path) {
                Ok(mut document) => {
                    document.set_library_part(source.is_library());
                    return Ok(Some(self.publish(&key, path, document)));
                }
                Err(e @ LDrawError::CircularReference { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!("Could not load {path:?} ({source:?}) for {key}: {e}");
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    fn claim_existing(&self, key: &str) -> Option<CachedDocument> {
        let mut entries = self.inner.entries.lock();
        let entry = entries.get_mut(key)?;
        entry.refcount += 1;
        Some(CachedDocument {
            key: key.to_string(),
            document: entry.document.clone(),
            cache: Arc::downgrade(&self.inner),
            force_evict: false,
        })
    }

    /// Existing files that could provide `target`, in priority order, without duplicates.
    pub fn candidates(
        &self,
        target: &str,
        key: &str,
        requester: Option<&Path>,
    ) -> Vec<(CandidateSource, PathBuf)> {
        let mut candidates: Vec<(CandidateSource, PathBuf)> = Vec::new();
        let mut push = |source, path: PathBuf| {
            if !candidates.iter().any(|(_, existing)| existing == &path) {
                candidates.push((source, path));
            }
        };

        if is_rooted(target) {
            let path = PathBuf::from(target.trim());
            if path.is_file() {
                push(CandidateSource::Absolute, path);
            }
        }
        let relative: Vec<&str> = target
            .trim()
            .split(['\\', '/'])
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();
        if let Some(dir) = requester.and_then(Path::parent) {
            if let Some(path) = find_path(dir, &relative) {
                push(CandidateSource::Relative, path);
            }
        }
        if let Some(card) = self.inner.index.get(key) {
            if card.path.is_file() {
                push(CandidateSource::Index, card.path);
            }
        }
        if let Some(path) = self.inner.index.scan_search_path(key) {
            push(CandidateSource::SearchPath, path);
        }
        candidates
    }

    /// Freeze and store a freshly loaded document. If another caller published the same key in
    /// the meantime, theirs wins: the claim is taken on the existing entry and `document` is
    /// discarded.
    fn publish(&self, key: &str, path: PathBuf, mut document: Document) -> CachedDocument {
        document.freeze();
        let document = Arc::new(document);
        let (claimed, discarded) = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(key) {
                Some(existing) => {
                    tracing::debug!("Lost publish race for {key}, discarding duplicate load");
                    existing.refcount += 1;
                    (existing.document.clone(), Some(document))
                }
                None => {
                    entries.insert(
                        key.to_string(),
                        CacheEntry {
                            document: document.clone(),
                            refcount: 1,
                            path,
                        },
                    );
                    self.inner.notify(CacheEvent::Published(key.to_string()));
                    (document, None)
                }
            }
        };
        drop(discarded);
        CachedDocument {
            key: key.to_string(),
            document: claimed,
            cache: Arc::downgrade(&self.inner),
            force_evict: false,
        }
    }

    /// Give a claim back. With `force_evict` the entry is removed even if other claims remain;
    /// their later releases are no-ops.
    pub fn release(&self, mut claim: CachedDocument, force_evict: bool) {
        claim.force_evict = force_evict;
        drop(claim);
    }

    /// Remove an entry regardless of outstanding claims.
    pub fn evict(&self, key: &str) -> bool {
        let evicted = {
            let mut entries = self.inner.entries.lock();
            let evicted = entries.remove(key);
            if evicted.is_some() {
                tracing::debug!("Force-evicting {key} from the document cache");
                self.inner.notify(CacheEvent::Removed(key.to_string()));
            }
            evicted
        };
        evicted.is_some()
    }

    /// Force-evict every entry the change makes stale, together with every cached document
    /// whose memoised references depend on an affected key, transitively. Returns the evicted
    /// keys; references to them elsewhere must be invalidated by the caller.
    pub fn on_library_change(&self, change: &LibraryChange) -> Vec<String> {
        let mut stale = change.stale_keys();
        let mut affected: BTreeSet<String> = stale.clone();
        affected.extend(change.added.iter().cloned());
        affected.extend(change.renamed.values().cloned());

        let cached: Vec<(String, Arc<Document>)> = self
            .inner
            .entries
            .lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.document.clone()))
            .collect();
        loop {
            let dependents: Vec<String> = cached
                .iter()
                .filter(|(key, document)| {
                    !stale.contains(key) && depends_on_any(document, &affected)
                })
                .map(|(key, _)| key.clone())
                .collect();
            if dependents.is_empty() {
                break;
            }
            for key in dependents {
                tracing::debug!("{key} depends on a changed library file");
                affected.insert(key.clone());
                stale.insert(key);
            }
        }
        drop(cached);

        stale.into_iter().filter(|key| self.evict(key)).collect()
    }

    /// Register for cache events. Every entry already cached is reported immediately as
    /// [CacheEvent::Published].
    pub fn subscribe(&self) -> Receiver<CacheEvent> {
        let (tx, rx) = channel();
        let entries = self.inner.entries.lock();
        for key in entries.keys() {
            // The receiver is alive, send cannot fail.
            let _ = tx.send(CacheEvent::Published(key.clone()));
        }
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// The cached document for a key, without claiming it.
    pub fn lookup(&self, target: &str) -> Option<Arc<Document>> {
        self.inner
            .entries
            .lock()
            .get(&normalize_target(target))
            .map(|entry| entry.document.clone())
    }

    /// Outstanding claims on a cached key.
    pub fn claim_count(&self, target: &str) -> Option<usize> {
        self.inner
            .entries
            .lock()
            .get(&normalize_target(target))
            .map(|entry| entry.refcount)
    }

    pub fn path_of(&self, target: &str) -> Option<PathBuf> {
        self.inner
            .entries
            .lock()
            .get(&normalize_target(target))
            .map(|entry| entry.path.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }
}

/// Whether any reference in `document` holds a memo that came from one of `keys`.
fn depends_on_any(document: &Document, keys: &BTreeSet<String>) -> bool {
    let mut found = false;
    document.for_each_reference(&mut |_, reference| {
        if let Some(DependencyKey::Library(key)) = reference.slot().dependency() {
            found |= keys.contains(&key);
        }
    });
    found
}
