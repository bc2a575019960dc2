//! # Library Service
//!
//! [`LibraryService`] owns one [`LibraryIndex`], one [`DocumentCache`] over it and one
//! [`DependencyDispatcher`], and hands out [`ReferenceResolver`]s that share them. With the
//! `service` feature it can also keep the index live by watching the search path.
//!
//! ```rust,no_run
//! use ldraw_core::{config::LibraryConfig, service::LibraryService, codec::no_progress};
//! use std::path::{Path, PathBuf};
//!
//! let service = LibraryService::new(LibraryConfig::new(vec![PathBuf::from("/opt/ldraw")]))?;
//! let document = service.open(Path::new("/home/me/car.ldr"), &mut no_progress)?;
//! for page in document.pages() {
//!     for reference in page.references() {
//!         println!("{} -> {:?}", reference.target_name(), reference.state());
//!     }
//! }
//! # Ok::<(), ldraw_core::LDrawError>(())
//! ```
//!
//! ## Change Processing
//!
//! A batch of [`FsMessage`]s is processed in a fixed order, whether it comes from the watcher
//! or from [`LibraryService::apply`]:
//!
//! 1. the index applies the batch and reports a coalesced [`LibraryChange`]
//! 2. the cache force-evicts every stale key, and every cached document that depends on an
//!    affected key, transitively
//! 3. the dispatcher invalidates (or, for renames, retargets) every dependent reference, then
//!    invalidates the references to each document evicted in step 2
//! 4. the change is broadcast to index subscribers

use std::{
    path::Path,
    sync::{mpsc::Receiver, Arc},
};

#[cfg(feature = "service")]
use parking_lot::Mutex;

use crate::{
    cache::DocumentCache,
    codec::{no_progress, ProgressFn},
    config::{LibraryConfig, LibraryConfigProvider},
    error::LDrawError,
    event::{FsMessage, LibraryChange},
    library::{LibraryIndex, SearchPath},
    model::Document,
    resolver::{DependencyDispatcher, DependencyKey, ReferenceResolver},
};

#[cfg(feature = "service")]
use crate::library::LibraryWatcher;

/// Apply a batch of filesystem messages to the shared services. See the module documentation
/// for the order of operations.
pub(crate) fn process_messages(
    index: &LibraryIndex,
    cache: &DocumentCache,
    dispatcher: &DependencyDispatcher,
    messages: &[FsMessage],
) -> LibraryChange {
    let change = index.apply(messages);
    if change.is_empty() {
        return change;
    }
    let evicted = cache.on_library_change(&change);
    let mut invalidated = dispatcher.on_library_change(&change);
    // Cached documents evicted for depending on a changed file are stale for their users too.
    for key in evicted.iter() {
        invalidated += dispatcher.invalidate(&DependencyKey::Library(key.clone()));
    }
    tracing::debug!(
        "{change}: {} cache entries evicted, {invalidated} references reset",
        evicted.len()
    );
    index.broadcast(&change);
    change
}

pub struct LibraryService {
    config: LibraryConfig,
    index: Arc<LibraryIndex>,
    cache: DocumentCache,
    dispatcher: Arc<DependencyDispatcher>,
    #[cfg(feature = "service")]
    watcher: Mutex<Option<LibraryWatcher>>,
}

impl LibraryService {
    /// Build (or reload from the configured snapshot) the library index.
    pub fn new(config: LibraryConfig) -> Result<Self, LDrawError> {
        Self::with_progress(config, &mut no_progress)
    }

    #[tracing::instrument(skip_all)]
    pub fn with_progress(
        config: LibraryConfig,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Self, LDrawError> {
        for root in config.missing_roots() {
            tracing::warn!("Search path root {root:?} does not exist");
        }
        let search_path = SearchPath::new(config.search_path.clone());
        let index = match config.index_cache.as_deref() {
            Some(snapshot) => LibraryIndex::load_or_build(search_path, snapshot, progress)?,
            None => LibraryIndex::build_with_progress(search_path, progress)?,
        };
        let index = Arc::new(index);
        Ok(LibraryService {
            cache: DocumentCache::new(index.clone()),
            index,
            dispatcher: Arc::new(DependencyDispatcher::new()),
            config,
            #[cfg(feature = "service")]
            watcher: Mutex::new(None),
        })
    }

    pub fn from_provider(provider: &dyn LibraryConfigProvider) -> Result<Self, LDrawError> {
        Self::new(provider.get_library()?)
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<LibraryIndex> {
        &self.index
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Arc<DependencyDispatcher> {
        &self.dispatcher
    }

    pub fn resolver(&self) -> ReferenceResolver {
        ReferenceResolver::new(self.cache.clone(), self.dispatcher.clone())
    }

    /// Parse a document and resolve all of its references against the library.
    pub fn open(&self, path: &Path, progress: &mut ProgressFn<'_>) -> Result<Document, LDrawError> {
        self.resolver().load_document(path, progress)
    }

    /// Process filesystem messages synchronously, as the watcher would.
    pub fn apply(&self, messages: &[FsMessage]) -> LibraryChange {
        process_messages(&self.index, &self.cache, &self.dispatcher, messages)
    }

    pub fn subscribe(&self) -> Receiver<LibraryChange> {
        self.index.subscribe()
    }

    /// Persist the index to the configured snapshot path, if any.
    pub fn save_index(&self) -> Result<bool, LDrawError> {
        match self.config.index_cache.as_deref() {
            Some(path) => {
                self.index.save(path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Watch every search-path root. Changes are processed on the watcher's worker thread and
    /// the snapshot, if configured, is rewritten after each batch.
    #[cfg(feature = "service")]
    pub fn start_watching(&self) -> Result<(), LDrawError> {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return Err(LDrawError::Custom(
                "library service is already watching its search path".to_string(),
            ));
        }
        let index = self.index.clone();
        let cache = self.cache.clone();
        let dispatcher = self.dispatcher.clone();
        let snapshot = self.config.index_cache.clone();
        *watcher = Some(LibraryWatcher::start(
            &self.config.search_path,
            self.config.debounce(),
            move |messages| {
                let change = process_messages(&index, &cache, &dispatcher, &messages);
                if change.is_empty() {
                    return;
                }
                if let Some(snapshot) = snapshot.as_deref() {
                    if let Err(e) = index.save(snapshot) {
                        tracing::warn!("Could not save index snapshot to {snapshot:?}: {e}");
                    }
                }
            },
        )?);
        Ok(())
    }

    #[cfg(feature = "service")]
    pub fn stop_watching(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    #[cfg(feature = "service")]
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }
}
