//! Reference resolution: from a type-1 line's target name to the [Page] it places.
//!
//! ## Resolution Order
//!
//! 1. A target naming the containing page itself is a [ResolutionState::CircularReference].
//! 2. Pages of the containing document.
//! 3. Pages of the override context document, if any.
//! 4. The [DocumentCache], which loads from an absolute path, the requesting document's folder,
//!    the library index or a raw search-path scan.
//!
//! ## Cycles
//!
//! A [LoadChain] of the target keys currently being resolved is threaded through every nested
//! resolution and load. Meeting a key already on the chain is a cycle, whether it spans pages
//! of one document or several files. Loads that hit a cycle fail as a whole, so nothing cyclic
//! is ever published. After a target is accepted its resolved subtree is checked once more for
//! any key on the chain, which catches cycles closed through documents that were already
//! cached.
//!
//! ## Invalidation
//!
//! Every memoised outcome is registered with the [DependencyDispatcher] under one
//! [DependencyKey]. Library changes, file renames and page renames are fanned out through it;
//! affected references go back to `Unresolved` and are recomputed on next access.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::Path,
    sync::{Arc, Weak},
};

use crate::{
    cache::{DocumentCache, DocumentLoader},
    codec::{no_progress, DocumentParser, ProgressFn},
    error::LDrawError,
    event::LibraryChange,
    model::{
        normalize_target, reference::Resolution, Document, DocumentId, Page, Reference,
        ResolutionSlot, ResolutionState,
    },
};

/// The single source a memoised resolution depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKey {
    /// A target key served by the library (or a file next to the requesting document).
    Library(String),
    /// A page of a specific in-memory document.
    Page { document: DocumentId, target: String },
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKey::Library(key) => write!(f, "library:{key}"),
            DependencyKey::Page { document, target } => write!(f, "{document}:{target}"),
        }
    }
}

/// Target keys currently being resolved, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadChain {
    keys: Vec<String>,
}

impl LoadChain {
    pub fn root(key: impl Into<String>) -> Self {
        LoadChain {
            keys: vec![key.into()],
        }
    }

    /// The chain extended by `key`. Extending by the innermost key is a no-op.
    pub fn with(&self, key: &str) -> LoadChain {
        let mut keys = self.keys.clone();
        if keys.last().map(String::as_str) != Some(key) {
            keys.push(key.to_string());
        }
        LoadChain { keys }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The error for re-entering `key`: the chain from `key`'s first occurrence, closed by `key`.
    pub fn cycle_error(&self, key: &str) -> LDrawError {
        let start = self.keys.iter().position(|k| k == key).unwrap_or(0);
        let mut chain = self.keys[start..].to_vec();
        chain.push(key.to_string());
        LDrawError::CircularReference { chain }
    }
}

/// Fans invalidations out to the resolution slots registered under each [DependencyKey].
///
/// Slots are held weakly: a reference that goes away simply drops out of the table. Slots are
/// collected under the lock and acted on after it is released, since invalidating a slot may
/// release a cache claim.
#[derive(Debug, Default)]
pub struct DependencyDispatcher {
    slots: Mutex<HashMap<DependencyKey, Vec<Weak<ResolutionSlot>>>>,
}

impl DependencyDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: DependencyKey, slot: &Arc<ResolutionSlot>) {
        let mut slots = self.slots.lock();
        let registered = slots.entry(key).or_default();
        registered.retain(|weak| weak.strong_count() > 0);
        if !registered
            .iter()
            .any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(slot)))
        {
            registered.push(Arc::downgrade(slot));
        }
    }

    /// Remove and return the live slots still depending on `key`.
    fn take(&self, key: &DependencyKey) -> Vec<Arc<ResolutionSlot>> {
        let taken = self.slots.lock().remove(key).unwrap_or_default();
        taken
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|slot| slot.depends_on(key))
            .collect()
    }

    /// Clear every memo depending on `key`. Returns how many were cleared.
    pub fn invalidate(&self, key: &DependencyKey) -> usize {
        let slots = self.take(key);
        let count = slots.iter().filter(|slot| slot.invalidate()).count();
        if count > 0 {
            tracing::debug!("Invalidated {count} reference(s) depending on {key}");
        }
        count
    }

    /// Point every reference depending on `key` at `new_name` and clear its memo.
    pub fn retarget(&self, key: &DependencyKey, new_name: &str) -> usize {
        let slots = self.take(key);
        for slot in slots.iter() {
            slot.retarget(new_name);
        }
        if !slots.is_empty() {
            tracing::debug!(
                "Retargeted {} reference(s) from {key} to {new_name}",
                slots.len()
            );
        }
        slots.len()
    }

    /// Renamed files take their references with them; every other affected key is invalidated,
    /// added keys included so that `Missing` references get another chance.
    pub fn on_library_change(&self, change: &LibraryChange) -> usize {
        let mut count = 0;
        for (old, new) in change.renamed.iter() {
            count += self.retarget(&DependencyKey::Library(old.clone()), new);
        }
        for key in change
            .added
            .iter()
            .chain(change.removed.iter())
            .chain(change.modified.iter())
        {
            count += self.invalidate(&DependencyKey::Library(key.clone()));
        }
        count
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .flat_map(|slots| slots.iter())
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts of resolution outcomes over a document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub resolved: usize,
    pub missing: usize,
    pub unloadable: usize,
    pub circular: usize,
}

impl ResolutionSummary {
    fn record(&mut self, state: ResolutionState) {
        match state {
            ResolutionState::Resolved => self.resolved += 1,
            ResolutionState::Missing => self.missing += 1,
            ResolutionState::Unloadable => self.unloadable += 1,
            ResolutionState::CircularReference => self.circular += 1,
            ResolutionState::Unresolved => {}
        }
    }

    pub fn total(&self) -> usize {
        self.resolved + self.missing + self.unloadable + self.circular
    }
}

impl fmt::Display for ResolutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resolved, {} missing, {} unloadable, {} circular",
            self.resolved, self.missing, self.unloadable, self.circular
        )
    }
}

/// Resolves references against documents, the cache and the library. Cheap to clone; clones
/// share the cache and dispatcher.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    cache: DocumentCache,
    dispatcher: Arc<DependencyDispatcher>,
}

impl ReferenceResolver {
    pub fn new(cache: DocumentCache, dispatcher: Arc<DependencyDispatcher>) -> Self {
        ReferenceResolver { cache, dispatcher }
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Arc<DependencyDispatcher> {
        &self.dispatcher
    }

    /// Resolve `reference`, found on `page` of `document`. `override_context` takes precedence
    /// over the reference's own target context. The outcome is memoised on the reference until
    /// it is invalidated; repeated calls return the memo.
    pub fn resolve(
        &self,
        reference: &Reference,
        page: &Page,
        document: &Document,
        override_context: Option<&Document>,
    ) -> ResolutionState {
        let stored = reference.target_context();
        let context = override_context.or(stored.as_deref());
        let chain = LoadChain::root(page.target_key());
        self.resolve_in(reference, page, document, context, &chain)
    }

    /// Resolve every reference of every page of `document`.
    #[tracing::instrument(skip_all, fields(document = %document.id()))]
    pub fn resolve_all(&self, document: &Document) -> ResolutionSummary {
        let mut summary = ResolutionSummary::default();
        for page in document.pages().iter() {
            let chain = LoadChain::root(page.target_key());
            for reference in page.references() {
                let context = reference.target_context();
                summary.record(self.resolve_in(
                    reference,
                    page,
                    document,
                    context.as_deref(),
                    &chain,
                ));
            }
        }
        tracing::debug!("Resolved {}: {summary}", document.id());
        summary
    }

    /// Clear a reference's memo; it is recomputed on next access.
    pub fn invalidate(&self, reference: &Reference) -> bool {
        reference.invalidate()
    }

    /// Rename a page of an unfrozen document. References in the document that named the old
    /// target follow it to the new name; references in other documents that resolved to it
    /// through an override context are retargeted the same way, and anything that named the new
    /// target is invalidated. Returns the new target name.
    pub fn rename_page(
        &self,
        document: &Document,
        target: &str,
        new_name: &str,
    ) -> Result<String, LDrawError> {
        let old_key = normalize_target(target);
        let new_target = document.rename_page(target, new_name)?;
        let new_key = normalize_target(&new_target);
        if new_key == old_key {
            return Ok(new_target);
        }

        let mut followed = 0;
        document.for_each_reference(&mut |_, reference| {
            let key = reference.target_key();
            if key == old_key {
                reference.set_target_name(new_target.clone());
                followed += 1;
            } else if key == new_key {
                reference.invalidate();
            }
        });
        let old_dependency = DependencyKey::Page {
            document: document.id(),
            target: old_key.clone(),
        };
        followed += self.dispatcher.retarget(&old_dependency, &new_target);
        self.dispatcher.invalidate(&DependencyKey::Page {
            document: document.id(),
            target: new_key.clone(),
        });
        self.dispatcher
            .invalidate(&DependencyKey::Library(new_key.clone()));
        tracing::debug!("Renamed {old_key} to {new_key}, {followed} reference(s) followed");
        Ok(new_target)
    }

    /// Parse a file and resolve all of its references. The document is not cached and stays
    /// editable.
    pub fn load_document(
        &self,
        path: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Document, LDrawError> {
        let document = DocumentParser::parse_file(path, progress)?;
        let summary = self.resolve_all(&document);
        tracing::info!("Loaded {path:?}: {summary}");
        Ok(document)
    }

    pub(crate) fn resolve_in(
        &self,
        reference: &Reference,
        page: &Page,
        document: &Document,
        context: Option<&Document>,
        chain: &LoadChain,
    ) -> ResolutionState {
        if let Some(state) = reference.slot().memoized() {
            return state;
        }
        let key = reference.target_key();
        let computed = self.compute(reference, &key, page, document, context, chain);
        let dependency = computed.dependency.clone();
        let state = reference.slot().store(computed);
        if let Some(dependency) = dependency {
            self.dispatcher.register(dependency, reference.slot());
        }
        tracing::trace!("{key} from {} -> {state:?}", page.target_name());
        state
    }

    fn compute(
        &self,
        reference: &Reference,
        key: &str,
        page: &Page,
        document: &Document,
        context: Option<&Document>,
        chain: &LoadChain,
    ) -> Resolution {
        let local = |doc: &Document| DependencyKey::Page {
            document: doc.id(),
            target: key.to_string(),
        };

        if key == page.target_key() || chain.contains(key) {
            let dependency = if document.find_page(key).is_some() {
                local(document)
            } else {
                DependencyKey::Library(key.to_string())
            };
            tracing::debug!("{}", chain.cycle_error(key));
            return circular(dependency);
        }

        if let Some(target) = document.find_page(key) {
            return self.accept_local(target, document, chain, local(document));
        }
        if let Some(context) = context {
            if let Some(target) = context.find_page(key) {
                return self.accept_local(target, context, chain, local(context));
            }
        }

        let dependency = DependencyKey::Library(key.to_string());
        let loader = ChainLoader {
            resolver: self,
            chain: chain.with(key),
        };
        match self
            .cache
            .claim(&reference.target_name(), document.path(), &loader)
        {
            Ok(Some(claim)) => {
                let target = claim
                    .document()
                    .find_page(key)
                    .or_else(|| claim.document().main_page())
                    .cloned();
                let Some(target) = target else {
                    return failed(ResolutionState::Unloadable, dependency);
                };
                if reaches_chain(&target, chain, &mut HashSet::new()) {
                    tracing::debug!("{key} contains {}, rejecting", page.target_name());
                    // Dropping the claim here releases it.
                    return circular(dependency);
                }
                Resolution {
                    state: ResolutionState::Resolved,
                    page: Some(target),
                    claim: Some(claim),
                    dependency: Some(dependency),
                }
            }
            Ok(None) => failed(ResolutionState::Missing, dependency),
            Err(LDrawError::CircularReference { chain }) => {
                tracing::debug!("Circular reference: {}", chain.join(" -> "));
                circular(dependency)
            }
            Err(e) => {
                tracing::debug!("{key} is unloadable: {e}");
                failed(ResolutionState::Unloadable, dependency)
            }
        }
    }

    /// Accept a page of an in-memory document after resolving its own references one level
    /// further down the chain.
    fn accept_local(
        &self,
        target: &Arc<Page>,
        owner: &Document,
        chain: &LoadChain,
        dependency: DependencyKey,
    ) -> Resolution {
        let inner = chain.with(&target.target_key());
        let nested_cycle = target.references().into_iter().any(|reference| {
            let context = reference.target_context();
            self.resolve_in(reference, target, owner, context.as_deref(), &inner)
                == ResolutionState::CircularReference
        });
        if nested_cycle || reaches_chain(target, chain, &mut HashSet::new()) {
            return circular(dependency);
        }
        Resolution {
            state: ResolutionState::Resolved,
            page: Some(target.clone()),
            claim: None,
            dependency: Some(dependency),
        }
    }
}

fn circular(dependency: DependencyKey) -> Resolution {
    failed(ResolutionState::CircularReference, dependency)
}

fn failed(state: ResolutionState, dependency: DependencyKey) -> Resolution {
    Resolution {
        state,
        page: None,
        claim: None,
        dependency: Some(dependency),
    }
}

/// Whether any key on `chain` is named by `page` or by a page it resolves to, transitively.
/// Follows memoised resolutions only.
fn reaches_chain(page: &Arc<Page>, chain: &LoadChain, visited: &mut HashSet<*const Page>) -> bool {
    if !visited.insert(Arc::as_ptr(page)) {
        return false;
    }
    page.references().into_iter().any(|reference| {
        chain.contains(&reference.target_key())
            || reference
                .target()
                .is_some_and(|target| reaches_chain(&target, chain, visited))
    })
}

/// Loads library documents on behalf of the resolver, carrying the chain of the resolution
/// that triggered the load.
struct ChainLoader<'a> {
    resolver: &'a ReferenceResolver,
    chain: LoadChain,
}

impl DocumentLoader for ChainLoader<'_> {
    /// Parse and resolve every reference of every page before the cache publishes the document.
    /// A cycle anywhere inside fails the whole load.
    fn load(&self, key: &str, path: &Path) -> Result<Document, LDrawError> {
        tracing::debug!("Loading {key} from {path:?}");
        let document = DocumentParser::parse_file(path, &mut no_progress)?;
        for page in document.pages().iter() {
            let chain = self.chain.with(&page.target_key());
            for reference in page.references() {
                let context = reference.target_context();
                let state =
                    self.resolver
                        .resolve_in(reference, page, &document, context.as_deref(), &chain);
                if state == ResolutionState::CircularReference {
                    return Err(chain.cycle_error(&reference.target_key()));
                }
            }
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{library::LibraryIndex, model::PageType, tests::helpers::LibraryFixture};

    fn resolver_for(fixture: &LibraryFixture) -> ReferenceResolver {
        let index = Arc::new(LibraryIndex::build(fixture.search_path()).unwrap());
        ReferenceResolver::new(DocumentCache::new(index), Arc::new(DependencyDispatcher::new()))
    }

    fn parse(source: &str) -> Document {
        DocumentParser::parse(source, None, &mut no_progress).unwrap()
    }

    fn first_reference(document: &Document) -> (&Arc<Page>, &Reference) {
        let page = document.main_page().unwrap();
        (page, page.references()[0])
    }

    #[test]
    fn chains() {
        let chain = LoadChain::root("a.dat").with("b.dat").with("b.dat").with("c.dat");
        assert_eq!(chain.keys(), ["a.dat", "b.dat", "c.dat"]);
        assert!(chain.contains("b.dat"));
        assert_eq!(
            chain.cycle_error("b.dat"),
            LDrawError::CircularReference {
                chain: vec!["b.dat".into(), "c.dat".into(), "b.dat".into()]
            }
        );
    }

    #[test_log::test]
    fn same_document_before_library() {
        let fixture = LibraryFixture::new(1);
        fixture.write(0, "parts/wheel.dat", "0 Library wheel\n");
        let resolver = resolver_for(&fixture);
        let document = parse(
            "0 FILE car.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 wheel.dat\n\
             0 FILE wheel.dat\n\
             0 Local wheel\n\
             0 !LDRAW_ORG Part\n",
        );
        let (page, reference) = first_reference(&document);
        assert_eq!(
            resolver.resolve(reference, page, &document, None),
            ResolutionState::Resolved
        );
        let target = reference.target().unwrap();
        assert_eq!(target.title().as_deref(), Some("Local wheel"));
        assert!(document.contains_page(&target));
        assert!(resolver.cache().is_empty());
        assert_eq!(
            reference.slot().dependency(),
            Some(DependencyKey::Page {
                document: document.id(),
                target: "wheel.dat".to_string()
            })
        );
    }

    #[test_log::test]
    fn override_context_before_library() {
        let fixture = LibraryFixture::new(1);
        fixture.write(0, "parts/wheel.dat", "0 Library wheel\n");
        let resolver = resolver_for(&fixture);
        let document = parse("0 Car\n1 16 0 0 0 1 0 0 0 1 0 0 0 1 wheel.dat\n");
        let context = parse("0 FILE wheel.dat\n0 Context wheel\n0 !LDRAW_ORG Part\n");
        let (page, reference) = first_reference(&document);

        assert_eq!(
            resolver.resolve(reference, page, &document, Some(&context)),
            ResolutionState::Resolved
        );
        assert_eq!(reference.target().unwrap().title().as_deref(), Some("Context wheel"));

        reference.invalidate();
        resolver.resolve(reference, page, &document, None);
        assert_eq!(reference.target().unwrap().title().as_deref(), Some("Library wheel"));
        assert_eq!(resolver.cache().claim_count("wheel.dat"), Some(1));
    }

    #[test_log::test]
    fn same_document_cycles() {
        let fixture = LibraryFixture::new(1);
        let resolver = resolver_for(&fixture);
        let document = parse(
            "0 FILE a.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 b.ldr\n\
             0 FILE b.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 c.ldr\n\
             0 FILE c.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 a.ldr\n\
             0 FILE d.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 e.ldr\n\
             0 FILE e.ldr\n\
             0 Leaf\n",
        );
        let summary = resolver.resolve_all(&document);
        assert_eq!(summary.circular, 3);
        assert_eq!(summary.resolved, 1);
        let d = document.find_page("d.ldr").unwrap();
        assert!(d.references()[0].target().is_some());
    }

    #[test_log::test]
    fn page_renames_are_followed() {
        let fixture = LibraryFixture::new(1);
        let resolver = resolver_for(&fixture);
        let document = parse(
            "0 FILE main.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 renamed.ldr\n\
             0 FILE sub.ldr\n\
             0 Sub model\n",
        );
        let main = document.main_page().unwrap();
        let references = main.references();
        assert_eq!(resolver.resolve_all(&document).missing, 1);
        let before = references[0].target().unwrap();

        assert_eq!(
            resolver.rename_page(&document, "sub.ldr", "renamed").unwrap(),
            "renamed.ldr"
        );
        assert_eq!(references[0].target_name(), "renamed.ldr");
        assert_eq!(references[0].state(), ResolutionState::Unresolved);
        assert_eq!(references[1].state(), ResolutionState::Unresolved);

        assert_eq!(resolver.resolve_all(&document).resolved, 2);
        assert!(Arc::ptr_eq(&before, &references[0].target().unwrap()));
        assert!(Arc::ptr_eq(&before, &references[1].target().unwrap()));
        assert_eq!(before.page_type(), PageType::Model);
    }

    #[test_log::test]
    fn unloadable_and_missing_are_memoised() {
        let fixture = LibraryFixture::new(1);
        fixture.write(0, "parts/broken.dat", "0 Broken\n3 16 0 0 0 1 1 1\n");
        let resolver = resolver_for(&fixture);
        let document = parse(
            "0 Model\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 broken.dat\n\
             1 16 0 0 0 1 0 0 0 1 0 0 0 1 absent.dat\n",
        );
        let page = document.main_page().unwrap();
        let references = page.references();
        assert_eq!(
            resolver.resolve(references[0], page, &document, None),
            ResolutionState::Unloadable
        );
        assert_eq!(
            resolver.resolve(references[1], page, &document, None),
            ResolutionState::Missing
        );

        // Fixing the file behind the resolver's back changes nothing until invalidation.
        fixture.write(0, "parts/broken.dat", "0 Fixed\n");
        assert_eq!(
            resolver.resolve(references[0], page, &document, None),
            ResolutionState::Unloadable
        );
        assert_eq!(
            resolver
                .dispatcher()
                .invalidate(&DependencyKey::Library("broken.dat".to_string())),
            1
        );
        assert_eq!(
            resolver.resolve(references[0], page, &document, None),
            ResolutionState::Resolved
        );
    }
}
