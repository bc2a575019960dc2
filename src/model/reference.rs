//! Sub-file reference elements (type-1 lines) and their memoised resolution.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    cache::CachedDocument,
    model::{
        document::Document,
        element::{Colour, ElementFlags, Transform},
        page::Page,
        page_type::normalize_target,
    },
    resolver::DependencyKey,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionState {
    #[default]
    Unresolved,
    Resolved,
    Missing,
    Unloadable,
    CircularReference,
}

/// The memoised outcome of resolving one reference.
///
/// `page` never owns its target logically: same-document targets are owned by the containing
/// document, library targets by the cache entry that `claim` keeps alive. Dropping the
/// resolution releases the claim.
#[derive(Default)]
pub(crate) struct Resolution {
    pub state: ResolutionState,
    pub page: Option<Arc<Page>>,
    pub claim: Option<CachedDocument>,
    pub dependency: Option<DependencyKey>,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("state", &self.state)
            .field("page", &self.page.as_ref().map(|p| p.target_name()))
            .field("claimed", &self.claim.as_ref().map(|c| c.key().to_string()))
            .field("dependency", &self.dependency)
            .finish()
    }
}

/// Shared resolution state of a reference. The dependency dispatcher holds weak handles to
/// slots so it can invalidate or retarget them without knowing which page they live in.
#[derive(Debug, Default)]
pub struct ResolutionSlot {
    target: RwLock<String>,
    resolution: Mutex<Resolution>,
}

impl ResolutionSlot {
    pub fn new(target: impl Into<String>) -> Self {
        ResolutionSlot {
            target: RwLock::new(target.into()),
            resolution: Mutex::new(Resolution::default()),
        }
    }

    pub fn target_name(&self) -> String {
        self.target.read().clone()
    }

    pub fn target_key(&self) -> String {
        normalize_target(&self.target.read())
    }

    pub fn state(&self) -> ResolutionState {
        self.resolution.lock().state
    }

    pub fn page(&self) -> Option<Arc<Page>> {
        self.resolution.lock().page.clone()
    }

    pub fn dependency(&self) -> Option<DependencyKey> {
        self.resolution.lock().dependency.clone()
    }

    pub(crate) fn depends_on(&self, key: &DependencyKey) -> bool {
        self.resolution.lock().dependency.as_ref() == Some(key)
    }

    /// Clear the memo. Returns whether anything was cleared.
    pub fn invalidate(&self) -> bool {
        let previous = {
            let mut resolution = self.resolution.lock();
            if resolution.state == ResolutionState::Unresolved {
                return false;
            }
            std::mem::take(&mut *resolution)
        };
        // Released outside the slot lock: dropping a claim takes the cache lock.
        drop(previous);
        true
    }

    /// Point the slot at a new target name and clear the memo.
    pub fn retarget(&self, name: impl Into<String>) {
        *self.target.write() = name.into();
        self.invalidate();
    }

    /// The memoised state, if the slot has been resolved since its last invalidation.
    pub(crate) fn memoized(&self) -> Option<ResolutionState> {
        let state = self.resolution.lock().state;
        (state != ResolutionState::Unresolved).then_some(state)
    }

    /// Store a freshly computed resolution unless another caller got there first, in which case
    /// the existing memo wins and the new one is dropped.
    pub(crate) fn store(&self, computed: Resolution) -> ResolutionState {
        let (state, discarded) = {
            let mut resolution = self.resolution.lock();
            if resolution.state == ResolutionState::Unresolved {
                *resolution = computed;
                (resolution.state, None)
            } else {
                (resolution.state, Some(computed))
            }
        };
        drop(discarded);
        state
    }
}

/// A type-1 line: places another page with a transform and colour.
pub struct Reference {
    pub colour: Colour,
    pub transform: Transform,
    /// Set by a preceding `BFC INVERTNEXT`.
    pub inverted: bool,
    pub flags: ElementFlags,
    target_context: Option<Weak<Document>>,
    slot: Arc<ResolutionSlot>,
}

impl Reference {
    pub fn new(target: impl Into<String>, colour: Colour, transform: Transform) -> Self {
        Reference {
            colour,
            transform,
            inverted: false,
            flags: ElementFlags::empty(),
            target_context: None,
            slot: Arc::new(ResolutionSlot::new(target)),
        }
    }

    pub fn target_name(&self) -> String {
        self.slot.target_name()
    }

    pub fn target_key(&self) -> String {
        self.slot.target_key()
    }

    /// Change the target name. Clears any memoised resolution.
    pub fn set_target_name(&self, name: impl Into<String>) {
        self.slot.retarget(name);
    }

    /// An explicit document to search before the library. Held weakly.
    pub fn target_context(&self) -> Option<Arc<Document>> {
        self.target_context.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_target_context(&mut self, context: Option<&Arc<Document>>) {
        self.target_context = context.map(Arc::downgrade);
        self.slot.invalidate();
    }

    pub fn state(&self) -> ResolutionState {
        self.slot.state()
    }

    /// The resolved page, if the memoised state is `Resolved`.
    pub fn target(&self) -> Option<Arc<Page>> {
        self.slot.page()
    }

    pub fn invalidate(&self) -> bool {
        self.slot.invalidate()
    }

    pub fn slot(&self) -> &Arc<ResolutionSlot> {
        &self.slot
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("target", &self.target_name())
            .field("colour", &self.colour)
            .field("transform", &self.transform)
            .field("inverted", &self.inverted)
            .field("flags", &self.flags)
            .field("state", &self.state())
            .finish()
    }
}

/// Clones share nothing but the target name: the copy starts unresolved.
impl Clone for Reference {
    fn clone(&self) -> Self {
        Reference {
            colour: self.colour,
            transform: self.transform,
            inverted: self.inverted,
            flags: self.flags,
            target_context: self.target_context.clone(),
            slot: Arc::new(ResolutionSlot::new(self.target_name())),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ReferenceRecord {
    target: String,
    colour: Colour,
    transform: Transform,
    inverted: bool,
    flags: ElementFlags,
}

impl Serialize for Reference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ReferenceRecord {
            target: self.target_name(),
            colour: self.colour,
            transform: self.transform,
            inverted: self.inverted,
            flags: self.flags,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = ReferenceRecord::deserialize(deserializer)?;
        let mut reference = Reference::new(record.target, record.colour, record.transform);
        reference.inverted = record.inverted;
        reference.flags = record.flags;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_starts_unresolved() {
        let reference = Reference::new("3001.dat", Colour::Code(4), Transform::default());
        reference.slot().store(Resolution {
            state: ResolutionState::Missing,
            ..Default::default()
        });
        assert_eq!(reference.state(), ResolutionState::Missing);

        let copy = reference.clone();
        assert_eq!(copy.state(), ResolutionState::Unresolved);
        assert_eq!(copy.target_name(), "3001.dat");
        assert!(!Arc::ptr_eq(copy.slot(), reference.slot()));
    }

    #[test]
    fn retarget_clears_memo() {
        let reference = Reference::new("old.dat", Colour::MAIN, Transform::default());
        reference.slot().store(Resolution {
            state: ResolutionState::Missing,
            ..Default::default()
        });
        reference.set_target_name("NEW.dat");
        assert_eq!(reference.state(), ResolutionState::Unresolved);
        assert_eq!(reference.target_key(), "new.dat");
    }

    #[test]
    fn first_store_wins() {
        let slot = ResolutionSlot::new("a.dat");
        let first = slot.store(Resolution {
            state: ResolutionState::Missing,
            ..Default::default()
        });
        let second = slot.store(Resolution {
            state: ResolutionState::Unloadable,
            ..Default::default()
        });
        assert_eq!(first, ResolutionState::Missing);
        assert_eq!(second, ResolutionState::Missing);
        assert!(slot.invalidate());
        assert!(!slot.invalidate());
    }
}
