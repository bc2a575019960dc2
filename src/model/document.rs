use std::{
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use crate::{
    error::LDrawError,
    model::{
        page::Page,
        page_type::{normalize_target, ReleaseStatus},
        reference::Reference,
    },
};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [Document], used to key same-document dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// An ordered collection of pages loaded from one file (or built in memory).
///
/// Target names are unique within a document. A document is frozen when it is published into
/// the [crate::cache::DocumentCache]; from then on it is shared read-only.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    path: Option<PathBuf>,
    pages: Vec<Arc<Page>>,
    frozen: bool,
    is_library_part: bool,
    status: ReleaseStatus,
}

impl Default for Document {
    fn default() -> Self {
        Document::new(None)
    }
}

impl Document {
    pub fn new(path: Option<PathBuf>) -> Self {
        Document {
            id: DocumentId::next(),
            path,
            pages: Vec::new(),
            frozen: false,
            is_library_part: false,
            status: ReleaseStatus::Private,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pages(&self) -> &[Arc<Page>] {
        &self.pages
    }

    /// The first page: the main model of a multi-part file.
    pub fn main_page(&self) -> Option<&Arc<Page>> {
        self.pages.first()
    }

    pub fn find_page(&self, target: &str) -> Option<&Arc<Page>> {
        let key = normalize_target(target);
        self.pages.iter().find(|page| page.target_key() == key)
    }

    pub fn contains_page(&self, page: &Page) -> bool {
        self.pages
            .iter()
            .any(|p| std::ptr::eq(Arc::as_ptr(p), page as *const Page))
    }

    pub fn add_page(&mut self, page: Page) -> Result<Arc<Page>, LDrawError> {
        if self.frozen {
            return Err(LDrawError::Frozen);
        }
        let target = page.target_name();
        if self.find_page(&target).is_some() {
            return Err(LDrawError::DuplicateTarget(target));
        }
        let page = Arc::new(page);
        self.pages.push(page.clone());
        Ok(page)
    }

    /// Rename a page, keeping target names unique. Returns the new target name.
    ///
    /// References that depend on the old name are not touched here; see
    /// [crate::resolver::ReferenceResolver::rename_page].
    pub fn rename_page(&self, target: &str, new_name: &str) -> Result<String, LDrawError> {
        if self.frozen {
            return Err(LDrawError::Frozen);
        }
        let page = self
            .find_page(target)
            .ok_or_else(|| LDrawError::NotFound(format!("page '{target}'")))?;
        let new_target = {
            let header = page.header();
            header
                .page_type
                .target_name(new_name, header.model_extension.as_deref())
        };
        if let Some(existing) = self.find_page(&new_target) {
            if !Arc::ptr_eq(existing, page) {
                return Err(LDrawError::DuplicateTarget(new_target));
            }
        }
        page.set_name(new_name)?;
        Ok(new_target)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
        for page in self.pages.iter() {
            page.freeze();
        }
    }

    pub fn is_library_part(&self) -> bool {
        self.is_library_part
    }

    pub fn set_library_part(&mut self, is_library_part: bool) {
        self.is_library_part = is_library_part;
    }

    pub fn status(&self) -> &ReleaseStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: ReleaseStatus) {
        self.status = status;
    }

    /// Visit every reference of every page, with the page that contains it.
    pub fn for_each_reference<'a>(&'a self, f: &mut dyn FnMut(&'a Arc<Page>, &'a Reference)) {
        for page in self.pages.iter() {
            for reference in page.references() {
                f(page, reference);
            }
        }
    }

    /// Clear every memoised resolution in the document, e.g. after a tree edit.
    pub fn invalidate_references(&self) -> usize {
        self.pages
            .iter()
            .map(|page| page.invalidate_references())
            .sum()
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        tracing::trace!("Disposing {} ({:?})", self.id, self.path);
    }
}
