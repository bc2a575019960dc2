use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    codec::diagnostic::ParseDiagnostic,
    error::LDrawError,
    model::{
        element::{Element, Vertex, Winding},
        page_type::{normalize_target, PageType, ReleaseStatus},
        reference::Reference,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    /// `[username]` or `{real name}`, brackets stripped.
    pub author: String,
    /// Whether the author was written as `{real name}`.
    pub real_name: bool,
    pub text: String,
}

impl HistoryEntry {
    /// The author with the brackets it was written in.
    pub fn bracketed_author(&self) -> String {
        if self.real_name {
            format!("{{{}}}", self.author)
        } else {
            format!("[{}]", self.author)
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BfcCertification {
    /// No `BFC CERTIFY` / `BFC NOCERTIFY` line.
    #[default]
    Unknown,
    Certified(Winding),
    NotCertified,
}

/// Header metadata of a page. Only lines accepted as header properties end up here; everything
/// else is an element of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHeader {
    pub name: String,
    pub page_type: PageType,
    /// Whether `page_type` came from a type line rather than the file path.
    pub type_declared: bool,
    /// Extension of a Model page's target name (`ldr` or `mpd`).
    pub model_extension: Option<String>,
    pub status: ReleaseStatus,
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub keywords: Vec<String>,
    pub license: Option<String>,
    pub theme: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub help: Vec<String>,
    pub cmdline: Option<String>,
    pub bfc: BfcCertification,
}

impl PageHeader {
    pub fn new(name: impl Into<String>, page_type: PageType) -> Self {
        PageHeader {
            name: name.into(),
            page_type,
            type_declared: false,
            model_extension: None,
            status: ReleaseStatus::Private,
            title: None,
            author: None,
            category: None,
            keywords: Vec::new(),
            license: None,
            theme: None,
            history: Vec::new(),
            help: Vec::new(),
            cmdline: None,
            bfc: BfcCertification::Unknown,
        }
    }

    pub fn target_name(&self) -> String {
        self.page_type
            .target_name(&self.name, self.model_extension.as_deref())
    }
}

/// LDraw's implicit category: the first word of the title, ignoring the `~`, `_` and `=`
/// prefixes used for moved, obsolete and alias parts.
pub fn category_from_title(title: &str) -> Option<String> {
    let first = title
        .trim_start_matches(['~', '_', '=', '|'])
        .split_whitespace()
        .next()?;
    Some(first.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepRotation {
    Relative(Vertex),
    Absolute(Vertex),
    Additive(Vertex),
    /// `ROTSTEP END`: back to the default view
    End,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Step {
    pub elements: Vec<Element>,
    /// Rotation carried by the `ROTSTEP` that closed this step.
    pub rotation: Option<StepRotation>,
}

impl Step {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Debug)]
pub struct Page {
    header: RwLock<PageHeader>,
    steps: Vec<Step>,
    diagnostics: Vec<ParseDiagnostic>,
    frozen: AtomicBool,
}

impl Page {
    pub fn new(header: PageHeader, steps: Vec<Step>) -> Self {
        Page {
            header: RwLock::new(header),
            steps,
            diagnostics: Vec::new(),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<ParseDiagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn header(&self) -> RwLockReadGuard<'_, PageHeader> {
        self.header.read()
    }

    pub fn name(&self) -> String {
        self.header.read().name.clone()
    }

    pub fn page_type(&self) -> PageType {
        self.header.read().page_type
    }

    pub fn title(&self) -> Option<String> {
        self.header.read().title.clone()
    }

    pub fn target_name(&self) -> String {
        self.header.read().target_name()
    }

    pub fn target_key(&self) -> String {
        normalize_target(&self.target_name())
    }

    /// Declared category, or the implicit one from the title for types that carry categories.
    pub fn category(&self) -> Option<String> {
        let header = self.header.read();
        if header.category.is_some() {
            return header.category.clone();
        }
        if !header.page_type.allows_category() {
            return None;
        }
        header.title.as_deref().and_then(category_from_title)
    }

    pub fn keywords(&self) -> Vec<String> {
        self.header.read().keywords.clone()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> Result<&mut Vec<Step>, LDrawError> {
        if self.is_frozen() {
            return Err(LDrawError::Frozen);
        }
        Ok(&mut self.steps)
    }

    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Rename the page. The caller is responsible for target-name uniqueness within the owning
    /// document, see [crate::model::Document::rename_page].
    pub(crate) fn set_name(&self, name: impl Into<String>) -> Result<(), LDrawError> {
        if self.is_frozen() {
            return Err(LDrawError::Frozen);
        }
        self.header.write().name = name.into();
        Ok(())
    }

    /// Every reference of the page in declaration order, including those nested in groups and
    /// texture blocks.
    pub fn references(&self) -> Vec<&Reference> {
        let mut references = Vec::new();
        for step in self.steps.iter() {
            for element in step.elements.iter() {
                element.for_each_reference(&mut |r| references.push(r));
            }
        }
        references
    }

    /// Clear every memoised resolution on the page. Returns how many were cleared.
    pub fn invalidate_references(&self) -> usize {
        self.references()
            .into_iter()
            .filter(|reference| reference.invalidate())
            .count()
    }

    pub fn element_count(&self) -> usize {
        self.steps.iter().map(|s| s.elements.len()).sum()
    }
}
