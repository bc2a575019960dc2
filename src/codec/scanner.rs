//! Header-only scan used to build index cards without parsing whole files.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::{
    codec::{
        header::{self, HeaderLine},
        line::{rest_from, tokenize},
        meta,
    },
    error::LDrawError,
    model::{page::category_from_title, page_type::stem_of, PageType, ReleaseStatus},
};

/// What the index needs to know about a library file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSummary {
    pub name: String,
    pub title: Option<String>,
    pub page_type: PageType,
    pub category: Option<String>,
    pub status: ReleaseStatus,
}

/// Scan header lines until the first geometry line. The rules match [crate::codec::PageParser]
/// for the properties the index uses: the first accepted value wins, and the category falls back
/// to the first word of the title for part-like pages.
pub fn scan_header<'a>(lines: impl IntoIterator<Item = &'a str>, path: &str) -> HeaderSummary {
    let mut summary = HeaderSummary {
        name: stem_of(path),
        title: None,
        page_type: PageType::infer_from_path(path),
        category: None,
        status: ReleaseStatus::Private,
    };
    let mut title_decided = false;
    let mut type_declared = false;
    let mut named = false;

    for (index, text) in lines.into_iter().enumerate() {
        let tokens = tokenize(text);
        let Some(kind) = tokens.first().map(|t| t.text) else {
            continue;
        };
        if kind != "0" {
            if matches!(kind, "1" | "2" | "3" | "4" | "5") {
                break;
            }
            title_decided = true;
            continue;
        }
        // Pages in a multi-part file after the first do not describe the file.
        if index > 0 && tokens.get(1).map(|t| t.text) == Some("FILE") {
            break;
        }
        let body = rest_from(text, &tokens, 1);
        if body.is_empty() {
            continue;
        }
        match header::classify(body) {
            Some(Ok(property)) => {
                title_decided = true;
                match property {
                    HeaderLine::Name(name) if !named => {
                        named = true;
                        summary.name = stem_of(&name);
                    }
                    HeaderLine::Type(page_type, status) if !type_declared => {
                        type_declared = true;
                        summary.page_type = page_type;
                        summary.status = status;
                    }
                    HeaderLine::Category(category)
                        if summary.category.is_none() && summary.page_type.allows_category() =>
                    {
                        summary.category = Some(category);
                    }
                    _ => {}
                }
            }
            Some(Err(_)) => title_decided = true,
            None => {
                if !title_decided && meta::classify(body).is_none() {
                    summary.title = Some(body.to_string());
                }
                title_decided = true;
            }
        }
    }

    if summary.category.is_none() && summary.page_type.allows_category() {
        summary.category = summary.title.as_deref().and_then(category_from_title);
    }
    summary
}

/// Scan the header of a file on disk, reading only as far as the header extends.
pub fn scan_file(path: &Path) -> Result<HeaderSummary, LDrawError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buffer)
            .trim_start_matches('\u{feff}')
            .trim_end_matches(['\r', '\n'])
            .to_string();
        let geometry = tokenize(&line)
            .first()
            .is_some_and(|t| matches!(t.text, "1" | "2" | "3" | "4" | "5"));
        lines.push(line);
        if geometry {
            break;
        }
    }
    Ok(scan_header(
        lines.iter().map(String::as_str),
        &path.to_string_lossy(),
    ))
}
