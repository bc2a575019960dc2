//! Recognition of header-property lines.
//!
//! Classification is purely lexical. Whether a recognised property is accepted (header still
//! open, not a duplicate, allowed for the page type) is decided by the page parser.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    codec::line::{rest_from, tokenize},
    model::{BfcCertification, HistoryEntry, PageType, ReleaseStatus, Winding},
};

static HISTORY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\s+(?:\[([^\]]+)\]|\{([^}]+)\})\s*(.*)$")
        .expect("history pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HeaderLine {
    Name(String),
    Author(String),
    Type(PageType, ReleaseStatus),
    License(String),
    Theme(String),
    Category(String),
    Keywords(Vec<String>),
    History(HistoryEntry),
    Help(String),
    CmdLine(String),
    Certify(BfcCertification),
}

impl HeaderLine {
    /// Identity used to reject duplicates of single-shot properties. Accumulating properties
    /// return `None`.
    pub fn once_key(&self) -> Option<&'static str> {
        match self {
            HeaderLine::Name(_) => Some("Name"),
            HeaderLine::Author(_) => Some("Author"),
            HeaderLine::Type(..) => Some("type"),
            HeaderLine::License(_) => Some("!LICENSE"),
            HeaderLine::Theme(_) => Some("!THEME"),
            HeaderLine::Category(_) => Some("!CATEGORY"),
            HeaderLine::CmdLine(_) => Some("!CMDLINE"),
            HeaderLine::Certify(_) => Some("BFC certification"),
            HeaderLine::Keywords(_) | HeaderLine::History(_) | HeaderLine::Help(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HeaderLine::Keywords(_) => "!KEYWORDS",
            HeaderLine::History(_) => "!HISTORY",
            HeaderLine::Help(_) => "!HELP",
            other => other.once_key().unwrap_or("header property"),
        }
    }

    /// Whether the property may appear on a page of `page_type`.
    pub fn allowed_for(&self, page_type: PageType) -> bool {
        match self {
            HeaderLine::Keywords(_) => page_type.allows_keywords(),
            HeaderLine::Category(_) => page_type.allows_category(),
            _ => true,
        }
    }
}

/// Classify the body of a `0` line (everything after the line type).
///
/// `None`: not a header property. `Some(Err(reason))`: a header property keyword with a value
/// that does not parse.
pub(crate) fn classify(body: &str) -> Option<Result<HeaderLine, String>> {
    if let Some(value) = body.strip_prefix("Name:") {
        return Some(non_empty(value, "Name:").map(HeaderLine::Name));
    }
    if let Some(value) = body.strip_prefix("Author:") {
        return Some(non_empty(value, "Author:").map(HeaderLine::Author));
    }

    let tokens = tokenize(body);
    let keyword = tokens.first()?.text;
    let words: Vec<&str> = tokens.iter().skip(1).map(|t| t.text).collect();
    let rest = rest_from(body, &tokens, 1);
    let line = match keyword {
        "!LDRAW_ORG" | "LDRAW_ORG" => PageType::from_org_tokens(&words)
            .map(|(page_type, status)| HeaderLine::Type(page_type, status))
            .ok_or_else(|| format!("unrecognised type declaration '{rest}'")),
        "Official" if words.first() == Some(&"LCAD") => legacy_official(&words[1..]),
        "Unofficial" if words.len() == 1 && words[0].eq_ignore_ascii_case("part") => {
            Ok(HeaderLine::Type(PageType::Part, ReleaseStatus::Uncertified))
        }
        "!LICENSE" => non_empty(rest, "!LICENSE").map(HeaderLine::License),
        "!THEME" => non_empty(rest, "!THEME").map(HeaderLine::Theme),
        "!CATEGORY" => non_empty(rest, "!CATEGORY").map(HeaderLine::Category),
        "!KEYWORDS" => keywords(rest),
        "!HISTORY" => history(rest),
        "!HELP" => Ok(HeaderLine::Help(rest.to_string())),
        "!CMDLINE" => non_empty(rest, "!CMDLINE").map(HeaderLine::CmdLine),
        "BFC" => match words.first().copied() {
            Some("CERTIFY") => certify(&words[1..]),
            Some("NOCERTIFY") if words.len() == 1 => {
                Ok(HeaderLine::Certify(BfcCertification::NotCertified))
            }
            Some("NOCERTIFY") => Err("BFC NOCERTIFY takes no arguments".to_string()),
            _ => return None,
        },
        _ => return None,
    };
    Some(line)
}

fn non_empty(value: &str, keyword: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        Err(format!("{keyword} without a value"))
    } else {
        Ok(value.to_string())
    }
}

/// `Official LCAD [Update yy-n]`: the pre-`LDRAW_ORG` release marker for parts.
fn legacy_official(words: &[&str]) -> Result<HeaderLine, String> {
    let update = match words {
        [] => None,
        [word, update] if word.eq_ignore_ascii_case("update") => Some(update.to_string()),
        _ => return Err(format!("unrecognised release line '{}'", words.join(" "))),
    };
    Ok(HeaderLine::Type(
        PageType::Part,
        ReleaseStatus::Released { update },
    ))
}

fn keywords(rest: &str) -> Result<HeaderLine, String> {
    let keywords: Vec<String> = rest
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if keywords.is_empty() {
        Err("!KEYWORDS without keywords".to_string())
    } else {
        Ok(HeaderLine::Keywords(keywords))
    }
}

fn history(rest: &str) -> Result<HeaderLine, String> {
    let captures = HISTORY
        .captures(rest)
        .ok_or_else(|| format!("malformed !HISTORY entry '{rest}'"))?;
    let real_name = captures.get(2).is_none();
    let author = captures
        .get(2)
        .or_else(|| captures.get(3))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    Ok(HeaderLine::History(HistoryEntry {
        date: captures[1].to_string(),
        author,
        real_name,
        text: captures
            .get(4)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
    }))
}

fn certify(words: &[&str]) -> Result<HeaderLine, String> {
    let winding = match words {
        [] | ["CCW"] => Winding::Ccw,
        ["CW"] => Winding::Cw,
        _ => return Err(format!("malformed BFC CERTIFY '{}'", words.join(" "))),
    };
    Ok(HeaderLine::Certify(BfcCertification::Certified(winding)))
}
