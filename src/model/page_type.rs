//! Page types, release status and the target-name conventions derived from them.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::Path,
};
use unicode_normalization::UnicodeNormalization;

/// Folder separator used in canonical target keys (`s\3001s01.dat`).
pub const TARGET_SEP: char = '\\';

/// The structural role of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PageType {
    Model,
    Part,
    Subpart,
    Primitive,
    HiresPrimitive,
    Shortcut,
    PartAlias,
    PartPhysicalColour,
    ShortcutAlias,
    ShortcutPhysicalColour,
}

impl PageType {
    pub const ALL: [PageType; 10] = [
        PageType::Model,
        PageType::Part,
        PageType::Subpart,
        PageType::Primitive,
        PageType::HiresPrimitive,
        PageType::Shortcut,
        PageType::PartAlias,
        PageType::PartPhysicalColour,
        PageType::ShortcutAlias,
        PageType::ShortcutPhysicalColour,
    ];

    /// The name used on `!LDRAW_ORG` lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Model => "Model",
            PageType::Part => "Part",
            PageType::Subpart => "Subpart",
            PageType::Primitive => "Primitive",
            PageType::HiresPrimitive => "48_Primitive",
            PageType::Shortcut => "Shortcut",
            PageType::PartAlias => "Part Alias",
            PageType::PartPhysicalColour => "Part Physical_Colour",
            PageType::ShortcutAlias => "Shortcut Alias",
            PageType::ShortcutPhysicalColour => "Shortcut Physical_Colour",
        }
    }

    /// Library sub-folder the type's target names live in.
    pub fn folder(&self) -> Option<&'static str> {
        match self {
            PageType::Subpart => Some("s"),
            PageType::HiresPrimitive => Some("48"),
            _ => None,
        }
    }

    pub fn default_extension(&self) -> &'static str {
        match self {
            PageType::Model => "ldr",
            _ => "dat",
        }
    }

    /// Parts, shortcuts and their alias/physical-colour variants.
    pub fn is_part_like(&self) -> bool {
        matches!(
            self,
            PageType::Part
                | PageType::Shortcut
                | PageType::PartAlias
                | PageType::PartPhysicalColour
                | PageType::ShortcutAlias
                | PageType::ShortcutPhysicalColour
        )
    }

    pub fn allows_keywords(&self) -> bool {
        self.is_part_like()
    }

    pub fn allows_category(&self) -> bool {
        self.is_part_like()
    }

    /// Derive the display target name for a page of this type. Models keep their own extension
    /// (`.ldr` or `.mpd`), everything else is a `.dat` file.
    pub fn target_name(&self, name: &str, model_extension: Option<&str>) -> String {
        let extension = match self {
            PageType::Model => model_extension.unwrap_or("ldr"),
            _ => "dat",
        };
        match self.folder() {
            Some(folder) => format!("{folder}{TARGET_SEP}{name}.{extension}"),
            None => format!("{name}.{extension}"),
        }
    }

    /// Infer the page type from a file path or declared file name, used when the page does not
    /// declare one itself.
    pub fn infer_from_path(path: &str) -> PageType {
        let components: Vec<&str> = path
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .collect();
        let folder = if components.len() >= 2 {
            components[components.len() - 2].to_lowercase()
        } else {
            String::new()
        };
        match folder.as_str() {
            "s" => return PageType::Subpart,
            "48" => return PageType::HiresPrimitive,
            "p" => return PageType::Primitive,
            _ => {}
        }
        match extension_of(path).as_deref() {
            Some("dat") => PageType::Part,
            _ => PageType::Model,
        }
    }

    /// Parse the tokens that follow `!LDRAW_ORG` (or the legacy `LDRAW_ORG`).
    ///
    /// Returns `None` when the first token is not a recognised type.
    pub fn from_org_tokens(tokens: &[&str]) -> Option<(PageType, ReleaseStatus)> {
        let (first, rest) = tokens.split_first()?;
        let (unofficial, base) = match first.strip_prefix("Unofficial_") {
            Some(base) => (true, base),
            None => (false, *first),
        };
        let mut rest = rest.iter().copied().peekable();
        let page_type = match base.to_lowercase().as_str() {
            "model" => PageType::Model,
            "subpart" => PageType::Subpart,
            "primitive" => PageType::Primitive,
            "48_primitive" => PageType::HiresPrimitive,
            "part" | "shortcut" => {
                let is_part = base.eq_ignore_ascii_case("part");
                let qualifier = rest.peek().map(|q| q.to_lowercase());
                match qualifier.as_deref() {
                    Some("alias") => {
                        rest.next();
                        if is_part {
                            PageType::PartAlias
                        } else {
                            PageType::ShortcutAlias
                        }
                    }
                    Some("physical_colour") => {
                        rest.next();
                        if is_part {
                            PageType::PartPhysicalColour
                        } else {
                            PageType::ShortcutPhysicalColour
                        }
                    }
                    _ if is_part => PageType::Part,
                    _ => PageType::Shortcut,
                }
            }
            _ => return None,
        };

        let status = if unofficial {
            ReleaseStatus::Uncertified
        } else {
            match rest.next() {
                Some(word) if word.eq_ignore_ascii_case("UPDATE") => ReleaseStatus::Released {
                    update: rest.next().map(str::to_string),
                },
                Some(word) if word.eq_ignore_ascii_case("ORIGINAL") => {
                    ReleaseStatus::Released { update: None }
                }
                Some(_) => return None,
                None => ReleaseStatus::Released { update: None },
            }
        };
        if rest.next().is_some() {
            return None;
        }
        Some((page_type, status))
    }
}

impl Display for PageType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Release status of a document, taken from its first page's type line.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseStatus {
    /// No type line: a user's own file.
    #[default]
    Private,
    Released {
        update: Option<String>,
    },
    /// Released but withheld by the parts tracker. Never produced by the parser, only set by
    /// collaborators that know the tracker state.
    Held,
    Uncertified,
}

/// Lower-case, NFC-normalised target key with `\` separators. Keys compare case-insensitively by
/// construction.
pub fn normalize_target(name: &str) -> String {
    name.trim()
        .nfc()
        .collect::<String>()
        .replace('/', "\\")
        .trim_start_matches(".\\")
        .to_lowercase()
}

/// Lower-cased extension of the last component of a path-like name.
pub fn extension_of(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Bare page name of a declared file name: the last path component without its extension.
pub fn stem_of(name: &str) -> String {
    let last = name.trim().rsplit(['/', '\\']).next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => last.to_string(),
    }
}

/// Whether a reference target names an absolute filesystem location.
pub fn is_rooted(name: &str) -> bool {
    let trimmed = name.trim();
    Path::new(trimmed).is_absolute()
        || trimmed.starts_with('\\')
        || trimmed.as_bytes().get(1) == Some(&b':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names_follow_folder_conventions() {
        assert_eq!(PageType::Part.target_name("3001", None), "3001.dat");
        assert_eq!(PageType::Subpart.target_name("3001s01", None), "s\\3001s01.dat");
        assert_eq!(
            PageType::HiresPrimitive.target_name("4-4edge", None),
            "48\\4-4edge.dat"
        );
        assert_eq!(PageType::Model.target_name("car", None), "car.ldr");
        assert_eq!(PageType::Model.target_name("car", Some("mpd")), "car.mpd");
    }

    #[test]
    fn page_type_inference() {
        assert_eq!(PageType::infer_from_path("/lib/parts/s/3001s01.dat"), PageType::Subpart);
        assert_eq!(PageType::infer_from_path("p\\48\\4-4edge.dat"), PageType::HiresPrimitive);
        assert_eq!(PageType::infer_from_path("/lib/p/stud.dat"), PageType::Primitive);
        assert_eq!(PageType::infer_from_path("/lib/parts/3001.DAT"), PageType::Part);
        assert_eq!(PageType::infer_from_path("house.ldr"), PageType::Model);
        assert_eq!(PageType::infer_from_path("house.mpd"), PageType::Model);
    }

    #[test]
    fn org_lines() {
        assert_eq!(
            PageType::from_org_tokens(&["Part", "UPDATE", "2004-03"]),
            Some((
                PageType::Part,
                ReleaseStatus::Released {
                    update: Some("2004-03".to_string())
                }
            ))
        );
        assert_eq!(
            PageType::from_org_tokens(&["Unofficial_Shortcut", "Physical_Colour"]),
            Some((PageType::ShortcutPhysicalColour, ReleaseStatus::Uncertified))
        );
        assert_eq!(
            PageType::from_org_tokens(&["48_Primitive", "ORIGINAL"]),
            Some((PageType::HiresPrimitive, ReleaseStatus::Released { update: None }))
        );
        assert_eq!(PageType::from_org_tokens(&["Sticker"]), None);
        assert_eq!(PageType::from_org_tokens(&["Part", "BOGUS"]), None);
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_target("S/3001S01.DAT"), "s\\3001s01.dat");
        assert_eq!(normalize_target("  3001.dat "), "3001.dat");
        assert_eq!(stem_of("s\\3001s01.dat"), "3001s01");
        assert_eq!(stem_of("my model.ldr"), "my model");
        assert_eq!(extension_of("48\\1-4cyli.DAT").as_deref(), Some("dat"));
        assert!(is_rooted("/tmp/a.dat"));
        assert!(is_rooted("C:\\ldraw\\a.dat"));
        assert!(!is_rooted("s\\a.dat"));
    }
}
