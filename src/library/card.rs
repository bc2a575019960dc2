use serde::{Deserialize, Serialize};
use std::{
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use crate::{
    codec::HeaderSummary,
    model::{normalize_target, page_type::TARGET_SEP, PageType},
};

/// Category names of the official parts library. Part of the snapshot version stamp: a change
/// to this list invalidates persisted indexes.
pub const KNOWN_CATEGORIES: &[&str] = &[
    "Animal",
    "Antenna",
    "Arch",
    "Arm",
    "Bar",
    "Baseplate",
    "Belville",
    "Boat",
    "Bracket",
    "Brick",
    "Car",
    "Clikits",
    "Cockpit",
    "Cone",
    "Constraction",
    "Constraction Accessory",
    "Container",
    "Conveyor",
    "Crane",
    "Cylinder",
    "Dish",
    "Door",
    "Duplo",
    "Electric",
    "Exhaust",
    "Fence",
    "Figure",
    "Figure Accessory",
    "Flag",
    "Forklift",
    "Freestyle",
    "Garage",
    "Glass",
    "Grab",
    "Hinge",
    "Homemaker",
    "Hose",
    "Ladder",
    "Lever",
    "Magnet",
    "Minifig",
    "Minifig Accessory",
    "Minifig Footwear",
    "Minifig Headwear",
    "Minifig Hipwear",
    "Minifig Neckwear",
    "Monorail",
    "Moved",
    "Obsolete",
    "Panel",
    "Plane",
    "Plant",
    "Plate",
    "Platform",
    "Propeller",
    "Rack",
    "Roadsign",
    "Rock",
    "Scala",
    "Screw",
    "Sheet Cardboard",
    "Sheet Fabric",
    "Sheet Plastic",
    "Slope",
    "Sphere",
    "Staircase",
    "Sticker",
    "Sticker Shortcut",
    "Support",
    "Tail",
    "Tap",
    "Technic",
    "Tile",
    "Tipper",
    "Tractor",
    "Trailer",
    "Train",
    "Turntable",
    "Tyre",
    "Vehicle",
    "Wedge",
    "Wheel",
    "Winch",
    "Window",
    "Windscreen",
    "Wing",
    "Znap",
];

/// Library folders in precedence order within one root. Anything else under a root ranks after
/// them.
pub const LIBRARY_FOLDERS: [&str; 3] = ["p", "parts", "models"];

const RANKS_PER_ROOT: u32 = LIBRARY_FOLDERS.len() as u32 + 1;

/// Immutable index entry for one library file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCard {
    pub file_name: String,
    pub target_key: String,
    pub page_type: PageType,
    pub category: Option<String>,
    pub title: Option<String>,
    pub modified: SystemTime,
    /// Search-path precedence; lower wins.
    pub rank: u32,
    pub path: PathBuf,
}

impl IndexCard {
    pub fn new(
        location: Location,
        path: PathBuf,
        modified: SystemTime,
        summary: HeaderSummary,
    ) -> Self {
        IndexCard {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            target_key: location.key,
            page_type: summary.page_type,
            category: summary.category,
            title: summary.title,
            modified,
            rank: location.rank,
            path,
        }
    }
}

/// Where a file sits in the search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub key: String,
    pub rank: u32,
}

/// Whether a path names an LDraw source file.
pub fn is_library_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    !hidden && matches!(extension.as_deref(), Some("dat" | "ldr" | "mpd"))
}

/// The ordered library roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPath {
    roots: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        SearchPath { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn rank(root_index: usize, folder_rank: u32) -> u32 {
        root_index as u32 * RANKS_PER_ROOT + folder_rank
    }

    /// Target key and rank of a file under the search path. The key is the path relative to its
    /// `p`, `parts` or `models` folder (or to the root for anything else).
    pub fn locate(&self, path: &Path) -> Option<Location> {
        if !is_library_file(path) {
            return None;
        }
        self.roots.iter().enumerate().find_map(|(root_index, root)| {
            let relative = path.strip_prefix(root).ok()?;
            let components: Vec<String> = relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            let (folder_rank, rest) = match components.split_first() {
                Some((first, rest)) if !rest.is_empty() => {
                    match LIBRARY_FOLDERS
                        .iter()
                        .position(|f| f.eq_ignore_ascii_case(first))
                    {
                        Some(position) => (position as u32, rest),
                        None => (LIBRARY_FOLDERS.len() as u32, components.as_slice()),
                    }
                }
                _ => (LIBRARY_FOLDERS.len() as u32, components.as_slice()),
            };
            if rest.is_empty() {
                return None;
            }
            let joined = rest.join("\\");
            Some(Location {
                key: normalize_target(&joined),
                rank: Self::rank(root_index, folder_rank),
            })
        })
    }

    /// Existing files that could provide a target key, in rank order. Path components are
    /// matched case-insensitively, since keys are lower-cased but files keep their case on disk.
    pub fn probe(&self, key: &str) -> Vec<(u32, PathBuf)> {
        let relative: Vec<&str> = key
            .split([TARGET_SEP, '/'])
            .filter(|part| !part.is_empty())
            .collect();
        if relative.is_empty() {
            return Vec::new();
        }
        let mut found = Vec::new();
        for (root_index, root) in self.roots.iter().enumerate() {
            for (folder_rank, folder) in LIBRARY_FOLDERS.iter().enumerate() {
                let Some(base) = find_entry(root, folder) else {
                    continue;
                };
                if let Some(path) = find_path(&base, &relative) {
                    found.push((Self::rank(root_index, folder_rank as u32), path));
                }
            }
            if let Some(path) = find_path(root, &relative) {
                found.push((Self::rank(root_index, LIBRARY_FOLDERS.len() as u32), path));
            }
        }
        found
    }
}

/// `dir/name`, matching `name` case-insensitively when the exact spelling does not exist.
fn find_entry(dir: &Path, name: &str) -> Option<PathBuf> {
    let exact = dir.join(name);
    if exact.exists() {
        return Some(exact);
    }
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .find(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(name))
        .map(|entry| entry.path())
}

pub(crate) fn find_path(base: &Path, relative: &[&str]) -> Option<PathBuf> {
    let path = relative
        .iter()
        .try_fold(base.to_path_buf(), |dir, part| find_entry(&dir, part))?;
    path.is_file().then_some(path)
}
