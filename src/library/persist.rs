//! On-disk snapshot of the library index.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    codec::ProgressFn,
    error::LDrawError,
    library::{
        card::{IndexCard, SearchPath, KNOWN_CATEGORIES},
        index::LibraryIndex,
    },
    model::PageType,
};

const STAMP_PREFIX: &str = "ldraw-core index v1";

/// Serialized form of a [LibraryIndex].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub stamp: String,
    pub search_path: SearchPath,
    pub cards: Vec<IndexCard>,
}

impl IndexSnapshot {
    pub fn read(path: &Path) -> Result<IndexSnapshot, LDrawError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether the snapshot was written by a compatible build for the same search path.
    pub fn is_current(&self, search_path: &SearchPath) -> bool {
        self.stamp == version_stamp() && &self.search_path == search_path
    }
}

/// Hex SHA-256 over the known page-type and category names. Cards classify files using these
/// names, so a change to either list invalidates every persisted snapshot.
pub fn version_stamp() -> String {
    let mut hasher = Sha256::new();
    hasher.update(STAMP_PREFIX.as_bytes());
    for page_type in PageType::ALL.iter() {
        hasher.update(b"\0type:");
        hasher.update(page_type.as_str().as_bytes());
    }
    for category in KNOWN_CATEGORIES.iter() {
        hasher.update(b"\0category:");
        hasher.update(category.as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl LibraryIndex {
    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            stamp: version_stamp(),
            search_path: self.search_path().clone(),
            cards: self.cards(),
        }
    }

    /// Write the snapshot atomically: to a sibling temp file, then renamed over `path`.
    pub fn save(&self, path: &Path) -> Result<(), LDrawError> {
        let snapshot = self.snapshot();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        fs::write(&temp, serde_json::to_string_pretty(&snapshot)?)?;
        fs::rename(&temp, path)?;
        tracing::debug!("Saved {} index cards to {path:?}", snapshot.cards.len());
        Ok(())
    }

    /// Build the index, reusing the cards of the snapshot at `snapshot_path` for files that have
    /// not changed since it was written. A missing, unreadable or stale snapshot falls back to a
    /// full build. The fresh index is written back to `snapshot_path`.
    #[tracing::instrument(skip_all, fields(snapshot = ?snapshot_path))]
    pub fn load_or_build(
        search_path: SearchPath,
        snapshot_path: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> Result<LibraryIndex, LDrawError> {
        let previous = match IndexSnapshot::read(snapshot_path) {
            Ok(snapshot) if snapshot.is_current(&search_path) => Some(
                snapshot
                    .cards
                    .into_iter()
                    .map(|card| (card.path.clone(), card))
                    .collect::<HashMap<PathBuf, IndexCard>>(),
            ),
            Ok(_) => {
                tracing::info!("Index snapshot {snapshot_path:?} is stale, rebuilding");
                None
            }
            Err(LDrawError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!("Could not read index snapshot {snapshot_path:?}: {e}");
                None
            }
        };

        let index = LibraryIndex::new(search_path);
        let (cards, stats) = index.walk(previous.as_ref(), progress)?;
        tracing::info!(
            "Loaded library index: {} cards ({} reused, {} scanned)",
            cards.len(),
            stats.reused,
            stats.scanned
        );
        index.replace_cards(cards);
        if let Err(e) = index.save(snapshot_path) {
            tracing::warn!("Could not save index snapshot to {snapshot_path:?}: {e}");
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::no_progress, tests::helpers::LibraryFixture};
    use filetime::{set_file_mtime, FileTime};

    fn reload(fixture: &LibraryFixture, snapshot_path: &Path) -> LibraryIndex {
        LibraryIndex::load_or_build(fixture.search_path(), snapshot_path, &mut no_progress).unwrap()
    }

    #[test]
    fn stamp_is_stable() {
        assert_eq!(version_stamp(), version_stamp());
        assert_eq!(version_stamp().len(), 64);
    }

    #[test_log::test]
    fn snapshot_reuses_unchanged_cards() {
        let fixture = LibraryFixture::new(1);
        let brick = fixture.write(0, "parts/3001.dat", "0 Brick 2 x 4\n");
        fixture.write(0, "parts/3002.dat", "0 Brick 2 x 3\n");
        let snapshot_path = fixture.root(0).join(".cache/index.json");

        let index = reload(&fixture, &snapshot_path);
        assert_eq!(index.len(), 2);
        assert!(snapshot_path.exists());

        // Rewrite the title behind the index's back but keep the mtime: the stale card is
        // reused, proving the file was not re-scanned.
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&brick).unwrap());
        fs::write(&brick, "0 Renamed Brick\n").unwrap();
        set_file_mtime(&brick, mtime).unwrap();
        let index = reload(&fixture, &snapshot_path);
        assert_eq!(index.get("3001.dat").unwrap().title.as_deref(), Some("Brick 2 x 4"));

        // A newer mtime forces a re-scan.
        set_file_mtime(&brick, FileTime::from_unix_time(mtime.unix_seconds() + 60, 0)).unwrap();
        let index = reload(&fixture, &snapshot_path);
        assert_eq!(index.get("3001.dat").unwrap().title.as_deref(), Some("Renamed Brick"));
    }

    #[test_log::test]
    fn stale_snapshots_are_ignored() {
        let fixture = LibraryFixture::new(1);
        fixture.write(0, "parts/3001.dat", "0 Brick 2 x 4\n");
        let snapshot_path = fixture.root(0).join("index.json");

        let index = LibraryIndex::build(fixture.search_path()).unwrap();
        let mut snapshot = index.snapshot();
        snapshot.stamp = "0".repeat(64);
        snapshot.cards[0].title = Some("Forged".to_string());
        fs::write(&snapshot_path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        let index = reload(&fixture, &snapshot_path);
        assert_eq!(index.get("3001.dat").unwrap().title.as_deref(), Some("Brick 2 x 4"));
        assert!(IndexSnapshot::read(&snapshot_path)
            .unwrap()
            .is_current(&fixture.search_path()));
    }
}
