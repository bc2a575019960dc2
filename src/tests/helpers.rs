//! Shared test utilities: an on-disk library layout.

use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

use crate::{config::LibraryConfig, library::SearchPath};

/// A temporary directory holding `n` search-path roots (`lib0`, `lib1`, ...) and a `models`
/// directory outside all of them.
pub struct LibraryFixture {
    dir: TempDir,
    roots: Vec<PathBuf>,
}

impl LibraryFixture {
    pub fn new(n: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let roots: Vec<PathBuf> = (0..n).map(|i| dir.path().join(format!("lib{i}"))).collect();
        for root in roots.iter() {
            fs::create_dir_all(root).unwrap();
        }
        fs::create_dir_all(dir.path().join("models")).unwrap();
        LibraryFixture { dir, roots }
    }

    pub fn root(&self, i: usize) -> &Path {
        &self.roots[i]
    }

    pub fn path(&self, i: usize, relative: &str) -> PathBuf {
        self.roots[i].join(relative)
    }

    /// Write a library file below root `i`, creating folders as needed.
    pub fn write(&self, i: usize, relative: &str, content: &str) -> PathBuf {
        let path = self.path(i, relative);
        write_file(&path, content);
        path
    }

    /// Write a user model outside the search path.
    pub fn write_model(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join("models").join(name);
        write_file(&path, content);
        path
    }

    pub fn search_path(&self) -> SearchPath {
        SearchPath::new(self.roots.clone())
    }

    pub fn config(&self) -> LibraryConfig {
        LibraryConfig::new(self.roots.clone())
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}
