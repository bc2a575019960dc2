//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

#![allow(dead_code)]

use ldraw_core::{config::LibraryConfig, event::LibraryChange};
use std::{
    path::{Path, PathBuf},
    sync::mpsc::Receiver,
    time::{Duration, Instant},
};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// An on-disk library with `n` roots (`<temp>/lib0`, `<temp>/lib1`, ...) and a `models`
/// folder outside the search path.
pub struct TestLibrary {
    dir: TempDir,
    roots: Vec<PathBuf>,
}

impl TestLibrary {
    pub fn new(n: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let roots: Vec<PathBuf> = (0..n).map(|i| dir.path().join(format!("lib{i}"))).collect();
        for root in roots.iter() {
            std::fs::create_dir_all(root.join("parts")).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        TestLibrary { dir, roots }
    }

    pub fn root(&self, i: usize) -> &Path {
        &self.roots[i]
    }

    pub fn write(&self, i: usize, relative: &str, content: &str) -> PathBuf {
        write_file(self.roots[i].join(relative), content)
    }

    pub fn model(&self, name: &str, content: &str) -> PathBuf {
        write_file(self.dir.path().join("models").join(name), content)
    }

    pub fn config(&self) -> LibraryConfig {
        let mut config = LibraryConfig::new(self.roots.clone());
        config.debounce_ms = 100;
        config
    }
}

fn write_file(path: PathBuf, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// A type-1 line placing `target` at the origin.
pub fn place(target: &str) -> String {
    format!("1 16 0 0 0 1 0 0 0 1 0 0 0 1 {target}\n")
}

/// Wait for a broadcast change matching `predicate`, folding earlier changes into the result.
pub fn wait_for_change(
    changes: &Receiver<LibraryChange>,
    timeout: Duration,
    predicate: impl Fn(&LibraryChange) -> bool,
) -> Option<LibraryChange> {
    let deadline = Instant::now() + timeout;
    let mut seen = LibraryChange::default();
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        let change = changes.recv_timeout(remaining).ok()?;
        seen.merge(change);
        if predicate(&seen) {
            return Some(seen);
        }
    }
}
