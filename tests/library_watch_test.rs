//! Integration tests for the live library (filesystem watcher -> index -> cache -> references)
//!
//! These tests drive a real watcher over a temporary library, so they wait on broadcast changes
//! with generous timeouts rather than fixed sleeps.

#![cfg(feature = "service")]

mod common;

use common::{init_logging, place, wait_for_change, TestLibrary};
use ldraw_core::{codec::no_progress, model::ResolutionState, service::LibraryService};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn created_parts_satisfy_missing_references() {
    init_logging();
    let library = TestLibrary::new(1);
    let model = library.model("car.ldr", &format!("0 Car\n{}", place("3002.dat")));
    let service = LibraryService::new(library.config()).unwrap();
    let changes = service.subscribe();
    service.start_watching().unwrap();
    assert!(service.is_watching());

    let document = service.open(&model, &mut no_progress).unwrap();
    let reference = document.main_page().unwrap().references()[0];
    assert_eq!(reference.state(), ResolutionState::Missing);

    library.write(0, "parts/3002.dat", "0 Brick 2 x 3\n");
    let change = wait_for_change(&changes, TIMEOUT, |c| c.added.contains("3002.dat"));
    assert!(change.is_some(), "no change broadcast for the new part");
    assert_eq!(reference.state(), ResolutionState::Unresolved);

    assert_eq!(service.resolver().resolve_all(&document).resolved, 1);
    assert_eq!(
        reference.target().unwrap().title().as_deref(),
        Some("Brick 2 x 3")
    );
    service.stop_watching();
    assert!(!service.is_watching());
}

#[test]
fn edits_evict_cached_documents() {
    init_logging();
    let library = TestLibrary::new(1);
    let part = library.write(0, "parts/3001.dat", "0 Brick 2 x 4\n");
    let model = library.model("car.ldr", &format!("0 Car\n{}", place("3001.dat")));
    let service = LibraryService::new(library.config()).unwrap();
    let changes = service.subscribe();
    service.start_watching().unwrap();

    let document = service.open(&model, &mut no_progress).unwrap();
    assert_eq!(service.cache().claim_count("3001.dat"), Some(1));

    std::fs::write(&part, "0 Brick 2 x 4 (revised)\n").unwrap();
    let change = wait_for_change(&changes, TIMEOUT, |c| c.modified.contains("3001.dat"));
    assert!(change.is_some(), "no change broadcast for the edit");
    assert!(service.cache().lookup("3001.dat").is_none());

    let reference = document.main_page().unwrap().references()[0];
    assert_eq!(service.resolver().resolve_all(&document).resolved, 1);
    assert_eq!(
        reference.target().unwrap().title().as_deref(),
        Some("Brick 2 x 4 (revised)")
    );
}

#[test]
fn snapshot_follows_the_live_index() {
    init_logging();
    let library = TestLibrary::new(1);
    library.write(0, "parts/3001.dat", "0 Brick 2 x 4\n");
    let mut config = library.config();
    let snapshot = library.root(0).join(".ldraw-index.json");
    config.index_cache = Some(snapshot.clone());
    let service = LibraryService::new(config).unwrap();
    let changes = service.subscribe();
    service.start_watching().unwrap();

    library.write(0, "parts/3003.dat", "0 Brick 2 x 2\n");
    assert!(wait_for_change(&changes, TIMEOUT, |c| c.added.contains("3003.dat")).is_some());
    service.stop_watching();

    let saved = ldraw_core::library::IndexSnapshot::read(&snapshot).unwrap();
    assert!(saved.cards.iter().any(|card| card.target_key == "3003.dat"));
}
