//! Filesystem monitor for the library search path.
//!
//! The debouncer callback runs on notify's thread and does nothing but translate events into
//! [FsMessage]s and queue them. A single worker thread drains the queue and hands each batch to
//! the consumer, so consumers never run inside the debouncer and never see two batches at once.

use notify_debouncer_full::{
    new_debouncer,
    notify::{
        event::{ModifyKind, RenameMode},
        EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    },
    DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, RecvTimeoutError},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::{error::LDrawError, event::FsMessage, library::card::is_library_file};

/// A debounced watcher over one library root.
type RootWatcher = Debouncer<RecommendedWatcher, FileIdMap>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Watches every root of a search path and feeds batches of [FsMessage]s to a consumer on a
/// dedicated thread. Dropping the watcher stops the debouncers and joins the worker.
pub struct LibraryWatcher {
    watchers: Vec<(PathBuf, RootWatcher)>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LibraryWatcher {
    pub fn start<F>(roots: &[PathBuf], debounce: Duration, mut consumer: F) -> Result<Self, LDrawError>
    where
        F: FnMut(Vec<FsMessage>) + Send + 'static,
    {
        let (tx, rx) = channel::<Vec<FsMessage>>();
        let stop = Arc::new(AtomicBool::new(false));

        let mut watchers = Vec::new();
        for root in roots {
            if !root.is_dir() {
                tracing::warn!("Not watching {root:?}: not a directory");
                continue;
            }
            let root_tx = tx.clone();
            let mut debouncer = new_debouncer(
                debounce,
                None,
                move |result: DebounceEventResult| match result {
                    Ok(events) => {
                        let messages = translate(&events);
                        if messages.is_empty() {
                            return;
                        }
                        tracing::debug!("[LibraryWatcher] {} filesystem messages", messages.len());
                        if let Err(e) = root_tx.send(messages) {
                            tracing::error!("{}", LDrawError::from(e));
                        }
                    }
                    Err(errors) => {
                        tracing::error!("Notify debouncer returned errors: {:?}", errors);
                    }
                },
            )?;
            debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
            tracing::info!("Watching library root {root:?}");
            watchers.push((root.clone(), debouncer));
        }
        drop(tx);

        let worker_stop = stop.clone();
        let worker = std::thread::Builder::new()
            .name("ldraw-library-watch".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(mut batch) => {
                        // Fold whatever else is already queued into one batch.
                        while let Ok(more) = rx.try_recv() {
                            batch.extend(more);
                        }
                        consumer(batch);
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if worker_stop.load(Ordering::Acquire) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(LibraryWatcher {
            watchers,
            stop,
            worker: Some(worker),
        })
    }

    pub fn roots(&self) -> Vec<&Path> {
        self.watchers.iter().map(|(root, _)| root.as_path()).collect()
    }

    /// Stop watching and wait for the worker to finish its current batch.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        for (root, mut debouncer) in self.watchers.drain(..) {
            if let Err(e) = debouncer.watcher().unwatch(&root) {
                tracing::debug!("Unwatch {root:?} failed: {e}");
            }
            debouncer.stop();
        }
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Library watch worker panicked");
            }
        }
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Map debounced notify events onto library file messages. Paths that are not library files
/// (hidden files, foreign extensions, directories) are dropped.
pub(crate) fn translate(events: &[DebouncedEvent]) -> Vec<FsMessage> {
    let mut messages = Vec::new();
    for event in events.iter() {
        let paths = &event.event.paths;
        let message = match event.event.kind {
            EventKind::Create(_) => paths.first().cloned().map(FsMessage::Created),
            EventKind::Remove(_) => paths.first().cloned().map(FsMessage::Removed),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
                let (from, to) = (&paths[0], &paths[1]);
                match (is_library_file(from), is_library_file(to)) {
                    (true, true) => Some(FsMessage::Renamed(from.clone(), to.clone())),
                    (true, false) => Some(FsMessage::Removed(from.clone())),
                    (false, true) => Some(FsMessage::Created(to.clone())),
                    (false, false) => None,
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.first().cloned().map(FsMessage::Removed)
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.first().cloned().map(FsMessage::Created)
            }
            EventKind::Modify(_) => paths.first().cloned().map(FsMessage::Modified),
            _ => None,
        };
        if let Some(message) = message {
            if message.paths().iter().all(|p| is_library_file(p)) {
                messages.push(message);
            }
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_debouncer_full::notify::{
        event::{CreateKind, DataChange, RemoveKind},
        Event,
    };
    use std::time::Instant;

    fn debounced(kind: EventKind, paths: &[&str]) -> DebouncedEvent {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        DebouncedEvent::new(event, Instant::now())
    }

    #[test]
    fn events_become_messages() {
        let events = vec![
            debounced(EventKind::Create(CreateKind::File), &["/lib/parts/a.dat"]),
            debounced(EventKind::Remove(RemoveKind::File), &["/lib/parts/b.DAT"]),
            debounced(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/lib/models/c.ldr"],
            ),
            debounced(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/lib/parts/d.dat", "/lib/parts/e.dat"],
            ),
            debounced(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/lib/parts/f.dat", "/lib/parts/f.bak"],
            ),
            debounced(EventKind::Create(CreateKind::File), &["/lib/parts/.g.dat.swp"]),
            debounced(EventKind::Create(CreateKind::File), &["/lib/readme.txt"]),
        ];
        assert_eq!(
            translate(&events),
            vec![
                FsMessage::Created(PathBuf::from("/lib/parts/a.dat")),
                FsMessage::Removed(PathBuf::from("/lib/parts/b.DAT")),
                FsMessage::Modified(PathBuf::from("/lib/models/c.ldr")),
                FsMessage::Renamed(
                    PathBuf::from("/lib/parts/d.dat"),
                    PathBuf::from("/lib/parts/e.dat")
                ),
                FsMessage::Removed(PathBuf::from("/lib/parts/f.dat")),
            ]
        );
    }
}
