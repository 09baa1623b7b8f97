use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use super::id::id_from_path;
use super::is_temp_file;
use crate::error::{NoteError, Result};

/// Notes touched by something other than this process (or confirmed after our own writes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotesChange {
    Modified(Vec<String>),
    Removed(Vec<String>),
}

pub struct NotesWatcher {
    _watcher: RecommendedWatcher,
}

impl NotesWatcher {
    /// Watch the notes directory and report changed/removed notes once each
    /// path has been quiet for `debounce`.
    pub fn start<F>(notes_dir: &Path, debounce: Duration, on_change: F) -> Result<Self>
    where
        F: Fn(NotesChange) + Send + 'static,
    {
        let dir = notes_dir.to_path_buf();
        // Some platforms report canonical paths (e.g. /private/var on macOS)
        let canonical_dir = notes_dir.canonicalize().unwrap_or_else(|_| dir.clone());
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            tx,
            Config::default().with_poll_interval(Duration::from_millis(300)),
        )
        .map_err(watch_error)?;

        watcher
            .watch(dir.as_path(), RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        let tick = (debounce / 2).max(Duration::from_millis(10));
        thread::spawn(move || {
            let mut pending_paths: HashMap<PathBuf, Instant> = HashMap::new();

            loop {
                match rx.recv_timeout(tick) {
                    Ok(Ok(event)) => {
                        let now = Instant::now();
                        for path in &event.paths {
                            if should_process_path(path, &dir) || should_process_path(path, &canonical_dir) {
                                pending_paths.insert(path.clone(), now);
                            }
                        }

                        if matches!(event.kind, EventKind::Remove(_)) {
                            let removed: Vec<String> = event
                                .paths
                                .iter()
                                .filter(|p| {
                                    (should_process_path(p, &dir) || should_process_path(p, &canonical_dir))
                                        && !p.exists()
                                })
                                .filter_map(|p| id_from_path(p))
                                .collect();
                            for path in &event.paths {
                                pending_paths.remove(path);
                            }
                            if !removed.is_empty() {
                                on_change(NotesChange::Removed(removed));
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        log::warn!("[watcher] File watcher error: {}", e);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let now = Instant::now();
                        let mut stable = Vec::new();
                        pending_paths.retain(|path, last_event| {
                            if now.duration_since(*last_event) >= debounce {
                                stable.push(path.clone());
                                false
                            } else {
                                true
                            }
                        });

                        if stable.is_empty() {
                            continue;
                        }
                        log::debug!("[watcher] Processing {} stable paths", stable.len());

                        let (present, gone): (Vec<PathBuf>, Vec<PathBuf>) =
                            stable.into_iter().partition(|p| p.is_file());
                        let modified: Vec<String> = present.iter().filter_map(|p| id_from_path(p)).collect();
                        let removed: Vec<String> = gone.iter().filter_map(|p| id_from_path(p)).collect();

                        if !modified.is_empty() {
                            on_change(NotesChange::Modified(modified));
                        }
                        if !removed.is_empty() {
                            on_change(NotesChange::Removed(removed));
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("[watcher] Stopped watching {:?}", dir);
        });

        Ok(NotesWatcher { _watcher: watcher })
    }
}

fn watch_error(e: notify::Error) -> NoteError {
    NoteError::storage("watch notes directory", io::Error::new(io::ErrorKind::Other, e.to_string()))
}

/// Only note files directly inside the notes directory are of interest.
fn should_process_path(path: &Path, notes_dir: &Path) -> bool {
    if is_temp_file(path) {
        return false;
    }
    if path.parent() != Some(notes_dir) {
        return false;
    }
    id_from_path(path).is_some()
}
