pub mod id;
pub mod watcher;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::NotesConfig;
use crate::error::{NoteError, Result};
use crate::title::{derive_title_with_limit, title_from_line, UNTITLED};
use crate::{atomic_write_file, TEMP_SUFFIX};

use id::{id_from_path, is_valid_id, note_path, IdAllocator};

const WELCOME_NOTE_CONTENT: &str = "# Welcome to Notety 👋\n\n\
Notes are plain Markdown files kept in one folder, one file per note.\n\n\
- Start typing and your changes are saved automatically.\n\
- The first line of a note becomes its title in the sidebar.\n\
- Use the buttons above the list to create or delete notes.\n";

/// One entry of the note list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: String,
    pub title: String,
    /// File modification time, milliseconds since the Unix epoch
    pub last_edit_time: u64,
}

/// Sole owner of the notes directory. Every operation is a short blocking
/// filesystem call; async callers go through [`NoteStore::run`].
#[derive(Debug)]
pub struct NoteStore {
    dir: PathBuf,
    allocator: IdAllocator,
    title_max_chars: usize,
    template: String,
    /// Latest edit time (ms) written or seen on disk
    latest_edit: Mutex<u64>,
}

impl NoteStore {
    /// Open (creating if needed) the notes directory and clear temp files an
    /// interrupted write may have left behind.
    pub fn open(config: &NotesConfig) -> Result<Self> {
        config.validate()?;
        let dir = config.notes_dir.clone();
        fs::create_dir_all(&dir)
            .map_err(|e| NoteError::storage(format!("create notes directory {:?}", dir), e))?;

        let store = Self {
            dir,
            allocator: IdAllocator::new(config.max_id_attempts),
            title_max_chars: config.title_max_chars,
            template: config.new_note_template.clone(),
            latest_edit: Mutex::new(0),
        };
        store.cleanup_temp_files();
        // Listing once seeds latest_edit from what is already on disk
        match store.list() {
            Ok(notes) => log::info!("[store] Opened notes directory {:?} ({} notes)", store.dir, notes.len()),
            Err(e) => log::warn!("[store] Opened notes directory {:?} but could not list it: {}", store.dir, e),
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run a store operation on the blocking pool.
    pub async fn run<T, F>(self: &Arc<Self>, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&NoteStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| {
                NoteError::storage("store task", io::Error::new(io::ErrorKind::Other, e.to_string()))
            })?
    }

    /// All notes on disk, most recently edited first.
    pub fn list(&self) -> Result<Vec<NoteSummary>> {
        let read_dir = fs::read_dir(&self.dir)
            .map_err(|e| NoteError::storage(format!("read directory {:?}", self.dir), e))?;

        let mut summaries: Vec<NoteSummary> = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            let id = match id_from_path(&path) {
                Some(id) => id,
                None => continue,
            };
            match self.summary_at(&id, &path) {
                Ok(summary) => summaries.push(summary),
                // Removed between read_dir and stat
                Err(NoteError::NotFound { .. }) => continue,
                Err(e) => log::warn!("[store] Skipping {:?}: {}", path, e),
            }
        }

        sort_by_recency(&mut summaries);
        Ok(summaries)
    }

    pub fn summary(&self, id: &str) -> Result<NoteSummary> {
        let path = self.existing_note_path(id)?;
        self.summary_at(id, &path)
    }

    pub fn read(&self, id: &str) -> Result<String> {
        let path = self.existing_note_path(id)?;
        fs::read_to_string(&path).map_err(|e| NoteError::from_io(id, format!("read {:?}", path), e))
    }

    /// Replace a note's content. The note must already exist so that a write
    /// racing with a delete can't bring the note back.
    pub fn write(&self, id: &str, content: &str) -> Result<NoteSummary> {
        let path = self.existing_note_path(id)?;
        atomic_write_file(&path, content.as_bytes())
            .map_err(|e| NoteError::storage(format!("write {:?}", path), e))?;

        let last_edit_time = self.stamp_edit(id, &path)?;
        log::debug!("[store] Wrote {} ({} bytes)", id, content.len());

        Ok(NoteSummary {
            id: id.to_string(),
            title: derive_title_with_limit(content, self.title_max_chars),
            last_edit_time,
        })
    }

    /// Create a note with the configured template.
    pub fn create(&self) -> Result<NoteSummary> {
        let template = self.template.clone();
        self.create_with_content(&template)
    }

    pub fn create_with_content(&self, content: &str) -> Result<NoteSummary> {
        self.ensure_dir()?;
        let id = self.allocator.reserve(&self.dir)?;
        let path = note_path(&self.dir, &id);

        let created = if content.is_empty() {
            self.stamp_edit(&id, &path).map(|last_edit_time| NoteSummary {
                id: id.clone(),
                title: derive_title_with_limit(content, self.title_max_chars),
                last_edit_time,
            })
        } else {
            self.write(&id, content)
        };

        match created {
            Ok(summary) => {
                log::debug!("[store] Created {}", id);
                Ok(summary)
            }
            Err(e) => {
                // Don't leave the reserved empty file behind as a phantom note
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }

    /// Remove a note. Deleting a note that is already gone succeeds.
    pub fn delete(&self, id: &str) -> Result<()> {
        if !is_valid_id(id) {
            log::debug!("[store] Delete of invalid id {:?} ignored", id);
            return Ok(());
        }
        self.ensure_dir()?;

        let path = note_path(&self.dir, id);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("[store] Deleted {}", id);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("[store] Delete of missing note {} treated as done", id);
                Ok(())
            }
            Err(e) => Err(NoteError::storage(format!("delete {:?}", path), e)),
        }
    }

    /// Seed an empty directory with the welcome note. Returns the new note, if any.
    pub fn ensure_welcome_note(&self) -> Result<Option<NoteSummary>> {
        if !self.list()?.is_empty() {
            return Ok(None);
        }
        let summary = self.create_with_content(WELCOME_NOTE_CONTENT)?;
        log::info!("[store] Created welcome note {}", summary.id);
        Ok(Some(summary))
    }

    fn ensure_dir(&self) -> Result<()> {
        match fs::metadata(&self.dir) {
            Ok(m) if m.is_dir() => Ok(()),
            Ok(_) => Err(NoteError::storage(
                format!("notes path {:?}", self.dir),
                io::Error::new(io::ErrorKind::Other, "not a directory"),
            )),
            Err(e) => Err(NoteError::storage(format!("notes directory {:?}", self.dir), e)),
        }
    }

    /// Path of an existing note file. A missing directory is a storage
    /// failure; a missing file (or an id that can't name one) is NotFound.
    fn existing_note_path(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_id(id) {
            return Err(NoteError::not_found(id));
        }
        self.ensure_dir()?;

        let path = note_path(&self.dir, id);
        match fs::metadata(&path) {
            Ok(m) if m.is_file() => Ok(path),
            Ok(_) => Err(NoteError::not_found(id)),
            Err(e) => Err(NoteError::from_io(id, format!("stat {:?}", path), e)),
        }
    }

    fn summary_at(&self, id: &str, path: &Path) -> Result<NoteSummary> {
        let metadata =
            fs::metadata(path).map_err(|e| NoteError::from_io(id, format!("stat {:?}", path), e))?;
        if !metadata.is_file() {
            return Err(NoteError::not_found(id));
        }
        let title = read_title(path, self.title_max_chars)
            .map_err(|e| NoteError::from_io(id, format!("read title {:?}", path), e))?;

        let last_edit_time = mtime_millis(&metadata);
        let mut latest = self.latest_edit();
        *latest = (*latest).max(last_edit_time);

        Ok(NoteSummary {
            id: id.to_string(),
            title,
            last_edit_time,
        })
    }

    /// Give a note that was just written an edit time later than every other
    /// one, bumping the file's mtime when the clock hasn't moved on. Writes
    /// landing in the same millisecond still list newest first.
    fn stamp_edit(&self, id: &str, path: &Path) -> Result<u64> {
        let metadata =
            fs::metadata(path).map_err(|e| NoteError::from_io(id, format!("stat {:?}", path), e))?;
        let observed = mtime_millis(&metadata);

        let mut latest = self.latest_edit();
        if observed > *latest {
            *latest = observed;
            return Ok(observed);
        }

        let stamped = *latest + 1;
        fs::OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(UNIX_EPOCH + Duration::from_millis(stamped)))
            .map_err(|e| NoteError::from_io(id, format!("set mtime {:?}", path), e))?;
        *latest = stamped;
        Ok(stamped)
    }

    fn latest_edit(&self) -> MutexGuard<'_, u64> {
        self.latest_edit.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cleanup_temp_files(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("[store] Could not scan for stale temp files: {}", e);
                return;
            }
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if is_temp_file(&path) {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("[store] Failed to remove stale temp file {:?}: {}", path, e),
                }
            }
        }
        if removed > 0 {
            log::info!("[store] Removed {} stale temp file(s)", removed);
        }
    }
}

pub(crate) fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(&format!(".{}", TEMP_SUFFIX)))
        .unwrap_or(false)
}

/// Most recent first; ties fall back to id, which orders allocator ids by creation.
pub(crate) fn sort_by_recency(summaries: &mut [NoteSummary]) {
    summaries.sort_by(|a, b| {
        b.last_edit_time
            .cmp(&a.last_edit_time)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Title from the first non-empty line, reading no further than that line.
fn read_title(path: &Path, max_chars: usize) -> io::Result<String> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(UNTITLED.to_string());
        }
        if let Some(title) = title_from_line(&String::from_utf8_lossy(&line), max_chars) {
            return Ok(title);
        }
    }
}

fn mtime_millis(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        })
}
