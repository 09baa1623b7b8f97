use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{NoteError, Result};

/// Quiet window before a burst of edits is written.
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 3000;
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 8;
pub const DEFAULT_TITLE_MAX_CHARS: usize = 80;

/// Folder name under the user's home directory when no notes_dir is configured
const DEFAULT_NOTES_FOLDER: &str = "Notety";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    pub notes_dir: PathBuf,
    pub autosave_debounce_ms: u64,
    pub max_id_attempts: u32,
    pub title_max_chars: usize,
    /// Seed an empty notes directory with a welcome note on first launch
    pub create_welcome_note: bool,
    /// Content written into every newly created note
    pub new_note_template: String,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            notes_dir: default_notes_dir(),
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            create_welcome_note: true,
            new_note_template: String::new(),
        }
    }
}

impl NotesConfig {
    /// Config rooted at an explicit notes directory, everything else defaulted.
    pub fn with_notes_dir(notes_dir: impl Into<PathBuf>) -> Self {
        Self {
            notes_dir: notes_dir.into(),
            ..Self::default()
        }
    }

    /// Load config from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("[config] {:?} not found, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(NoteError::Config(format!(
                    "Failed to read config {:?}: {}",
                    path, e
                )))
            }
        };

        let config: NotesConfig = serde_json::from_str(&content)
            .map_err(|e| NoteError::Config(format!("Failed to parse config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| NoteError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| NoteError::storage(format!("create {:?}", parent), e))?;
        }
        crate::atomic_write_file(path, content.as_bytes())
            .map_err(|e| NoteError::storage(format!("write {:?}", path), e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.notes_dir.as_os_str().is_empty() {
            return Err(NoteError::Config("notes_dir must not be empty".to_string()));
        }
        if self.max_id_attempts == 0 {
            return Err(NoteError::Config("max_id_attempts must be at least 1".to_string()));
        }
        if self.title_max_chars == 0 {
            return Err(NoteError::Config("title_max_chars must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}

fn default_notes_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_NOTES_FOLDER)
}
