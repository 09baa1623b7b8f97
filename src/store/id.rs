//! Note identity allocation.
//!
//! Ids are `YYYYMMDD-HHMMSSmmm-xxxx`: a UTC timestamp with millisecond
//! resolution followed by a short base-36 random suffix. Allocation reserves
//! the note file with an exclusive create, so an id is only handed out once
//! its file exists and no other note can claim the same name.

use chrono::Utc;
use rand::Rng;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{NoteError, Result};

pub const NOTE_EXTENSION: &str = "md";

const SUFFIX_LEN: usize = 4;
const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a candidate id. Uniqueness is only checked by [`IdAllocator`].
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S%3f"), suffix)
}

/// An id must be a bare, non-empty file stem: ASCII alphanumerics, `-` or `_`.
/// Anything else (separators, dots, spaces) can't name a note file.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn note_file_name(id: &str) -> String {
    format!("{}.{}", id, NOTE_EXTENSION)
}

pub(crate) fn note_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(note_file_name(id))
}

/// Id for a note file path, or None if the path isn't a note file.
pub(crate) fn id_from_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(NOTE_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if is_valid_id(stem) {
        Some(stem.to_string())
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct IdAllocator {
    max_attempts: u32,
}

impl IdAllocator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Reserve a fresh id in `dir`, leaving an empty note file behind.
    pub fn reserve(&self, dir: &Path) -> Result<String> {
        self.reserve_with(dir, generate_id)
    }

    /// Same as [`reserve`](Self::reserve) with a caller-supplied candidate source.
    pub fn reserve_with(&self, dir: &Path, mut next_candidate: impl FnMut() -> String) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let id = next_candidate();
            if !is_valid_id(&id) {
                log::warn!("[id] Rejected unsafe candidate id {:?}", id);
                continue;
            }

            let path = note_path(dir, &id);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    log::debug!("[id] Reserved {} on attempt {}", id, attempt);
                    return Ok(id);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    log::debug!("[id] Collision on {} (attempt {})", id, attempt);
                }
                Err(e) => {
                    return Err(NoteError::storage(format!("reserve {:?}", path), e));
                }
            }
        }

        Err(NoteError::IdCollision {
            attempts: self.max_attempts,
        })
    }
}
