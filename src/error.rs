use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NoteError>;

#[derive(Debug, Error)]
pub enum NoteError {
    /// No file exists for the id (or the id can't name a note file at all).
    #[error("note '{id}' not found")]
    NotFound { id: String },

    #[error("note storage unavailable: {context}: {source}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("could not allocate a unique note id after {attempts} attempts")]
    IdCollision { attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl NoteError {
    pub(crate) fn not_found(id: &str) -> Self {
        NoteError::NotFound { id: id.to_string() }
    }

    pub(crate) fn storage(context: impl Into<String>, source: io::Error) -> Self {
        NoteError::StorageUnavailable {
            context: context.into(),
            source,
        }
    }

    /// Map an io error for a specific note: a missing file means the note is gone.
    pub(crate) fn from_io(id: &str, context: impl Into<String>, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            NoteError::not_found(id)
        } else {
            NoteError::storage(context, source)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NoteError::NotFound { .. })
    }
}

impl From<NoteError> for String {
    fn from(err: NoteError) -> String {
        err.to_string()
    }
}
