pub mod autosave;
pub mod commands;
pub mod config;
pub mod error;
pub mod projection;
pub mod session;
pub mod store;
pub mod title;



use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub use autosave::{AutosaveCoordinator, AutosaveEvent, AutosavePhase};
pub use config::NotesConfig;
pub use error::{NoteError, Result};
pub use projection::NoteList;
pub use session::{ActiveNote, NotesSession};
pub use store::watcher::{NotesChange, NotesWatcher};
pub use store::{NoteStore, NoteSummary};
pub use title::derive_title;

/// Suffix of the temp file an atomic write goes through.
pub(crate) const TEMP_SUFFIX: &str = "notety-tmp";

/// Atomic file write: write to a temp file in the same directory, then rename.
/// Readers (and sync clients watching the folder) only ever see the old file
/// or the complete new one; File::create on the target would truncate it first.
pub(crate) fn atomic_write_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp_path = path.with_file_name(format!("{}.{}", file_name, TEMP_SUFFIX));

    let result = (|| -> io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Install the process logger: Info level in debug builds, Warn otherwise,
/// overridable with RUST_LOG. Hosts that bring their own logger skip this.
pub fn init_logging() {
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}
