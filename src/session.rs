//! The editor-facing context: which note is open, what the list shows, and
//! the path every edit takes to disk.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{broadcast, mpsc};

use crate::autosave::{AutosaveCoordinator, AutosaveEvent};
use crate::config::NotesConfig;
use crate::error::{NoteError, Result};
use crate::projection::NoteList;
use crate::store::watcher::{NotesChange, NotesWatcher};
use crate::store::{NoteStore, NoteSummary};

/// The note currently loaded in the editor. `content` is the live buffer and
/// may be ahead of what is on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNote {
    pub id: String,
    pub content: String,
}

pub struct NotesSession {
    config: NotesConfig,
    store: Arc<NoteStore>,
    projection: Arc<RwLock<NoteList>>,
    autosave: AutosaveCoordinator,
    active: Mutex<Option<ActiveNote>>,
}

impl NotesSession {
    /// Open the notes directory, seed the welcome note if configured, load the
    /// list and open the most recent note.
    pub async fn open(config: NotesConfig) -> Result<Self> {
        let store = Arc::new(NoteStore::open(&config)?);
        let projection = Arc::new(RwLock::new(NoteList::new()));
        let autosave = AutosaveCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&projection),
            config.autosave_debounce(),
        );

        if config.create_welcome_note {
            if let Err(e) = store.run(|s| s.ensure_welcome_note()).await {
                log::warn!("[session] Could not create welcome note: {}", e);
            }
        }

        let session = Self {
            config,
            store,
            projection,
            autosave,
            active: Mutex::new(None),
        };
        session.load().await?;
        Ok(session)
    }

    pub fn config(&self) -> &NotesConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<NoteStore> {
        &self.store
    }

    pub fn autosave(&self) -> &AutosaveCoordinator {
        &self.autosave
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutosaveEvent> {
        self.autosave.subscribe()
    }

    /// Re-read the list from disk. On failure the list is emptied and the
    /// error returned. The open note and its buffer are never replaced, even
    /// if the note is gone from disk; the head note is opened only when
    /// nothing is open.
    pub async fn load(&self) -> Result<()> {
        match self.store.run(|s| s.list()).await {
            Ok(summaries) => {
                let active_id = self.active_id();
                {
                    let mut list = self.projection_mut();
                    list.replace(summaries);
                    if let Some(active_id) = &active_id {
                        if !list.select(active_id) {
                            log::warn!("[session] Open note {} is no longer on disk", active_id);
                        }
                    }
                }
                if active_id.is_none() {
                    if let Err(e) = self.activate_selected().await {
                        log::warn!("[session] Could not open the most recent note: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                log::error!("[session] Failed to list notes: {}", e);
                self.projection_mut().clear();
                Err(e)
            }
        }
    }

    /// Snapshot of the note list, most recent first.
    pub fn notes(&self) -> Vec<NoteSummary> {
        self.projection().items().to_vec()
    }

    pub fn selected_id(&self) -> Option<String> {
        self.projection().selected().map(str::to_string)
    }

    pub fn active(&self) -> Option<ActiveNote> {
        self.active_guard().clone()
    }

    pub fn active_id(&self) -> Option<String> {
        self.active_guard().as_ref().map(|a| a.id.clone())
    }

    pub fn active_content(&self) -> Option<String> {
        self.active_guard().as_ref().map(|a| a.content.clone())
    }

    /// Switch the editor to another note. Pending edits of the current note are
    /// written first; if that fails the switch is abandoned and the current
    /// note stays open with its unsaved buffer.
    pub async fn select(&self, id: &str) -> Result<String> {
        if let Some(active) = self.active() {
            if active.id == id {
                return Ok(active.content);
            }
            self.autosave.flush(&active.id).await?;
        }

        let read_id = id.to_string();
        let content = match self.store.run(move |s| s.read(&read_id)).await {
            Ok(content) => content,
            Err(e) => {
                if e.is_not_found() {
                    self.projection_mut().remove(id);
                }
                return Err(e);
            }
        };

        self.projection_mut().select(id);
        self.set_active(Some(ActiveNote {
            id: id.to_string(),
            content: content.clone(),
        }));
        log::debug!("[session] Opened {}", id);
        Ok(content)
    }

    /// Replace the editor buffer of the open note and schedule an autosave.
    /// Returns false when no note is open.
    pub fn edit(&self, content: impl Into<String>) -> bool {
        let content = content.into();
        let id = {
            let mut active = self.active_guard();
            match active.as_mut() {
                Some(note) => {
                    note.content = content.clone();
                    note.id.clone()
                }
                None => {
                    log::warn!("[session] Edit ignored: no note is open");
                    return false;
                }
            }
        };
        self.autosave.update(&id, content);
        true
    }

    /// Write the open note's pending edits right away.
    pub async fn save_now(&self) -> Result<Option<NoteSummary>> {
        match self.active_id() {
            Some(id) => self.autosave.flush(&id).await,
            None => Ok(None),
        }
    }

    /// Write a note immediately. Goes through the coordinator so it is ordered
    /// after any edit of the same note that is still waiting.
    pub async fn write_note(&self, id: &str, content: impl Into<String>) -> Result<NoteSummary> {
        let content = content.into();
        {
            let mut active = self.active_guard();
            if let Some(note) = active.as_mut().filter(|n| n.id == id) {
                note.content = content.clone();
            }
        }
        self.autosave.update(id, content);
        match self.autosave.flush(id).await? {
            Some(summary) => Ok(summary),
            // Written by a concurrent flush that took our payload
            None => {
                let summary_id = id.to_string();
                self.store.run(move |s| s.summary(&summary_id)).await
            }
        }
    }

    /// Content as last written to disk.
    pub async fn read_note(&self, id: &str) -> Result<String> {
        let read_id = id.to_string();
        self.store.run(move |s| s.read(&read_id)).await
    }

    /// Create a note, put it on top of the list and open it.
    pub async fn create_note(&self) -> Result<NoteSummary> {
        if let Some(id) = self.active_id() {
            self.autosave.flush(&id).await?;
        }

        let summary = self.store.run(|s| s.create()).await?;
        let read_id = summary.id.clone();
        let content = self.store.run(move |s| s.read(&read_id)).await?;

        {
            let mut list = self.projection_mut();
            list.upsert_to_front(summary.clone());
            list.select(&summary.id);
        }
        self.set_active(Some(ActiveNote {
            id: summary.id.clone(),
            content,
        }));
        log::info!("[session] Created note {}", summary.id);
        Ok(summary)
    }

    /// Delete a note. Pending autosaves for it are dropped and the file is
    /// removed under the note's write lock, so nothing writes it back. If it
    /// was open, the new head of the list is opened.
    pub async fn delete_note(&self, id: &str) -> Result<()> {
        let store = Arc::clone(&self.store);
        let delete_id = id.to_string();
        self.autosave
            .discard_with(id, move || async move { store.run(move |s| s.delete(&delete_id)).await })
            .await?;
        self.projection_mut().remove(id);
        log::info!("[session] Deleted note {}", id);

        if self.active_id().as_deref() == Some(id) {
            self.set_active(None);
            if let Err(e) = self.activate_selected().await {
                log::warn!("[session] Could not open the next note after delete: {}", e);
            }
        }
        Ok(())
    }

    /// Flush everything before the application exits.
    pub async fn close(&self) -> Result<()> {
        let written = self.autosave.flush_all().await?;
        log::info!("[session] Closed ({} pending note(s) written)", written);
        Ok(())
    }

    /// Start watching the notes directory. Feed the received changes to
    /// [`apply_external_change`](Self::apply_external_change).
    pub fn watch(&self) -> Result<(NotesWatcher, mpsc::UnboundedReceiver<NotesChange>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = NotesWatcher::start(self.store.dir(), self.config.autosave_debounce() / 4, move |change| {
            let _ = tx.send(change);
        })?;
        Ok((watcher, rx))
    }

    /// Bring the list in line with changes made on disk by someone else. An
    /// open note that disappears stays in the editor; its next save reports
    /// NotFound.
    pub async fn apply_external_change(&self, change: NotesChange) -> Result<()> {
        match change {
            NotesChange::Modified(ids) => {
                let summaries = self
                    .store
                    .run(move |s| {
                        let mut out = Vec::new();
                        for id in ids {
                            match s.summary(&id) {
                                Ok(summary) => out.push(summary),
                                Err(NoteError::NotFound { .. }) => {}
                                Err(e) => return Err(e),
                            }
                        }
                        Ok(out)
                    })
                    .await?;
                self.projection_mut().merge(summaries);
            }
            NotesChange::Removed(ids) => {
                let active_id = self.active_id();
                let mut list = self.projection_mut();
                for id in ids {
                    if self.store.dir().join(crate::store::id::note_file_name(&id)).exists() {
                        continue;
                    }
                    list.remove(&id);
                    if active_id.as_deref() == Some(id.as_str()) {
                        log::warn!("[session] Open note {} was removed outside the app", id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Open whatever the list has selected (or nothing if the list is empty).
    async fn activate_selected(&self) -> Result<()> {
        let selected = self.selected_id();
        let id = match selected {
            Some(id) => id,
            None => {
                self.set_active(None);
                return Ok(());
            }
        };

        let read_id = id.clone();
        match self.store.run(move |s| s.read(&read_id)).await {
            Ok(content) => {
                self.set_active(Some(ActiveNote { id, content }));
                Ok(())
            }
            Err(e) => {
                self.set_active(None);
                if e.is_not_found() {
                    self.projection_mut().remove(&id);
                }
                Err(e)
            }
        }
    }

    fn set_active(&self, note: Option<ActiveNote>) {
        *self.active_guard() = note;
    }

    fn active_guard(&self) -> MutexGuard<'_, Option<ActiveNote>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn projection(&self) -> RwLockReadGuard<'_, NoteList> {
        self.projection.read().unwrap_or_else(|e| e.into_inner())
    }

    fn projection_mut(&self) -> RwLockWriteGuard<'_, NoteList> {
        self.projection.write().unwrap_or_else(|e| e.into_inner())
    }
}
