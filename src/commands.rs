//! UI command boundary: the five note operations the renderer invokes,
//! with string errors and serializable payloads.

use serde::{Deserialize, Serialize};

use crate::session::NotesSession;
use crate::store::NoteSummary;

/// Note list entry as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    pub id: String,
    pub title: String,
    pub last_edit_time: u64,
}

impl From<NoteSummary> for NoteInfo {
    fn from(summary: NoteSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            last_edit_time: summary.last_edit_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedNote {
    pub id: String,
}

/// Refresh from disk and return the list, most recent first. A listing failure
/// comes back as an error with the session's list left empty.
pub async fn get_notes(session: &NotesSession) -> Result<Vec<NoteInfo>, String> {
    session.load().await?;
    Ok(session.notes().into_iter().map(NoteInfo::from).collect())
}

pub async fn read_note(session: &NotesSession, id: String) -> Result<String, String> {
    Ok(session.read_note(&id).await?)
}

pub async fn write_note(session: &NotesSession, id: String, content: String) -> Result<NoteInfo, String> {
    Ok(session.write_note(&id, content).await?.into())
}

pub async fn create_note(session: &NotesSession) -> Result<CreatedNote, String> {
    let summary = session.create_note().await?;
    Ok(CreatedNote { id: summary.id })
}

pub async fn delete_note(session: &NotesSession, id: String) -> Result<(), String> {
    Ok(session.delete_note(&id).await?)
}
