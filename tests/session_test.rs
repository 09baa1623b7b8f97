//! Session tests: switching notes, create/delete of the open note, shutdown flush
//!
//! Debounce is long enough that nothing here is written by the timer unless a
//! test waits for it.

use std::fs;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use notety::{AutosaveEvent, NoteStore, NotesChange, NotesConfig, NotesSession};

fn config_in(temp_dir: &TempDir) -> NotesConfig {
    let mut config = NotesConfig::with_notes_dir(temp_dir.path().join("notes"));
    config.create_welcome_note = false;
    config.autosave_debounce_ms = 200;
    config
}

async fn open_session(temp_dir: &TempDir) -> NotesSession {
    NotesSession::open(config_in(temp_dir)).await.unwrap()
}

#[tokio::test]
async fn test_welcome_note_on_first_launch() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config_in(&temp_dir);
    config.create_welcome_note = true;

    let session = NotesSession::open(config.clone()).await.unwrap();
    let notes = session.notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(session.active_id(), Some(notes[0].id.clone()));
    assert!(session.active_content().unwrap().starts_with("# Welcome"));
    drop(session);

    // Not seeded again once the folder has content
    let session = NotesSession::open(config).await.unwrap();
    assert_eq!(session.notes().len(), 1);
}

#[tokio::test]
async fn test_empty_directory_opens_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;

    assert!(session.notes().is_empty());
    assert!(session.active().is_none());
    assert!(!session.edit("typed into nothing"));
}

#[tokio::test]
async fn test_create_opens_new_note_at_head() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;

    let first = session.create_note().await.unwrap();
    let second = session.create_note().await.unwrap();

    let ids: Vec<String> = session.notes().into_iter().map(|s| s.id).collect();
    assert_eq!(ids[0], second.id);
    assert_eq!(ids.iter().filter(|id| **id == second.id).count(), 1);
    assert!(ids.contains(&first.id));
    assert_eq!(session.active_id(), Some(second.id.clone()));
    assert_eq!(session.selected_id(), Some(second.id));
}

#[tokio::test]
async fn test_switching_notes_flushes_pending_edits() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let a = session.create_note().await.unwrap().id;
    let b = session.create_note().await.unwrap().id;

    session.select(&a).await.unwrap();
    assert!(session.edit("draft of A"));
    assert!(session.autosave().has_unsaved(&a));

    let content_b = session.select(&b).await.unwrap();
    assert_eq!(content_b, "");
    assert_eq!(session.read_note(&a).await.unwrap(), "draft of A");
    assert!(!session.autosave().has_unsaved(&a));

    // Coming back shows the saved draft
    assert_eq!(session.select(&a).await.unwrap(), "draft of A");
}

#[tokio::test]
async fn test_failed_flush_keeps_current_note_open() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let a = session.create_note().await.unwrap().id;
    let b = session.create_note().await.unwrap().id;

    session.edit("unsaved work in B");
    fs::remove_file(session.store().dir().join(format!("{}.md", b))).unwrap();

    let err = session.select(&a).await.unwrap_err();
    assert!(err.is_not_found(), "got {:?}", err);
    assert_eq!(session.active_id(), Some(b.clone()));
    assert_eq!(session.active_content().as_deref(), Some("unsaved work in B"));
    assert_eq!(
        session.autosave().unsaved_content(&b).as_deref(),
        Some("unsaved work in B")
    );
}

#[tokio::test]
async fn test_autosave_fires_after_quiet_window() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let id = session.create_note().await.unwrap().id;
    let mut events = session.subscribe();

    session.edit("H");
    session.edit("He");
    session.edit("Hello");

    let event = tokio::time::timeout(Duration::from_secs(3), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        AutosaveEvent::Saved(summary) => {
            assert_eq!(summary.id, id);
            assert_eq!(summary.title, "Hello");
        }
        other => panic!("expected Saved, got {:?}", other),
    }
    assert_eq!(session.read_note(&id).await.unwrap(), "Hello");
    assert_eq!(session.notes()[0].title, "Hello");
}

#[tokio::test]
async fn test_write_note_is_immediate() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let id = session.create_note().await.unwrap().id;

    session.edit("older buffered edit");
    let summary = session.write_note(&id, "# Final\ntext").await.unwrap();

    assert_eq!(summary.title, "Final");
    assert_eq!(session.read_note(&id).await.unwrap(), "# Final\ntext");
    assert_eq!(session.active_content().as_deref(), Some("# Final\ntext"));

    // The superseded edit must not land later
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(session.read_note(&id).await.unwrap(), "# Final\ntext");
}

#[tokio::test]
async fn test_delete_open_note_opens_next_head() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let a = session.create_note().await.unwrap().id;
    session.write_note(&a, "first note").await.unwrap();
    let b = session.create_note().await.unwrap().id;

    session.edit("pending edit that must not resurrect B");
    session.delete_note(&b).await.unwrap();

    assert_eq!(session.active_id(), Some(a.clone()));
    assert_eq!(session.active_content().as_deref(), Some("first note"));
    assert!(session.notes().iter().all(|s| s.id != b));
    assert!(session.read_note(&b).await.unwrap_err().is_not_found());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!session.store().dir().join(format!("{}.md", b)).exists());

    session.delete_note(&a).await.unwrap();
    assert!(session.active().is_none());
    assert!(session.notes().is_empty());
}

#[tokio::test]
async fn test_delete_other_note_keeps_open_note() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let a = session.create_note().await.unwrap().id;
    let b = session.create_note().await.unwrap().id;

    session.delete_note(&a).await.unwrap();
    session.delete_note(&a).await.unwrap();

    assert_eq!(session.active_id(), Some(b.clone()));
    assert_eq!(session.notes().len(), 1);
}

#[tokio::test]
async fn test_close_flushes_pending_edits() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(&temp_dir);
    let session = NotesSession::open(config.clone()).await.unwrap();
    let id = session.create_note().await.unwrap().id;

    session.edit("written on the way out");
    session.close().await.unwrap();
    drop(session);

    let store = NoteStore::open(&config).unwrap();
    assert_eq!(store.read(&id).unwrap(), "written on the way out");
}

#[tokio::test]
async fn test_refresh_keeps_freshly_written_note_at_head() {
    for round in 0..20 {
        let temp_dir = TempDir::new().unwrap();
        let session = open_session(&temp_dir).await;
        let a = session.create_note().await.unwrap().id;
        let b = session.create_note().await.unwrap().id;

        session.write_note(&a, "touched last").await.unwrap();
        assert_eq!(session.notes()[0].id, a);

        session.load().await.unwrap();
        let ids: Vec<String> = session.notes().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.clone(), b], "round {}: refresh reordered the list", round);
    }
}

#[tokio::test]
async fn test_refresh_keeps_unsaved_buffer_of_removed_note() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let other = session.create_note().await.unwrap().id;
    session.write_note(&other, "other note").await.unwrap();
    let open = session.create_note().await.unwrap().id;

    session.edit("unsaved buffer");
    fs::remove_file(session.store().dir().join(format!("{}.md", open))).unwrap();
    session.load().await.unwrap();

    assert_eq!(session.active_id(), Some(open.clone()));
    assert_eq!(session.active_content().as_deref(), Some("unsaved buffer"));
    assert_eq!(
        session.autosave().unsaved_content(&open).as_deref(),
        Some("unsaved buffer")
    );
    let ids: Vec<String> = session.notes().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![other]);
}

#[tokio::test]
async fn test_refresh_succeeds_when_head_note_is_unreadable() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(&temp_dir);
    fs::create_dir_all(&config.notes_dir).unwrap();
    fs::write(config.notes_dir.join("Broken.md"), [b'#', b' ', 0xff, 0xfe, b'\n']).unwrap();

    let session = NotesSession::open(config).await.unwrap();
    assert_eq!(session.notes().len(), 1);
    assert!(session.active().is_none());
    session.load().await.unwrap();
}

#[tokio::test]
async fn test_load_failure_empties_list() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    session.create_note().await.unwrap();
    assert_eq!(session.notes().len(), 1);

    fs::remove_dir_all(session.store().dir()).unwrap();
    assert!(session.load().await.is_err());
    assert!(session.notes().is_empty());
}

#[tokio::test]
async fn test_external_changes_update_list() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let own = session.create_note().await.unwrap().id;

    // Arrives from a device whose clock is ahead
    let external = session.store().dir().join("Synced.md");
    fs::write(&external, "# From another device\n").unwrap();
    fs::File::options()
        .write(true)
        .open(&external)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    session
        .apply_external_change(NotesChange::Modified(vec!["Synced".to_string()]))
        .await
        .unwrap();

    let notes = session.notes();
    assert_eq!(notes[0].id, "Synced");
    assert_eq!(notes[0].title, "From another device");
    assert_eq!(session.active_id(), Some(own.clone()), "open note is untouched");

    fs::remove_file(&external).unwrap();
    session
        .apply_external_change(NotesChange::Removed(vec!["Synced".to_string()]))
        .await
        .unwrap();
    assert!(session.notes().iter().all(|s| s.id != "Synced"));
    assert_eq!(session.notes().len(), 1);
}

#[tokio::test]
async fn test_external_removal_of_open_note() {
    let temp_dir = TempDir::new().unwrap();
    let session = open_session(&temp_dir).await;
    let id = session.create_note().await.unwrap().id;
    session.edit("buffer survives");

    fs::remove_file(session.store().dir().join(format!("{}.md", id))).unwrap();
    session
        .apply_external_change(NotesChange::Removed(vec![id.clone()]))
        .await
        .unwrap();

    assert!(session.notes().is_empty());
    assert_eq!(session.active_content().as_deref(), Some("buffer survives"));
    assert!(session.save_now().await.unwrap_err().is_not_found());
}
