use deskpilot_core::{Role, SessionConfig, SessionState, TranscriptEntry};
use deskpilot_infra::infra::session_store::{SessionStore, SessionStoreError};
use std::io::Write;
use tempfile::TempDir;

#[test]
fn test_load_empty_session() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path()).unwrap();

    let entries = store.load("test_session").unwrap();
    assert!(entries.is_empty());
}

#[test]
fn test_append_and_load() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path()).unwrap();

    let first = TranscriptEntry::new(Role::User, "hello");
    let second = TranscriptEntry::new(Role::Assistant, "hi");
    store.append("test_session", &first).unwrap();
    store.append("test_session", &second).unwrap();

    let entries = store.load("test_session").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].content, "hello");
    assert_eq!(entries[1].role, Role::Assistant);
}

#[test]
fn test_save_overwrites() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path()).unwrap();

    store
        .append("test_session", &TranscriptEntry::new(Role::User, "old"))
        .unwrap();
    store
        .save(
            "test_session",
            &[
                TranscriptEntry::new(Role::User, "a"),
                TranscriptEntry::new(Role::Assistant, "b"),
            ],
        )
        .unwrap();

    let entries = store.load("test_session").unwrap();
    let contents: Vec<_> = entries.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["a", "b"]);
}

#[test]
fn test_corrupted_and_future_lines_skipped() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path()).unwrap();
    store
        .append("s", &TranscriptEntry::new(Role::User, "kept"))
        .unwrap();

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(temp.path().join("s.jsonl"))
        .unwrap();
    writeln!(file, "{{not json").unwrap();
    let mut future = serde_json::to_value(TranscriptEntry::new(Role::User, "future")).unwrap();
    future["schema_version"] = serde_json::json!(99);
    writeln!(file, "{}", future).unwrap();

    let entries = store.load("s").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "kept");
}

#[test]
fn test_invalid_keys_rejected() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path()).unwrap();
    for key in ["", "../escape", "a/b"] {
        assert!(matches!(store.load(key), Err(SessionStoreError::InvalidKey)));
    }
}

#[test]
fn test_persist_new_and_restore() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path()).unwrap();
    let config = SessionConfig {
        initial_prompt: "Be brief.".to_string(),
        ..SessionConfig::default()
    };

    let session = SessionState::new("desk", config.clone());
    let mut persisted = store.persist_new(&session, 0).unwrap();
    assert_eq!(persisted, 2);

    session.append(TranscriptEntry::new(Role::User, "what time is it?"));
    persisted = store.persist_new(&session, persisted).unwrap();
    assert_eq!(persisted, 3);
    // Nothing new: no duplicate lines.
    assert_eq!(store.persist_new(&session, persisted).unwrap(), 3);

    let restored = SessionState::restore("desk", config, store.load("desk").unwrap());
    assert_eq!(restored.len(), 3);
    assert_eq!(restored.snapshot()[2].content, "what time is it?");
}

#[test]
fn test_delete_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path()).unwrap();
    store
        .append("gone", &TranscriptEntry::new(Role::User, "x"))
        .unwrap();
    store.delete("gone").unwrap();
    store.delete("gone").unwrap();
    assert!(store.load("gone").unwrap().is_empty());
}
