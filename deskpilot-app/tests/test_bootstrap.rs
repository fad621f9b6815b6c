#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use deskpilot_app::bootstrap::{AppContext, DataPaths};
use deskpilot_app::config::Settings;
use deskpilot_core::{Role, TranscriptEntry};

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.set("INITIAL_PROMPT", "You are my desktop helper.").unwrap();
    settings
}

#[test]
fn test_build_creates_data_layout() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::new(dir.path().join("data"));

    let context = AppContext::build(paths.clone(), settings(), "first").unwrap();
    assert!(paths.sessions().is_dir());
    assert!(paths.media().is_dir());
    assert!(!context.dispatcher.registry().is_empty());

    // Fresh session is seeded from the initial prompt.
    let entries = context.session.snapshot();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].role, Role::User);
    assert_eq!(entries[1].role, Role::Assistant);
}

#[test]
fn test_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::new(dir.path());

    {
        let mut context = AppContext::build(paths.clone(), settings(), "kitchen").unwrap();
        context
            .session
            .append(TranscriptEntry::new(Role::User, "turn on the lights"));
        context.persist().unwrap();
        // Second persist writes nothing new.
        context.persist().unwrap();
    }

    let context = AppContext::build(paths, settings(), "kitchen").unwrap();
    let entries = context.session.snapshot();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].content, "turn on the lights");
    assert_eq!(context.persisted, 3);
}

#[test]
fn test_sessions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::new(dir.path());

    let mut a = AppContext::build(paths.clone(), Settings::default(), "a").unwrap();
    a.session.append(TranscriptEntry::new(Role::User, "only in a"));
    a.persist().unwrap();

    let b = AppContext::build(paths, Settings::default(), "b").unwrap();
    assert!(b.session.is_empty());
}
