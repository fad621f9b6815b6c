//! Session state: the append-only transcript and the active configuration.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::prompt::INITIAL_PROMPT_ACK;
use crate::types::{Role, SessionConfig, TranscriptEntry};

/// Transcript and configuration of one conversation.
///
/// `append` is the only transcript mutator. Entries are never removed or
/// reordered, so a snapshot always replays in the order operations occurred.
/// The configuration is swapped as a whole; readers holding an `Arc` keep the
/// value they started the turn with.
pub struct SessionState {
    id: String,
    transcript: Mutex<Vec<TranscriptEntry>>,
    config: RwLock<Arc<SessionConfig>>,
}

impl SessionState {
    /// Create a fresh session, seeding the initial prompt exchange if one is
    /// configured.
    pub fn new(id: impl Into<String>, config: SessionConfig) -> Self {
        let seed = seed_entries(&config);
        Self {
            id: id.into(),
            transcript: Mutex::new(seed),
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// Rebuild a session from persisted entries. Falls back to a fresh seed
    /// when nothing was persisted.
    pub fn restore(id: impl Into<String>, config: SessionConfig, entries: Vec<TranscriptEntry>) -> Self {
        if entries.is_empty() {
            return Self::new(id, config);
        }
        Self {
            id: id.into(),
            transcript: Mutex::new(entries),
            config: RwLock::new(Arc::new(config)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append an entry and return its index in the transcript.
    pub fn append(&self, entry: TranscriptEntry) -> usize {
        let mut transcript = self.transcript.lock();
        transcript.push(entry);
        transcript.len() - 1
    }

    /// Ordered copy of the whole transcript.
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().clone()
    }

    /// Entries appended at or after `offset`.
    pub fn entries_since(&self, offset: usize) -> Vec<TranscriptEntry> {
        let transcript = self.transcript.lock();
        transcript.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.transcript.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.lock().is_empty()
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<SessionConfig> {
        Arc::clone(&self.config.read())
    }

    /// Replace the configuration wholesale, returning the previous one.
    pub fn replace_config(&self, config: SessionConfig) -> Arc<SessionConfig> {
        let mut slot = self.config.write();
        std::mem::replace(&mut *slot, Arc::new(config))
    }
}

fn seed_entries(config: &SessionConfig) -> Vec<TranscriptEntry> {
    if config.initial_prompt.trim().is_empty() {
        return Vec::new();
    }
    vec![
        TranscriptEntry::new(Role::User, config.initial_prompt.clone()),
        TranscriptEntry::new(Role::Assistant, INITIAL_PROMPT_ACK),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_without_prompt_is_empty() {
        let session = SessionState::new("s1", SessionConfig::default());
        assert!(session.is_empty());
        assert_eq!(session.id(), "s1");
    }

    #[test]
    fn test_initial_prompt_is_seeded() {
        let config = SessionConfig {
            initial_prompt: "Answer briefly.".into(),
            ..SessionConfig::default()
        };
        let session = SessionState::new("s1", config);
        let entries = session.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[0].content, "Answer briefly.");
        assert_eq!(entries[1].content, INITIAL_PROMPT_ACK);
    }

    #[test]
    fn test_restore_keeps_persisted_entries() {
        let config = SessionConfig {
            initial_prompt: "seed".into(),
            ..SessionConfig::default()
        };
        let persisted = vec![TranscriptEntry::new(Role::User, "earlier")];
        let session = SessionState::restore("s1", config, persisted);
        assert_eq!(session.len(), 1);
        assert_eq!(session.snapshot()[0].content, "earlier");
    }

    #[test]
    fn test_append_returns_index() {
        let session = SessionState::new("s1", SessionConfig::default());
        assert_eq!(session.append(TranscriptEntry::new(Role::User, "a")), 0);
        assert_eq!(session.append(TranscriptEntry::new(Role::Tool, "b")), 1);
        let tail = session.entries_since(1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].content, "b");
        assert!(session.entries_since(10).is_empty());
    }

    #[test]
    fn test_replace_config_is_wholesale() {
        let session = SessionState::new("s1", SessionConfig::default());
        let before = session.config();

        let previous = session.replace_config(SessionConfig {
            voice: "sage".into(),
            include_date: false,
            ..SessionConfig::default()
        });

        assert_eq!(previous.voice, "echo");
        assert_eq!(before.voice, "echo");
        let after = session.config();
        assert_eq!(after.voice, "sage");
        assert!(!after.include_date);
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let session = Arc::new(SessionState::new("s1", SessionConfig::default()));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let session = Arc::clone(&session);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    session.append(TranscriptEntry::new(Role::Tool, format!("{}-{}", worker, i)));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = session.snapshot();
        assert_eq!(entries.len(), 400);
        for worker in 0..8 {
            let own: Vec<_> = entries
                .iter()
                .filter(|e| e.content.starts_with(&format!("{}-", worker)))
                .map(|e| e.content.clone())
                .collect();
            let expected: Vec<_> = (0..50).map(|i| format!("{}-{}", worker, i)).collect();
            assert_eq!(own, expected);
        }
    }
}
