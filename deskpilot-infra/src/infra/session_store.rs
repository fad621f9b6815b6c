//! Per-session JSONL transcript files.

use deskpilot_core::{SessionState, TranscriptEntry};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid session key")]
    InvalidKey,
}

pub struct SessionStore {
    base_path: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, SessionStoreError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn session_path(&self, session_key: &str) -> Result<PathBuf, SessionStoreError> {
        if session_key.is_empty()
            || session_key.contains("..")
            || session_key.contains('/')
            || session_key.contains('\\')
        {
            return Err(SessionStoreError::InvalidKey);
        }
        Ok(self.base_path.join(format!("{}.jsonl", session_key)))
    }

    /// Load a transcript. Corrupted lines and entries written by a newer
    /// schema are skipped.
    pub fn load(&self, session_key: &str) -> Result<Vec<TranscriptEntry>, SessionStoreError> {
        let path = self.session_path(session_key)?;

        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut entries = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TranscriptEntry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping corrupted line {} in {}: {}", index + 1, path.display(), e);
                    continue;
                }
            };
            if let Err(e) = entry.validate_version() {
                warn!("Skipping line {} in {}: {}", index + 1, path.display(), e);
                continue;
            }
            entries.push(entry);
        }

        Ok(entries)
    }

    pub fn append(&self, session_key: &str, entry: &TranscriptEntry) -> Result<(), SessionStoreError> {
        self.append_all(session_key, std::slice::from_ref(entry))
    }

    pub fn append_all(
        &self,
        session_key: &str,
        entries: &[TranscriptEntry],
    ) -> Result<(), SessionStoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let path = self.session_path(session_key)?;

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        for entry in entries {
            writeln!(file, "{}", serde_json::to_string(entry)?)?;
        }
        file.sync_all()?;

        Ok(())
    }

    /// Replace the whole transcript (temp file + rename).
    pub fn save(&self, session_key: &str, entries: &[TranscriptEntry]) -> Result<(), SessionStoreError> {
        let path = self.session_path(session_key)?;
        let temp_path = path.with_extension("tmp");

        {
            let mut file = File::create(&temp_path)?;
            for entry in entries {
                writeln!(file, "{}", serde_json::to_string(entry)?)?;
            }
            file.sync_all()?;
        }

        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Append every entry the session gained since `persisted`, returning the
    /// new persisted length.
    pub fn persist_new(
        &self,
        session: &SessionState,
        persisted: usize,
    ) -> Result<usize, SessionStoreError> {
        let fresh = session.entries_since(persisted);
        self.append_all(session.id(), &fresh)?;
        Ok(persisted + fresh.len())
    }

    pub fn delete(&self, session_key: &str) -> Result<(), SessionStoreError> {
        let path = self.session_path(session_key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
