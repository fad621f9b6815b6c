//! Append-only, SHA-256 hash-chained audit log.
//!
//! Each line carries the hash of the previous line's entry, so edits,
//! deletions and reordering are detected by [`AuditLogger::verify_integrity`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::infra::contracts::AuditEntry;

const GENESIS: &str = "genesis";

#[derive(Error, Debug)]
pub enum AuditLoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Chain integrity violation: {0}")]
    IntegrityViolation(String),
}

#[derive(Serialize, Deserialize, Clone)]
struct ChainedAuditEntry {
    entry_hash: String,
    prev_hash: String,
    #[serde(flatten)]
    entry: AuditEntry,
}

/// State guarded together so concurrent appends cannot fork the chain.
struct Tail {
    file: File,
    last_hash: String,
}

pub struct AuditLogger {
    log_path: PathBuf,
    tail: Mutex<Tail>,
}

impl AuditLogger {
    /// Open (or create) the log. An existing log must verify.
    pub fn new<P: AsRef<Path>>(log_path: P) -> Result<Self, AuditLoggerError> {
        let log_path = log_path.as_ref().to_path_buf();

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_hash = Self::verify_and_get_last_hash(&log_path)?.0;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            log_path,
            tail: Mutex::new(Tail { file, last_hash }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn append(&self, entry: &AuditEntry) -> Result<(), AuditLoggerError> {
        let mut tail = self.tail.lock();

        let prev_hash = tail.last_hash.clone();
        let entry_hash = chain_hash(&prev_hash, entry)?;
        let chained_entry = ChainedAuditEntry {
            entry_hash: entry_hash.clone(),
            prev_hash,
            entry: entry.clone(),
        };

        let json = serde_json::to_string(&chained_entry)?;
        writeln!(tail.file, "{}", json)?;
        tail.file.sync_all()?;
        tail.last_hash = entry_hash;

        Ok(())
    }

    /// Re-read the whole log and check every link. Returns the entry count.
    pub fn verify_integrity(&self) -> Result<usize, AuditLoggerError> {
        Ok(Self::verify_and_get_last_hash(&self.log_path)?.1)
    }

    fn verify_and_get_last_hash(log_path: &Path) -> Result<(String, usize), AuditLoggerError> {
        if !log_path.exists() {
            return Ok((GENESIS.to_string(), 0));
        }

        let reader = BufReader::new(File::open(log_path)?);
        let mut prev_hash = GENESIS.to_string();
        let mut count = 0;

        for (index, line) in reader.lines().enumerate() {
            let line_num = index + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let chained_entry: ChainedAuditEntry = serde_json::from_str(&line).map_err(|e| {
                AuditLoggerError::IntegrityViolation(format!("Line {}: Invalid JSON: {}", line_num, e))
            })?;

            if chained_entry.prev_hash != prev_hash {
                return Err(AuditLoggerError::IntegrityViolation(format!(
                    "Line {}: Hash chain broken. Expected prev_hash '{}', got '{}'",
                    line_num, prev_hash, chained_entry.prev_hash
                )));
            }

            let computed_hash = chain_hash(&prev_hash, &chained_entry.entry)?;
            if computed_hash != chained_entry.entry_hash {
                return Err(AuditLoggerError::IntegrityViolation(format!(
                    "Line {}: Hash mismatch. Expected '{}', got '{}'",
                    line_num, computed_hash, chained_entry.entry_hash
                )));
            }

            prev_hash = chained_entry.entry_hash;
            count += 1;
        }

        Ok((prev_hash, count))
    }
}

fn chain_hash(prev_hash: &str, entry: &AuditEntry) -> Result<String, AuditLoggerError> {
    let entry_json = serde_json::to_string(entry)?;
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(entry_json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
