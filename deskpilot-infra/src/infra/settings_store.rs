//! Flat key/value settings persisted as YAML.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty document.
    pub fn load(&self) -> Result<BTreeMap<String, String>, SettingsError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let document: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&raw)?;
        Ok(document
            .into_iter()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key, v)))
            .collect())
    }

    /// Rewrite the whole document.
    pub fn save(&self, values: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(values)?;
        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(yaml.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    pub fn reset(&self) -> Result<(), SettingsError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn scalar_to_string(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
