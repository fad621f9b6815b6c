//! Application settings: a flat key/value document plus environment
//! overrides, turned into the immutable [`SessionConfig`] the runtime reads.

use deskpilot_core::SessionConfig;
use deskpilot_infra::{SettingsError, SettingsStore};
use deskpilot_tools::ValidationPolicy;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const OPENAI_REALTIME_MODEL: &str = "OPENAI_REALTIME_MODEL";
pub const VOICE: &str = "VOICE";
pub const INITIAL_PROMPT: &str = "INITIAL_PROMPT";
pub const DEVICE: &str = "DEVICE";
pub const INCLUDE_DATE: &str = "INCLUDE_DATE";
pub const INCLUDE_TIME: &str = "INCLUDE_TIME";
pub const FUNCTION_CALLING: &str = "FUNCTION_CALLING";
pub const PC_USERNAME: &str = "PC_USERNAME";
pub const VALIDATION_POLICY: &str = "VALIDATION_POLICY";
pub const COMMAND_TIMEOUT_MS: &str = "COMMAND_TIMEOUT_MS";

/// Every recognized key, in display order.
pub const KEYS: &[&str] = &[
    OPENAI_API_KEY,
    OPENAI_BASE_URL,
    OPENAI_MODEL,
    OPENAI_REALTIME_MODEL,
    VOICE,
    INITIAL_PROMPT,
    DEVICE,
    INCLUDE_DATE,
    INCLUDE_TIME,
    FUNCTION_CALLING,
    PC_USERNAME,
    VALIDATION_POLICY,
    COMMAND_TIMEOUT_MS,
];

pub const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "sage", "shimmer", "verse",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub realtime_model: String,
    pub voice: String,
    pub initial_prompt: String,
    pub device: String,
    pub include_date: bool,
    pub include_time: bool,
    pub function_calling: bool,
    pub pc_username: String,
    pub validation_policy: ValidationPolicy,
    pub command_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            realtime_model: "gpt-4o-mini-realtime-preview-2024-12-17".to_string(),
            voice: "echo".to_string(),
            initial_prompt: String::new(),
            device: "unknown".to_string(),
            include_date: true,
            include_time: true,
            function_calling: true,
            pc_username: "YourUsername".to_string(),
            validation_policy: ValidationPolicy::Permissive,
            command_timeout_ms: 30_000,
        }
    }
}

impl Settings {
    /// Load the settings file, then let matching environment variables win.
    pub fn load(store: &SettingsStore) -> Result<Self, SettingsError> {
        let file = store.load()?;
        Ok(Self::from_sources(&file, |key| std::env::var(key).ok()))
    }

    /// Build settings from file values and an environment lookup. Invalid
    /// values are logged and leave the default in place.
    pub fn from_sources(
        file: &BTreeMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut settings = Self::default();
        for &key in KEYS {
            let value = env(key).or_else(|| file.get(key).cloned());
            if let Some(value) = value {
                if let Err(e) = settings.set(key, &value) {
                    warn!("Ignoring setting: {}", e);
                }
            }
        }
        settings
    }

    /// Apply one key. Unknown keys and malformed values are rejected.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = |reason: &str| SettingsError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = value.trim();
        match key {
            OPENAI_API_KEY => {
                self.api_key = (!trimmed.is_empty()).then(|| trimmed.to_string());
            }
            OPENAI_BASE_URL => {
                if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                    return Err(invalid("expected an http(s) URL"));
                }
                self.base_url = trimmed.trim_end_matches('/').to_string();
            }
            OPENAI_MODEL => self.model = non_empty(trimmed).ok_or_else(|| invalid("cannot be empty"))?,
            OPENAI_REALTIME_MODEL => {
                self.realtime_model = non_empty(trimmed).ok_or_else(|| invalid("cannot be empty"))?
            }
            VOICE => {
                let voice = trimmed.to_ascii_lowercase();
                if !VOICES.contains(&voice.as_str()) {
                    return Err(invalid(&format!("expected one of {}", VOICES.join(", "))));
                }
                self.voice = voice;
            }
            INITIAL_PROMPT => self.initial_prompt = value.to_string(),
            DEVICE => self.device = non_empty(trimmed).unwrap_or_else(|| "unknown".to_string()),
            INCLUDE_DATE => self.include_date = parse_bool(trimmed).ok_or_else(|| invalid("expected true or false"))?,
            INCLUDE_TIME => self.include_time = parse_bool(trimmed).ok_or_else(|| invalid("expected true or false"))?,
            FUNCTION_CALLING => {
                self.function_calling = parse_bool(trimmed).ok_or_else(|| invalid("expected true or false"))?
            }
            PC_USERNAME => {
                self.pc_username = non_empty(trimmed).ok_or_else(|| invalid("cannot be empty"))?
            }
            VALIDATION_POLICY => self.validation_policy = trimmed.parse().map_err(|e: String| invalid(&e))?,
            COMMAND_TIMEOUT_MS => {
                let ms: u64 = trimmed.parse().map_err(|_| invalid("expected milliseconds"))?;
                if ms == 0 {
                    return Err(invalid("must be greater than zero"));
                }
                self.command_timeout_ms = ms;
            }
            _ => return Err(invalid("unknown setting")),
        }
        Ok(())
    }

    /// Display form of every key. The API key is masked.
    pub fn display_values(&self) -> Vec<(&'static str, String)> {
        let api_key = match &self.api_key {
            Some(key) if key.chars().count() > 8 => {
                let head: String = key.chars().take(3).collect();
                let tail: String = key.chars().skip(key.chars().count() - 4).collect();
                format!("{head}...{tail}")
            }
            Some(_) => "****".to_string(),
            None => "(not set)".to_string(),
        };
        vec![
            (OPENAI_API_KEY, api_key),
            (OPENAI_BASE_URL, self.base_url.clone()),
            (OPENAI_MODEL, self.model.clone()),
            (OPENAI_REALTIME_MODEL, self.realtime_model.clone()),
            (VOICE, self.voice.clone()),
            (INITIAL_PROMPT, self.initial_prompt.clone()),
            (DEVICE, self.device.clone()),
            (INCLUDE_DATE, self.include_date.to_string()),
            (INCLUDE_TIME, self.include_time.to_string()),
            (FUNCTION_CALLING, self.function_calling.to_string()),
            (PC_USERNAME, self.pc_username.clone()),
            (VALIDATION_POLICY, self.validation_policy.to_string()),
            (COMMAND_TIMEOUT_MS, self.command_timeout_ms.to_string()),
        ]
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.model.clone(),
            voice: self.voice.clone(),
            initial_prompt: self.initial_prompt.clone(),
            include_date: self.include_date,
            include_time: self.include_time,
            function_calling_enabled: self.function_calling,
            device_label: self.device.clone(),
        }
    }
}

/// Validate `key = value` and write it into the settings file. Environment
/// overrides are never written back.
pub fn persist_value(store: &SettingsStore, key: &str, value: &str) -> Result<(), SettingsError> {
    let key = key.trim().to_ascii_uppercase();
    Settings::default().set(&key, value)?;
    let mut file = store.load()?;
    file.insert(key, value.trim().to_string());
    store.save(&file)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
