//! Prompt construction from the live session configuration.

use chrono::{DateTime, Local};

use crate::types::SessionConfig;

/// Assistant reply recorded after the configured initial prompt.
pub const INITIAL_PROMPT_ACK: &str = "I understand. How can I help you?";

/// Suffix user text with the current date and/or time when enabled.
///
/// Produces `"<text> (Date: YYYY-MM-DD | Time: HH:MM:SS)"`, or only the enabled
/// half.
pub fn augment_user_text(text: &str, config: &SessionConfig, now: DateTime<Local>) -> String {
    let mut parts = Vec::with_capacity(2);
    if config.include_date {
        parts.push(format!("Date: {}", now.format("%Y-%m-%d")));
    }
    if config.include_time {
        parts.push(format!("Time: {}", now.format("%H:%M:%S")));
    }
    if parts.is_empty() {
        return text.to_string();
    }
    format!("{} ({})", text, parts.join(" | "))
}

/// System prompt for a text-mode turn.
pub fn system_prompt(config: &SessionConfig, now: DateTime<Local>) -> String {
    let mut prompt = format!(
        "You are a desktop assistant running on the device \"{}\".\n\
         Current local time: {}.\n",
        config.device_label,
        now.format("%Y-%m-%d %H:%M:%S")
    );

    if config.function_calling_enabled {
        prompt.push_str(
            "You can control the computer through the provided functions: system settings \
             (volume, brightness, power, windows, processes), files and directories, terminal \
             commands, web search and downloads, and image/audio generation and editing.\n\
             Prefer calling a function over describing how the user could do it themselves.\n\
             Ask for confirmation before shutting down, restarting, or deleting anything.\n",
        );
    } else {
        prompt.push_str("Function calling is disabled; answer in plain text only.\n");
    }

    if !config.initial_prompt.trim().is_empty() {
        prompt.push_str("\nUser instructions:\n");
        prompt.push_str(config.initial_prompt.trim());
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_augment_with_date_and_time() {
        let config = SessionConfig::default();
        assert_eq!(
            augment_user_text("mute", &config, fixed_now()),
            "mute (Date: 2026-03-14 | Time: 09:26:53)"
        );
    }

    #[test]
    fn test_augment_date_only() {
        let config = SessionConfig {
            include_time: false,
            ..SessionConfig::default()
        };
        assert_eq!(
            augment_user_text("hi", &config, fixed_now()),
            "hi (Date: 2026-03-14)"
        );
    }

    #[test]
    fn test_augment_disabled() {
        let config = SessionConfig {
            include_date: false,
            include_time: false,
            ..SessionConfig::default()
        };
        assert_eq!(augment_user_text("hi", &config, fixed_now()), "hi");
    }

    #[test]
    fn test_system_prompt_mentions_device_and_instructions() {
        let config = SessionConfig {
            device_label: "workstation".into(),
            initial_prompt: "Speak like a pirate.".into(),
            ..SessionConfig::default()
        };
        let prompt = system_prompt(&config, fixed_now());
        assert!(prompt.contains("\"workstation\""));
        assert!(prompt.contains("2026-03-14 09:26:53"));
        assert!(prompt.contains("Speak like a pirate."));
        assert!(prompt.contains("provided functions"));
    }

    #[test]
    fn test_system_prompt_without_functions() {
        let config = SessionConfig {
            function_calling_enabled: false,
            ..SessionConfig::default()
        };
        let prompt = system_prompt(&config, fixed_now());
        assert!(prompt.contains("plain text only"));
        assert!(!prompt.contains("provided functions"));
    }
}
