//! Last-line check on shell command lines the model asks to run.
//!
//! Commands run through the user's shell with the user's privileges; this
//! only refuses inputs that are malformed or irrecoverably destructive.

use crate::error::HandlerError;

const MAX_COMMAND_LEN: usize = 8 * 1024;

/// Substrings (matched on whitespace-normalized, lowercased input) that are
/// never executed.
const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "rm -fr /",
    "mkfs",
    ":(){ :|:& };:",
    "> /dev/sda",
    "of=/dev/sd",
    "of=/dev/nvme",
    "chmod -r 777 /",
    "format c:",
];

pub struct CommandGuard;

impl CommandGuard {
    pub fn validate(command: &str) -> Result<(), HandlerError> {
        if command.trim().is_empty() {
            return Err(HandlerError::InvalidArgument("command cannot be empty".into()));
        }
        if command.len() > MAX_COMMAND_LEN {
            return Err(HandlerError::InvalidArgument(format!(
                "command exceeds {} bytes",
                MAX_COMMAND_LEN
            )));
        }
        if command.contains('\0') {
            return Err(HandlerError::InvalidArgument(
                "command contains a null byte".into(),
            ));
        }

        let normalized = command
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        for &pattern in BLOCKED_PATTERNS {
            let blocked = if pattern.ends_with('/') {
                // `rm -rf /` must not match `rm -rf /tmp/x`.
                normalized == pattern
                    || normalized.contains(&format!("{} ", pattern))
                    || normalized.ends_with(pattern)
            } else {
                normalized.contains(pattern)
            };
            if blocked {
                return Err(HandlerError::InvalidArgument(format!(
                    "Blocked command: matches '{}'",
                    pattern
                )));
            }
        }
        Ok(())
    }
}
