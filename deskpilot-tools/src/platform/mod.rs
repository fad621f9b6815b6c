//! Platform capability layer.
//!
//! One implementation per target OS, chosen once by [`detect`]. Handlers only
//! talk to the [`PlatformCapability`] trait and never branch on the OS
//! themselves.

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
pub mod unsupported;
#[cfg(target_os = "windows")]
pub mod windows;

use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

pub use unsupported::UnsupportedPlatform;

/// OS capability error types
#[derive(Debug, thiserror::Error)]
pub enum OsError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OsResult<T> = Result<T, OsError>;

/// Features this machine can serve, detected once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeatureSet {
    pub volume: bool,
    pub brightness: bool,
    pub power: bool,
    pub window: bool,
    pub process: bool,
}

impl FeatureSet {
    pub const NONE: FeatureSet = FeatureSet {
        volume: false,
        brightness: false,
        power: false,
        window: false,
        process: false,
    };

    pub const ALL: FeatureSet = FeatureSet {
        volume: true,
        brightness: true,
        power: true,
        window: true,
        process: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeAction {
    Mute,
    Unmute,
    Up,
    Down,
    Set(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessAction {
    Up,
    Down,
    Set(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Sleep,
    Shutdown,
    Restart,
    Hibernate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Minimize,
    Maximize,
    Close,
    Focus,
}

/// Step used for relative volume/brightness changes, in percent.
pub const STEP_PERCENT: u8 = 10;

#[async_trait]
pub trait PlatformCapability: Send + Sync {
    fn name(&self) -> &'static str;

    fn features(&self) -> FeatureSet;

    async fn volume(&self, action: VolumeAction) -> OsResult<()>;

    async fn brightness(&self, action: BrightnessAction) -> OsResult<()>;

    async fn power(&self, action: PowerAction) -> OsResult<()>;

    /// Returns `OsError::NotFound` when no window title matches.
    async fn window(&self, action: WindowAction, window_name: &str) -> OsResult<()>;

    /// Command that runs `command_line` through the native shell.
    fn shell(&self, command_line: &str) -> Command;

    /// Start `command_line` detached from the assistant and return its pid.
    async fn launch(&self, command_line: &str) -> OsResult<u32> {
        if command_line.trim().is_empty() {
            return Err(OsError::InvalidArgument("command cannot be empty".to_string()));
        }
        let mut cmd = self.shell(command_line);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut cmd);
        let child = cmd.spawn()?;
        child
            .id()
            .ok_or_else(|| OsError::OperationFailed("Failed to get process ID".to_string()))
    }
}

/// Select the implementation for the running OS.
pub fn detect() -> Arc<dyn PlatformCapability> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::LinuxPlatform::detect())
    }
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::MacPlatform::detect())
    }
    #[cfg(target_os = "windows")]
    {
        Arc::new(windows::WindowsPlatform::detect())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Arc::new(UnsupportedPlatform::new())
    }
}

/// Put the child in its own session so it outlives the assistant.
pub(crate) fn detach(cmd: &mut Command) {
    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

pub(crate) fn command_exists(command: &str) -> bool {
    which::which(command).is_ok()
}

pub(crate) async fn run_checked(command: &str, args: &[&str]) -> OsResult<()> {
    let output = Command::new(command).args(args).output().await?;
    if output.status.success() {
        return Ok(());
    }
    Err(OsError::OperationFailed(
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ))
}

pub(crate) async fn run_output(command: &str, args: &[&str]) -> OsResult<String> {
    let output = Command::new(command).args(args).output().await?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).to_string());
    }
    Err(OsError::OperationFailed(
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ))
}

/// Reject names that would break out of a quoted script argument.
pub(crate) fn validate_window_name(name: &str) -> OsResult<()> {
    if name.trim().is_empty() {
        return Err(OsError::InvalidArgument("window name cannot be empty".to_string()));
    }
    if name.chars().any(|ch| ch.is_control() || matches!(ch, '"' | '\\' | '`')) {
        return Err(OsError::InvalidArgument(
            "window name contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_window_name() {
        assert!(validate_window_name("Firefox").is_ok());
        assert!(validate_window_name("  ").is_err());
        assert!(validate_window_name("a\"; do shell script").is_err());
    }

    #[tokio::test]
    async fn test_detect_returns_a_platform() {
        let platform = detect();
        assert!(!platform.name().is_empty());
    }
}
