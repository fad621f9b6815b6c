//! macOS control through AppleScript.

use super::{
    command_exists, run_checked, run_output, validate_window_name, BrightnessAction, FeatureSet,
    OsError, OsResult, PlatformCapability, PowerAction, VolumeAction, WindowAction, STEP_PERCENT,
};
use async_trait::async_trait;
use tokio::process::Command;

pub struct MacPlatform {
    osascript: bool,
    brightness_cli: bool,
}

impl MacPlatform {
    pub fn detect() -> Self {
        Self {
            osascript: command_exists("osascript"),
            brightness_cli: command_exists("brightness"),
        }
    }

    async fn osascript(script: &str) -> OsResult<String> {
        run_output("osascript", &["-e", script])
            .await
            .map(|out| out.trim().to_string())
    }

    async fn current_volume() -> OsResult<u8> {
        let raw = Self::osascript("output volume of (get volume settings)").await?;
        raw.parse()
            .map_err(|_| OsError::OperationFailed(format!("unexpected volume value: {raw}")))
    }
}

#[async_trait]
impl PlatformCapability for MacPlatform {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet {
            volume: self.osascript,
            brightness: self.brightness_cli,
            power: self.osascript,
            window: self.osascript,
            process: true,
        }
    }

    async fn volume(&self, action: VolumeAction) -> OsResult<()> {
        let script = match action {
            VolumeAction::Mute => "set volume output muted true".to_string(),
            VolumeAction::Unmute => "set volume output muted false".to_string(),
            VolumeAction::Set(level) => format!("set volume output volume {level}"),
            VolumeAction::Up => {
                let level = Self::current_volume().await?.saturating_add(STEP_PERCENT).min(100);
                format!("set volume output volume {level}")
            }
            VolumeAction::Down => {
                let level = Self::current_volume().await?.saturating_sub(STEP_PERCENT);
                format!("set volume output volume {level}")
            }
        };
        Self::osascript(&script).await.map(|_| ())
    }

    async fn brightness(&self, action: BrightnessAction) -> OsResult<()> {
        match action {
            BrightnessAction::Set(level) => {
                run_checked("brightness", &[&format!("{:.2}", f64::from(level) / 100.0)]).await
            }
            // Key codes 144/145 are the hardware brightness keys.
            BrightnessAction::Up => Self::osascript("tell application \"System Events\" to key code 144")
                .await
                .map(|_| ()),
            BrightnessAction::Down => Self::osascript("tell application \"System Events\" to key code 145")
                .await
                .map(|_| ()),
        }
    }

    async fn power(&self, action: PowerAction) -> OsResult<()> {
        let script = match action {
            PowerAction::Sleep => "tell application \"System Events\" to sleep",
            PowerAction::Shutdown => "tell application \"System Events\" to shut down",
            PowerAction::Restart => "tell application \"System Events\" to restart",
            PowerAction::Hibernate => {
                return Err(OsError::Unsupported("hibernate is not available on macOS".to_string()))
            }
        };
        Self::osascript(script).await.map(|_| ())
    }

    async fn window(&self, action: WindowAction, window_name: &str) -> OsResult<()> {
        validate_window_name(window_name)?;
        let running = Self::osascript(&format!(
            "tell application \"System Events\" to (name of processes) contains \"{window_name}\""
        ))
        .await?;
        if running != "true" {
            return Err(OsError::NotFound(format!("Window '{window_name}' not found")));
        }
        let script = match action {
            WindowAction::Minimize => format!(
                "tell application \"System Events\" to set visible of process \"{window_name}\" to false"
            ),
            WindowAction::Maximize => format!(
                "tell application \"System Events\" to set visible of process \"{window_name}\" to true"
            ),
            WindowAction::Close => format!("tell application \"{window_name}\" to quit"),
            WindowAction::Focus => format!("tell application \"{window_name}\" to activate"),
        };
        Self::osascript(&script).await.map(|_| ())
    }

    fn shell(&self, command_line: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}
