//! Linux desktop control through the standard command-line tools.

use super::{
    command_exists, run_checked, run_output, validate_window_name, BrightnessAction, FeatureSet,
    OsError, OsResult, PlatformCapability, PowerAction, VolumeAction, WindowAction, STEP_PERCENT,
};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mixer {
    Pactl,
    Amixer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backlight {
    Brightnessctl,
    Xrandr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowTool {
    Hyprctl,
    Wmctrl,
}

pub struct LinuxPlatform {
    mixer: Option<Mixer>,
    backlight: Option<Backlight>,
    window_tool: Option<WindowTool>,
    systemctl: bool,
}

impl LinuxPlatform {
    /// Look up PATH for the tools each feature needs.
    pub fn detect() -> Self {
        let mixer = if command_exists("pactl") {
            Some(Mixer::Pactl)
        } else if command_exists("amixer") {
            Some(Mixer::Amixer)
        } else {
            None
        };
        let backlight = if command_exists("brightnessctl") {
            Some(Backlight::Brightnessctl)
        } else if command_exists("xrandr") {
            Some(Backlight::Xrandr)
        } else {
            None
        };
        let window_tool = if std::env::var_os("HYPRLAND_INSTANCE_SIGNATURE").is_some()
            && command_exists("hyprctl")
        {
            Some(WindowTool::Hyprctl)
        } else if command_exists("wmctrl") {
            Some(WindowTool::Wmctrl)
        } else {
            None
        };
        let platform = Self {
            mixer,
            backlight,
            window_tool,
            systemctl: command_exists("systemctl"),
        };
        info!(
            "linux platform: mixer={:?} backlight={:?} windows={:?} systemctl={}",
            platform.mixer, platform.backlight, platform.window_tool, platform.systemctl
        );
        platform
    }

    async fn xrandr_output() -> OsResult<String> {
        let listing = run_output("xrandr", &["-q"]).await?;
        parse_connected_output(&listing)
            .ok_or_else(|| OsError::NotFound("no connected display".to_string()))
    }

    async fn xrandr_brightness() -> OsResult<f64> {
        let verbose = run_output("xrandr", &["--verbose"]).await?;
        Ok(parse_xrandr_brightness(&verbose).unwrap_or(1.0))
    }

    async fn hypr_window_address(window_name: &str) -> OsResult<String> {
        let raw = run_output("hyprctl", &["clients", "-j"]).await?;
        let clients: Value = serde_json::from_str(&raw)
            .map_err(|e| OsError::OperationFailed(format!("bad hyprctl output: {e}")))?;
        find_hypr_client(&clients, window_name)
            .ok_or_else(|| OsError::NotFound(format!("Window '{window_name}' not found")))
    }

    async fn wmctrl_has_window(window_name: &str) -> OsResult<bool> {
        let listing = run_output("wmctrl", &["-l"]).await?;
        let needle = window_name.to_lowercase();
        Ok(listing.lines().any(|line| line.to_lowercase().contains(&needle)))
    }
}

#[async_trait]
impl PlatformCapability for LinuxPlatform {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet {
            volume: self.mixer.is_some(),
            brightness: self.backlight.is_some(),
            power: self.systemctl,
            window: self.window_tool.is_some(),
            process: true,
        }
    }

    async fn volume(&self, action: VolumeAction) -> OsResult<()> {
        let step = format!("{}%", STEP_PERCENT);
        match self.mixer {
            Some(Mixer::Pactl) => {
                let sink = "@DEFAULT_SINK@";
                match action {
                    VolumeAction::Mute => run_checked("pactl", &["set-sink-mute", sink, "1"]).await,
                    VolumeAction::Unmute => run_checked("pactl", &["set-sink-mute", sink, "0"]).await,
                    VolumeAction::Up => {
                        run_checked("pactl", &["set-sink-volume", sink, &format!("+{step}")]).await
                    }
                    VolumeAction::Down => {
                        run_checked("pactl", &["set-sink-volume", sink, &format!("-{step}")]).await
                    }
                    VolumeAction::Set(level) => {
                        run_checked("pactl", &["set-sink-volume", sink, &format!("{level}%")]).await
                    }
                }
            }
            Some(Mixer::Amixer) => {
                let arg = match action {
                    VolumeAction::Mute => "mute".to_string(),
                    VolumeAction::Unmute => "unmute".to_string(),
                    VolumeAction::Up => format!("{step}+"),
                    VolumeAction::Down => format!("{step}-"),
                    VolumeAction::Set(level) => format!("{level}%"),
                };
                run_checked("amixer", &["-q", "sset", "Master", &arg]).await
            }
            None => Err(OsError::Unsupported("no mixer available".to_string())),
        }
    }

    async fn brightness(&self, action: BrightnessAction) -> OsResult<()> {
        match self.backlight {
            Some(Backlight::Brightnessctl) => {
                let arg = match action {
                    BrightnessAction::Up => format!("{}%+", STEP_PERCENT),
                    BrightnessAction::Down => format!("{}%-", STEP_PERCENT),
                    BrightnessAction::Set(level) => format!("{level}%"),
                };
                run_checked("brightnessctl", &["-q", "set", &arg]).await
            }
            Some(Backlight::Xrandr) => {
                let output = Self::xrandr_output().await?;
                let step = f64::from(STEP_PERCENT) / 100.0;
                let target = match action {
                    BrightnessAction::Set(level) => f64::from(level) / 100.0,
                    BrightnessAction::Up => (Self::xrandr_brightness().await? + step).min(1.0),
                    BrightnessAction::Down => (Self::xrandr_brightness().await? - step).max(0.1),
                };
                run_checked(
                    "xrandr",
                    &["--output", &output, "--brightness", &format!("{target:.2}")],
                )
                .await
            }
            None => Err(OsError::Unsupported("no backlight control available".to_string())),
        }
    }

    async fn power(&self, action: PowerAction) -> OsResult<()> {
        if !self.systemctl {
            return Err(OsError::Unsupported("systemctl not available".to_string()));
        }
        let verb = match action {
            PowerAction::Sleep => "suspend",
            PowerAction::Shutdown => "poweroff",
            PowerAction::Restart => "reboot",
            PowerAction::Hibernate => "hibernate",
        };
        run_checked("systemctl", &[verb]).await
    }

    async fn window(&self, action: WindowAction, window_name: &str) -> OsResult<()> {
        validate_window_name(window_name)?;
        match self.window_tool {
            Some(WindowTool::Hyprctl) => {
                let address = Self::hypr_window_address(window_name).await?;
                let selector = format!("address:{address}");
                match action {
                    WindowAction::Focus => {
                        run_checked("hyprctl", &["dispatch", "focuswindow", &selector]).await
                    }
                    WindowAction::Close => {
                        run_checked("hyprctl", &["dispatch", "closewindow", &selector]).await
                    }
                    WindowAction::Maximize => {
                        run_checked("hyprctl", &["dispatch", "focuswindow", &selector]).await?;
                        run_checked("hyprctl", &["dispatch", "fullscreen", "1"]).await
                    }
                    WindowAction::Minimize => {
                        run_checked(
                            "hyprctl",
                            &[
                                "dispatch",
                                "movetoworkspacesilent",
                                &format!("special:minimized,{selector}"),
                            ],
                        )
                        .await
                    }
                }
            }
            Some(WindowTool::Wmctrl) => {
                if !Self::wmctrl_has_window(window_name).await? {
                    return Err(OsError::NotFound(format!("Window '{window_name}' not found")));
                }
                match action {
                    WindowAction::Focus => run_checked("wmctrl", &["-a", window_name]).await,
                    WindowAction::Close => run_checked("wmctrl", &["-c", window_name]).await,
                    WindowAction::Maximize => {
                        run_checked(
                            "wmctrl",
                            &["-r", window_name, "-b", "add,maximized_vert,maximized_horz"],
                        )
                        .await
                    }
                    WindowAction::Minimize => {
                        run_checked("wmctrl", &["-r", window_name, "-b", "add,hidden"]).await
                    }
                }
            }
            None => Err(OsError::Unsupported("no window manager control available".to_string())),
        }
    }

    fn shell(&self, command_line: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

fn parse_connected_output(listing: &str) -> Option<String> {
    listing
        .lines()
        .find(|line| line.contains(" connected"))
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}

fn parse_xrandr_brightness(verbose: &str) -> Option<f64> {
    verbose
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Brightness:"))
        .and_then(|v| v.trim().parse().ok())
}

fn find_hypr_client(clients: &Value, window_name: &str) -> Option<String> {
    let needle = window_name.to_lowercase();
    clients.as_array()?.iter().find_map(|client| {
        let title = client.get("title").and_then(Value::as_str).unwrap_or_default();
        let class = client.get("class").and_then(Value::as_str).unwrap_or_default();
        if title.to_lowercase().contains(&needle) || class.to_lowercase().contains(&needle) {
            client.get("address").and_then(Value::as_str).map(str::to_string)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_connected_output() {
        let listing = "Screen 0: minimum 8 x 8\neDP-1 connected primary 1920x1080+0+0\nHDMI-1 disconnected\n";
        assert_eq!(parse_connected_output(listing).as_deref(), Some("eDP-1"));
        assert_eq!(parse_connected_output("HDMI-1 disconnected"), None);
    }

    #[test]
    fn test_parse_xrandr_brightness() {
        let verbose = "eDP-1 connected\n\tGamma: 1.0:1.0:1.0\n\tBrightness: 0.70\n";
        assert_eq!(parse_xrandr_brightness(verbose), Some(0.70));
    }

    #[test]
    fn test_find_hypr_client_matches_title_or_class() {
        let clients = json!([
            {"address": "0x1", "title": "Inbox - Mail", "class": "thunderbird"},
            {"address": "0x2", "title": "README.md", "class": "firefox"}
        ]);
        assert_eq!(find_hypr_client(&clients, "inbox").as_deref(), Some("0x1"));
        assert_eq!(find_hypr_client(&clients, "Firefox").as_deref(), Some("0x2"));
        assert_eq!(find_hypr_client(&clients, "slack"), None);
    }
}
