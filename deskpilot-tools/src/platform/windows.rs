//! Windows control through PowerShell.

use super::{
    command_exists, run_checked, run_output, validate_window_name, BrightnessAction, FeatureSet,
    OsError, OsResult, PlatformCapability, PowerAction, VolumeAction, WindowAction, STEP_PERCENT,
};
use async_trait::async_trait;
use tokio::process::Command;

// Virtual key codes sent through WScript.Shell.
const VK_VOLUME_MUTE: u8 = 173;
const VK_VOLUME_DOWN: u8 = 174;
const VK_VOLUME_UP: u8 = 175;

pub struct WindowsPlatform {
    powershell: bool,
}

impl WindowsPlatform {
    pub fn detect() -> Self {
        Self {
            powershell: command_exists("powershell"),
        }
    }

    async fn powershell(script: &str) -> OsResult<String> {
        run_output("powershell", &["-NoProfile", "-Command", script]).await
    }

    fn send_keys(key: u8, times: u8) -> String {
        format!(
            "$s = New-Object -ComObject WScript.Shell; 1..{times} | ForEach-Object {{ $s.SendKeys([char]{key}) }}"
        )
    }
}

#[async_trait]
impl PlatformCapability for WindowsPlatform {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet {
            volume: self.powershell,
            brightness: self.powershell,
            power: true,
            window: self.powershell,
            process: true,
        }
    }

    async fn volume(&self, action: VolumeAction) -> OsResult<()> {
        // Each key press moves the master volume by two points.
        let script = match action {
            VolumeAction::Mute | VolumeAction::Unmute => Self::send_keys(VK_VOLUME_MUTE, 1),
            VolumeAction::Up => Self::send_keys(VK_VOLUME_UP, STEP_PERCENT / 2),
            VolumeAction::Down => Self::send_keys(VK_VOLUME_DOWN, STEP_PERCENT / 2),
            VolumeAction::Set(level) => format!(
                "{}; {}",
                Self::send_keys(VK_VOLUME_DOWN, 50),
                Self::send_keys(VK_VOLUME_UP, (level / 2).max(1))
            ),
        };
        Self::powershell(&script).await.map(|_| ())
    }

    async fn brightness(&self, action: BrightnessAction) -> OsResult<()> {
        let current = "(Get-CimInstance -Namespace root/WMI -ClassName WmiMonitorBrightness).CurrentBrightness";
        let target = match action {
            BrightnessAction::Set(level) => level.to_string(),
            BrightnessAction::Up => format!("[Math]::Min(100, {current} + {STEP_PERCENT})"),
            BrightnessAction::Down => format!("[Math]::Max(0, {current} - {STEP_PERCENT})"),
        };
        let script = format!(
            "(Get-WmiObject -Namespace root/WMI -Class WmiMonitorBrightnessMethods).WmiSetBrightness(1, {target})"
        );
        Self::powershell(&script).await.map(|_| ())
    }

    async fn power(&self, action: PowerAction) -> OsResult<()> {
        match action {
            PowerAction::Sleep => {
                run_checked("rundll32.exe", &["powrprof.dll,SetSuspendState", "0,1,0"]).await
            }
            PowerAction::Shutdown => run_checked("shutdown", &["/s", "/t", "0"]).await,
            PowerAction::Restart => run_checked("shutdown", &["/r", "/t", "0"]).await,
            PowerAction::Hibernate => run_checked("shutdown", &["/h"]).await,
        }
    }

    async fn window(&self, action: WindowAction, window_name: &str) -> OsResult<()> {
        validate_window_name(window_name)?;
        let find = format!(
            "$p = Get-Process | Where-Object {{ $_.MainWindowTitle -like '*{}*' }} | Select-Object -First 1",
            window_name.replace('\'', "''")
        );
        let found = Self::powershell(&format!("{find}; if ($p) {{ 'yes' }}")).await?;
        if found.trim() != "yes" {
            return Err(OsError::NotFound(format!("Window '{window_name}' not found")));
        }
        // ShowWindow: 6 = minimize, 3 = maximize.
        let script = match action {
            WindowAction::Close => format!("{find}; $p.CloseMainWindow() | Out-Null"),
            WindowAction::Focus => format!(
                "{find}; (New-Object -ComObject WScript.Shell).AppActivate($p.Id) | Out-Null"
            ),
            WindowAction::Minimize | WindowAction::Maximize => {
                let state = if action == WindowAction::Minimize { 6 } else { 3 };
                format!(
                    "{find}; Add-Type -Name W -Namespace N -MemberDefinition '[DllImport(\"user32.dll\")] public static extern bool ShowWindow(IntPtr h, int c);'; [N.W]::ShowWindow($p.MainWindowHandle, {state}) | Out-Null"
                )
            }
        };
        Self::powershell(&script).await.map(|_| ())
    }

    fn shell(&self, command_line: &str) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    }
}
