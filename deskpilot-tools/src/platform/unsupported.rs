use super::{
    BrightnessAction, FeatureSet, OsError, OsResult, PlatformCapability, PowerAction, VolumeAction,
    WindowAction,
};
use async_trait::async_trait;
use tokio::process::Command;

/// Platform with a fixed feature set and no native controls.
///
/// Used on targets without a dedicated implementation, and in tests to pin
/// the declared features.
pub struct UnsupportedPlatform {
    features: FeatureSet,
}

impl UnsupportedPlatform {
    pub fn new() -> Self {
        Self::with_features(FeatureSet {
            process: true,
            ..FeatureSet::NONE
        })
    }

    pub fn with_features(features: FeatureSet) -> Self {
        Self { features }
    }
}

impl Default for UnsupportedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported<T>(what: &str) -> OsResult<T> {
    Err(OsError::Unsupported(format!("{what} is not available on this platform")))
}

#[async_trait]
impl PlatformCapability for UnsupportedPlatform {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn features(&self) -> FeatureSet {
        self.features
    }

    async fn volume(&self, _action: VolumeAction) -> OsResult<()> {
        unsupported("volume control")
    }

    async fn brightness(&self, _action: BrightnessAction) -> OsResult<()> {
        unsupported("brightness control")
    }

    async fn power(&self, _action: PowerAction) -> OsResult<()> {
        unsupported("power management")
    }

    async fn window(&self, _action: WindowAction, _window_name: &str) -> OsResult<()> {
        unsupported("window management")
    }

    fn shell(&self, command_line: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command_line);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command_line);
            cmd
        }
    }
}
