//! Volume, brightness, power, window and process control.

use super::process::{self, NameMatch};
use crate::error::HandlerError;
use crate::handler::CapabilityHandler;
use crate::params::{require, ParamRecord, SystemParams};
use crate::platform::{
    BrightnessAction, OsError, OsResult, PlatformCapability, PowerAction, VolumeAction,
    WindowAction,
};
use crate::registry::OperationGroup;
use async_trait::async_trait;
use deskpilot_core::{Arguments, ToolCallResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct SystemHandler {
    platform: Arc<dyn PlatformCapability>,
    restart_delay: Duration,
}

impl SystemHandler {
    pub fn new(platform: Arc<dyn PlatformCapability>) -> Self {
        Self {
            platform,
            restart_delay: Duration::from_secs(1),
        }
    }

    fn percent(value: Option<i64>) -> Result<u8, HandlerError> {
        let value = require(value, "value")?;
        Ok(value.clamp(0, 100) as u8)
    }

    async fn control_volume(&self, p: SystemParams) -> Result<ToolCallResult, HandlerError> {
        if !self.platform.features().volume {
            return Ok(ToolCallResult::failure("Volume control is not supported on this system"));
        }
        let action = require(p.action, "action")?;
        let parsed = match action.as_str() {
            "mute" => VolumeAction::Mute,
            "unmute" => VolumeAction::Unmute,
            "up" => VolumeAction::Up,
            "down" => VolumeAction::Down,
            "set" => VolumeAction::Set(Self::percent(p.value)?),
            other => {
                return Err(HandlerError::InvalidArgument(format!(
                    "unknown volume action '{other}'"
                )))
            }
        };
        let outcome = self.platform.volume(parsed).await;
        settle(
            outcome,
            format!("Volume {action} successful"),
            "Volume control is not supported on this system",
        )
    }

    async fn control_brightness(&self, p: SystemParams) -> Result<ToolCallResult, HandlerError> {
        if !self.platform.features().brightness {
            return Ok(ToolCallResult::failure(
                "Brightness control is not supported on this system",
            ));
        }
        let action = require(p.action, "action")?;
        let parsed = match action.as_str() {
            "up" => BrightnessAction::Up,
            "down" => BrightnessAction::Down,
            "set" => BrightnessAction::Set(Self::percent(p.value)?),
            other => {
                return Err(HandlerError::InvalidArgument(format!(
                    "unknown brightness action '{other}'"
                )))
            }
        };
        let outcome = self.platform.brightness(parsed).await;
        settle(
            outcome,
            format!("Brightness {action} successful"),
            "Brightness control is not supported on this system",
        )
    }

    async fn power_management(&self, p: SystemParams) -> Result<ToolCallResult, HandlerError> {
        if !self.platform.features().power {
            return Ok(ToolCallResult::failure("Power management is not supported on this system"));
        }
        let action = require(p.action, "action")?;
        let parsed = match action.as_str() {
            "sleep" => PowerAction::Sleep,
            "shutdown" => PowerAction::Shutdown,
            "restart" => PowerAction::Restart,
            "hibernate" => PowerAction::Hibernate,
            other => {
                return Err(HandlerError::InvalidArgument(format!(
                    "unknown power action '{other}'"
                )))
            }
        };
        info!("power action requested: {}", action);
        let outcome = self.platform.power(parsed).await;
        settle(
            outcome,
            format!("Power management action {action} initiated"),
            "Power management is not supported on this system",
        )
    }

    async fn window_management(&self, p: SystemParams) -> Result<ToolCallResult, HandlerError> {
        if !self.platform.features().window {
            return Ok(ToolCallResult::failure(
                "Window management is not supported on this system",
            ));
        }
        let action = require(p.action, "action")?;
        let parsed = match action.as_str() {
            "minimize" => WindowAction::Minimize,
            "maximize" => WindowAction::Maximize,
            "close" => WindowAction::Close,
            "focus" => WindowAction::Focus,
            other => {
                return Err(HandlerError::InvalidArgument(format!(
                    "unknown window action '{other}'"
                )))
            }
        };
        let Some(window_name) = p.window_name.filter(|w| !w.trim().is_empty()) else {
            return Ok(ToolCallResult::failure("No window specified"));
        };
        let outcome = self.platform.window(parsed, &window_name).await;
        settle(
            outcome,
            format!("Window {action} successful"),
            "Window management is not supported on this system",
        )
    }

    async fn process_control(&self, p: SystemParams) -> Result<ToolCallResult, HandlerError> {
        if !self.platform.features().process {
            return Ok(ToolCallResult::failure("Process control is not supported on this system"));
        }
        let action = require(p.action, "action")?;
        let name = require(p.process_name, "process_name")?.trim().to_string();
        if name.is_empty() {
            return Err(HandlerError::InvalidArgument(
                "process_name cannot be empty".to_string(),
            ));
        }
        match action.as_str() {
            "start" => {
                self.platform.launch(&name).await?;
            }
            "stop" => {
                process::terminate(&name, NameMatch::Contains, false).await?;
            }
            "restart" => {
                process::terminate(&name, NameMatch::Contains, false).await?;
                tokio::time::sleep(self.restart_delay).await;
                self.platform.launch(&name).await?;
            }
            "status" => {
                let message = if process::is_running(&name, NameMatch::Contains).await? {
                    format!("Process {name} is running")
                } else {
                    format!("Process {name} is not running")
                };
                return Ok(ToolCallResult::success(message));
            }
            other => {
                return Err(HandlerError::InvalidArgument(format!(
                    "unknown process action '{other}'"
                )))
            }
        }
        Ok(ToolCallResult::success(format!("Process {action} successful")))
    }
}

/// Map a platform outcome to a result. Runtime "unsupported" and "not found"
/// answers are plain messages; anything else is a handler failure.
fn settle(
    outcome: OsResult<()>,
    success: String,
    unsupported: &str,
) -> Result<ToolCallResult, HandlerError> {
    match outcome {
        Ok(()) => Ok(ToolCallResult::success(success)),
        Err(OsError::Unsupported(_)) => Ok(ToolCallResult::failure(unsupported)),
        Err(OsError::NotFound(msg)) => Ok(ToolCallResult::failure(msg)),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CapabilityHandler for SystemHandler {
    fn group(&self) -> OperationGroup {
        OperationGroup::System
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Arguments,
    ) -> Result<ToolCallResult, HandlerError> {
        let p = SystemParams::from_args(params);
        match operation {
            "control_volume" => self.control_volume(p).await,
            "control_brightness" => self.control_brightness(p).await,
            "power_management" => self.power_management(p).await,
            "window_management" => self.window_management(p).await,
            "process_control" => self.process_control(p).await,
            other => Err(HandlerError::UnsupportedOperation(other.to_string())),
        }
    }
}
