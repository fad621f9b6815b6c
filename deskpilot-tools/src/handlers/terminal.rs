//! Shell commands, process table, host information and project builds.

use super::process::{self, NameMatch};
use crate::command_guard::CommandGuard;
use crate::error::HandlerError;
use crate::handler::CapabilityHandler;
use crate::params::{require, ParamRecord, TerminalParams};
use crate::platform::PlatformCapability;
use crate::registry::OperationGroup;
use async_trait::async_trait;
use deskpilot_core::{Arguments, ToolCallResult};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Disks, Networks, System};
use tokio::process::Command;
use tracing::{debug, info};

/// Sink for `print_message`.
pub type Printer = Arc<dyn Fn(&str) + Send + Sync>;

const MAX_LISTED_PROCESSES: usize = 50;

pub struct TerminalHandler {
    platform: Arc<dyn PlatformCapability>,
    command_timeout: Duration,
    printer: Printer,
}

impl TerminalHandler {
    pub fn new(platform: Arc<dyn PlatformCapability>, command_timeout: Duration) -> Self {
        Self {
            platform,
            command_timeout,
            printer: Arc::new(|message| println!("Deskpilot: {message}")),
        }
    }

    pub fn with_printer(mut self, printer: Printer) -> Self {
        self.printer = printer;
        self
    }

    /// Run a command line through the platform shell and collect its output.
    async fn run_shell(&self, command_line: &str) -> Result<Output, HandlerError> {
        CommandGuard::validate(command_line)?;
        debug!("shell: {}", command_line);

        let mut cmd = self.platform.shell(command_line);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(output) => output.map_err(HandlerError::io(format!(
                "Error executing command {command_line}"
            ))),
            Err(_) => Err(HandlerError::Timeout(self.command_timeout.as_millis() as u64)),
        }
    }

    async fn execute_command(&self, p: TerminalParams) -> Result<ToolCallResult, HandlerError> {
        let command = require(p.command, "command")?;
        let output = self.run_shell(&command).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            if stdout.trim().is_empty() {
                Ok(ToolCallResult::success("Command executed successfully"))
            } else {
                Ok(ToolCallResult::success(stdout))
            }
        } else {
            Ok(ToolCallResult::failure(format!(
                "Error: {}",
                String::from_utf8_lossy(&output.stderr)
            )))
        }
    }

    async fn execute_command_with_output(
        &self,
        p: TerminalParams,
    ) -> Result<ToolCallResult, HandlerError> {
        let command = require(p.command, "command")?;
        let output = self.run_shell(&command).await?;
        let code = output.status.code();
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let mut message = match code {
            Some(code) => format!("Return code: {code}\n"),
            None => "Return code: terminated by signal\n".to_string(),
        };
        if !stdout.is_empty() {
            message.push_str(&format!("STDOUT:\n{stdout}\n"));
        }
        if !stderr.is_empty() {
            message.push_str(&format!("STDERR:\n{stderr}\n"));
        }

        let mut data = Map::new();
        data.insert("return_code".into(), json!(code));
        data.insert("stdout".into(), Value::String(stdout));
        data.insert("stderr".into(), Value::String(stderr));
        Ok(ToolCallResult::success_with(message, data))
    }

    async fn start_process(&self, p: TerminalParams) -> Result<ToolCallResult, HandlerError> {
        let name = require(p.process_name, "process_name")?;
        CommandGuard::validate(&name)?;
        let pid = self.platform.launch(&name).await?;
        info!("started {} (pid {})", name, pid);
        let mut data = Map::new();
        data.insert("pid".into(), json!(pid));
        Ok(ToolCallResult::success_with(format!("Process started: {name}"), data))
    }

    async fn stop_process(&self, p: TerminalParams) -> Result<ToolCallResult, HandlerError> {
        let name = require(p.process_name, "process_name")?.trim().to_string();
        if name.is_empty() {
            return Err(HandlerError::InvalidArgument(
                "process_name cannot be empty".to_string(),
            ));
        }
        if process::terminate(&name, NameMatch::Exact, true).await? > 0 {
            Ok(ToolCallResult::success(format!("Process stopped: {name}")))
        } else {
            Ok(ToolCallResult::failure(format!("Process not found: {name}")))
        }
    }

    async fn list_processes(&self) -> Result<ToolCallResult, HandlerError> {
        let mut processes = process::list().await?;
        processes.sort_by(|a, b| b.memory.cmp(&a.memory));
        processes.truncate(MAX_LISTED_PROCESSES);

        let mut message = String::from("PID\tNAME\tCPU%\tMEMORY\n");
        for p in &processes {
            message.push_str(&format!(
                "{}\t{}\t{:.1}\t{}\n",
                p.pid, p.name, p.cpu_usage, p.memory
            ));
        }
        let mut data = Map::new();
        data.insert(
            "processes".into(),
            serde_json::to_value(&processes).unwrap_or(Value::Null),
        );
        Ok(ToolCallResult::success_with(message, data))
    }

    async fn get_system_info(&self) -> Result<ToolCallResult, HandlerError> {
        let info = tokio::task::spawn_blocking(|| {
            let mut system = System::new_all();
            // CPU usage needs two samples.
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            system.refresh_cpu();

            let disks = Disks::new_with_refreshed_list();
            let disk_list: Vec<Value> = disks
                .list()
                .iter()
                .map(|disk| {
                    json!({
                        "mount_point": disk.mount_point().display().to_string(),
                        "total": disk.total_space(),
                        "available": disk.available_space(),
                    })
                })
                .collect();

            json!({
                "platform": System::name(),
                "platform_release": System::kernel_version(),
                "platform_version": System::os_version(),
                "hostname": System::host_name(),
                "architecture": std::env::consts::ARCH,
                "cpu_count": system.cpus().len(),
                "cpu_percent": system.global_cpu_info().cpu_usage(),
                "memory_total": system.total_memory(),
                "memory_available": system.available_memory(),
                "memory_used": system.used_memory(),
                "disks": disk_list,
            })
        })
        .await
        .map_err(|e| HandlerError::Failed(format!("Error getting system info: {e}")))?;

        Ok(ToolCallResult::success_with(
            pretty(&info),
            info.as_object().cloned().unwrap_or_default(),
        ))
    }

    async fn get_network_info(&self) -> Result<ToolCallResult, HandlerError> {
        let info = tokio::task::spawn_blocking(|| {
            let networks = Networks::new_with_refreshed_list();
            let mut interfaces = Map::new();
            for (name, data) in &networks {
                interfaces.insert(
                    name.clone(),
                    json!({
                        "mac_address": data.mac_address().to_string(),
                        "received": data.total_received(),
                        "transmitted": data.total_transmitted(),
                    }),
                );
            }
            json!({ "interfaces": interfaces })
        })
        .await
        .map_err(|e| HandlerError::Failed(format!("Error getting network info: {e}")))?;

        Ok(ToolCallResult::success_with(
            pretty(&info),
            info.as_object().cloned().unwrap_or_default(),
        ))
    }

    async fn run_os_command(&self, p: TerminalParams) -> Result<ToolCallResult, HandlerError> {
        let command = require(p.command, "command")?;
        let output = self.run_shell(&command).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            Ok(ToolCallResult::success(stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Ok(ToolCallResult::failure(stderr))
        }
    }

    fn print_message(&self, p: TerminalParams) -> Result<ToolCallResult, HandlerError> {
        let message = require(p.message, "message")?;
        (self.printer)(&message);
        Ok(ToolCallResult::success(format!("Printed: {message}")))
    }

    async fn build_project(&self, p: TerminalParams) -> Result<ToolCallResult, HandlerError> {
        let project = PathBuf::from(require(p.project_path, "project_path")?);
        if !project.is_dir() {
            return Err(HandlerError::InvalidArgument(format!(
                "{} is not a directory",
                project.display()
            )));
        }

        let requested = p.build_type.unwrap_or_else(|| "auto".to_string());
        let kind = match requested.as_str() {
            "auto" => BuildKind::detect(&project).ok_or_else(|| {
                HandlerError::Failed(format!(
                    "Could not detect project type in {}",
                    project.display()
                ))
            })?,
            other => BuildKind::parse(other)
                .ok_or_else(|| HandlerError::InvalidArgument(format!("Unsupported build type: {other}")))?,
        };

        info!("building {} as {}", project.display(), kind.label());
        for step in kind.steps(&project).await? {
            run_build_step(&project, &step).await?;
        }
        Ok(ToolCallResult::success(format!(
            "{} project built successfully",
            kind.label()
        )))
    }
}

#[async_trait]
impl CapabilityHandler for TerminalHandler {
    fn group(&self) -> OperationGroup {
        OperationGroup::Terminal
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Arguments,
    ) -> Result<ToolCallResult, HandlerError> {
        let p = TerminalParams::from_args(params);
        match operation {
            "execute_command" => self.execute_command(p).await,
            "execute_command_with_output" => self.execute_command_with_output(p).await,
            "start_process" => self.start_process(p).await,
            "stop_process" => self.stop_process(p).await,
            "list_processes" => self.list_processes().await,
            "get_system_info" => self.get_system_info().await,
            "get_network_info" => self.get_network_info().await,
            "run_os_command" => self.run_os_command(p).await,
            "print_message" => self.print_message(p),
            "build_project" => self.build_project(p).await,
            other => Err(HandlerError::UnsupportedOperation(other.to_string())),
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildKind {
    Python,
    Node,
    Java,
    Rust,
    Docker,
}

impl BuildKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "python" => Some(Self::Python),
            "node" => Some(Self::Node),
            "java" => Some(Self::Java),
            "rust" => Some(Self::Rust),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }

    /// First marker file wins.
    fn detect(project: &Path) -> Option<Self> {
        [
            ("requirements.txt", Self::Python),
            ("package.json", Self::Node),
            ("pom.xml", Self::Java),
            ("Cargo.toml", Self::Rust),
            ("Dockerfile", Self::Docker),
        ]
        .into_iter()
        .find(|(marker, _)| project.join(marker).exists())
        .map(|(_, kind)| kind)
    }

    fn label(self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::Node => "Node.js",
            Self::Java => "Java",
            Self::Rust => "Rust",
            Self::Docker => "Docker",
        }
    }

    async fn steps(self, project: &Path) -> Result<Vec<Vec<String>>, HandlerError> {
        let step = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Ok(match self {
            Self::Python => {
                let pip = if cfg!(windows) {
                    "venv\\Scripts\\pip"
                } else {
                    "venv/bin/pip"
                };
                let python = if cfg!(windows) { "python" } else { "python3" };
                let mut steps = vec![step(&[python, "-m", "venv", "venv"])];
                if project.join("requirements.txt").exists() {
                    steps.push(step(&[pip, "install", "-r", "requirements.txt"]));
                }
                steps
            }
            Self::Node => {
                let mut steps = vec![step(&["npm", "install"])];
                if has_npm_build_script(project).await? {
                    steps.push(step(&["npm", "run", "build"]));
                }
                steps
            }
            Self::Java => vec![step(&["mvn", "clean", "install"])],
            Self::Rust => vec![step(&["cargo", "build", "--release"])],
            Self::Docker => {
                let tag = project
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .unwrap_or_else(|| "deskpilot-build".to_string());
                vec![step(&["docker", "build", "-t", tag.as_str(), "."])]
            }
        })
    }
}

async fn has_npm_build_script(project: &Path) -> Result<bool, HandlerError> {
    let raw = tokio::fs::read_to_string(project.join("package.json"))
        .await
        .map_err(HandlerError::io("Error reading package.json"))?;
    let manifest: Value = serde_json::from_str(&raw)
        .map_err(|e| HandlerError::Failed(format!("Invalid package.json: {e}")))?;
    Ok(manifest
        .get("scripts")
        .and_then(|s| s.get("build"))
        .is_some())
}

async fn run_build_step(project: &Path, step: &[String]) -> Result<(), HandlerError> {
    let Some((program, args)) = step.split_first() else {
        return Ok(());
    };
    let display = step.join(" ");
    let output = Command::new(program)
        .args(args)
        .current_dir(project)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(HandlerError::io(format!("Error running {display}")))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(10).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        Err(HandlerError::Failed(format!(
            "{display} failed: {}",
            tail.join("\n")
        )))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::UnsupportedPlatform;
    use serde_json::json;
    use std::sync::Mutex;

    fn handler() -> TerminalHandler {
        TerminalHandler::new(Arc::new(UnsupportedPlatform::new()), Duration::from_secs(5))
    }

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_execute_command_stdout() {
        let result = handler()
            .execute("execute_command", &args(json!({"command": "echo hello"})))
            .await
            .unwrap();
        assert!(result.ok);
        assert_eq!(result.message, "hello\n");
    }

    #[tokio::test]
    async fn test_execute_command_empty_output() {
        let result = handler()
            .execute("execute_command", &args(json!({"command": "true"})))
            .await
            .unwrap();
        assert_eq!(result.message, "Command executed successfully");
    }

    #[tokio::test]
    async fn test_execute_command_failure_reports_stderr() {
        let result = handler()
            .execute("execute_command", &args(json!({"command": "echo oops >&2; exit 3"})))
            .await
            .unwrap();
        assert!(!result.ok);
        assert_eq!(result.message, "Error: oops\n");
    }

    #[tokio::test]
    async fn test_execute_with_output_format() {
        let result = handler()
            .execute(
                "execute_command_with_output",
                &args(json!({"command": "echo out; echo err >&2; exit 2"})),
            )
            .await
            .unwrap();
        assert!(result.message.starts_with("Return code: 2\n"));
        assert!(result.message.contains("STDOUT:\nout\n"));
        assert!(result.message.contains("STDERR:\nerr\n"));
        assert_eq!(result.data.unwrap()["return_code"], 2);
    }

    #[tokio::test]
    async fn test_blocked_command_never_runs() {
        let err = handler()
            .execute("execute_command", &args(json!({"command": "rm -rf /"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Blocked command"));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let handler = TerminalHandler::new(
            Arc::new(UnsupportedPlatform::new()),
            Duration::from_millis(100),
        );
        let err = handler
            .execute("execute_command", &args(json!({"command": "sleep 5"})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Timeout(100)));
    }

    #[tokio::test]
    async fn test_run_os_command_trims() {
        let result = handler()
            .execute("run_os_command", &args(json!({"command": "printf '  x  \\n'"})))
            .await
            .unwrap();
        assert_eq!(result.message, "x");
    }

    #[tokio::test]
    async fn test_print_message_uses_printer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = handler().with_printer(Arc::new(move |m| {
            sink.lock().unwrap().push(m.to_string());
        }));
        let result = handler
            .execute("print_message", &args(json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(result.message, "Printed: hi");
        assert_eq!(seen.lock().unwrap().clone(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_stop_unknown_process() {
        let result = handler()
            .execute("stop_process", &args(json!({"process_name": "no-such-proc-9d2e"})))
            .await
            .unwrap();
        assert!(!result.ok);
        assert_eq!(result.message, "Process not found: no-such-proc-9d2e");
    }

    #[tokio::test]
    async fn test_stop_blank_process_is_rejected() {
        let err = handler()
            .execute("stop_process", &args(json!({"process_name": "  "})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_list_processes_is_bounded() {
        let result = handler()
            .execute("list_processes", &Arguments::new())
            .await
            .unwrap();
        let processes = result.data.unwrap()["processes"].as_array().unwrap().len();
        assert!(processes > 0 && processes <= MAX_LISTED_PROCESSES);
    }

    #[test]
    fn test_build_kind_detection() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(BuildKind::detect(dir.path()), None);
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();
        assert_eq!(BuildKind::detect(dir.path()), Some(BuildKind::Docker));
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(BuildKind::detect(dir.path()), Some(BuildKind::Node));
    }

    #[tokio::test]
    async fn test_build_unknown_project_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = handler()
            .execute(
                "build_project",
                &args(json!({"project_path": dir.path().to_str().unwrap()})),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Could not detect project type"));
    }
}
