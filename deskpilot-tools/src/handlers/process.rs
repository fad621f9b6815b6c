//! Process table queries shared by the system and terminal handlers.

use crate::error::HandlerError;
use serde::Serialize;
use sysinfo::{Signal, System};
use tokio::task;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_usage: f32,
    pub memory: u64,
}

/// How a process name is compared against the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Exact,
    /// Case-insensitive substring.
    Contains,
}

/// An empty pattern matches nothing.
fn matches(name: &str, pattern: &str, mode: NameMatch) -> bool {
    if pattern.is_empty() {
        return false;
    }
    match mode {
        NameMatch::Exact => name == pattern,
        NameMatch::Contains => name.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

pub async fn list() -> Result<Vec<ProcessInfo>, HandlerError> {
    task::spawn_blocking(|| {
        let mut system = System::new_all();
        system.refresh_all();
        system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                cpu_usage: process.cpu_usage(),
                memory: process.memory(),
            })
            .collect()
    })
    .await
    .map_err(|e| HandlerError::Failed(e.to_string()))
}

pub async fn is_running(pattern: &str, mode: NameMatch) -> Result<bool, HandlerError> {
    Ok(list()
        .await?
        .iter()
        .any(|p| matches(&p.name, pattern, mode)))
}

/// Send SIGTERM (or the platform equivalent) to matching processes.
///
/// Stops after the first match when `first_only` is set. Returns the number of
/// processes signalled.
pub async fn terminate(pattern: &str, mode: NameMatch, first_only: bool) -> Result<usize, HandlerError> {
    let pattern = pattern.to_string();
    task::spawn_blocking(move || {
        let mut system = System::new_all();
        system.refresh_all();
        let mut count = 0;
        for process in system.processes().values() {
            if !matches(process.name(), &pattern, mode) {
                continue;
            }
            let signalled = process
                .kill_with(Signal::Term)
                .unwrap_or_else(|| process.kill());
            if signalled {
                count += 1;
                if first_only {
                    break;
                }
            }
        }
        count
    })
    .await
    .map_err(|e| HandlerError::Failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matching() {
        assert!(matches("firefox", "firefox", NameMatch::Exact));
        assert!(!matches("firefox-bin", "firefox", NameMatch::Exact));
        assert!(matches("Firefox-bin", "firefox", NameMatch::Contains));
        assert!(!matches("firefox", "", NameMatch::Contains));
        assert!(!matches("", "", NameMatch::Exact));
    }

    #[tokio::test]
    async fn test_list_includes_current_process() {
        let own = std::process::id();
        let processes = list().await.unwrap();
        assert!(processes.iter().any(|p| p.pid == own));
    }
}
