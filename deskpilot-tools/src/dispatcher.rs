use crate::error::HandlerError;
use crate::handler::{CapabilityHandler, HandlerSet};
use crate::registry::{Operation, OperationRegistry};
use crate::traits::AuditLogger;
use deskpilot_core::{Arguments, Role, SessionState, ToolCallRequest, ToolCallResult, TranscriptEntry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

/// What to do when a request lacks required parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Log and pass the request through; handlers degrade on their own.
    #[default]
    Permissive,
    /// Reject the request without invoking the handler.
    Strict,
}

impl FromStr for ValidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(ValidationPolicy::Permissive),
            "strict" => Ok(ValidationPolicy::Strict),
            other => Err(format!(
                "invalid validation policy '{}': expected permissive or strict",
                other
            )),
        }
    }
}

impl fmt::Display for ValidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationPolicy::Permissive => f.write_str("permissive"),
            ValidationPolicy::Strict => f.write_str("strict"),
        }
    }
}

/// Routes tool calls to capability handlers and folds results into the
/// session transcript.
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    handlers: HandlerSet,
    audit: Arc<dyn AuditLogger>,
    policy: ValidationPolicy,
    timeout_ms: u64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<OperationRegistry>,
        handlers: HandlerSet,
        audit: Arc<dyn AuditLogger>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            registry,
            handlers,
            audit,
            policy: ValidationPolicy::default(),
            timeout_ms,
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Dispatch one tool call. Never fails: every outcome is a result value.
    ///
    /// Unknown operations return `"Unknown action: <name>"` without touching
    /// the session. Every other outcome appends exactly one `tool` entry.
    pub async fn dispatch(&self, request: ToolCallRequest, session: &SessionState) -> ToolCallResult {
        info!(
            "Dispatching operation: {} for session: {}",
            request.operation,
            session.id()
        );

        let operation = match self.registry.lookup(&request.operation) {
            Ok(op) => op,
            Err(not_found) => {
                warn!("{}", not_found);
                return ToolCallResult::failure(not_found.to_string());
            }
        };

        let started = Instant::now();
        let result = self.run(operation, &request.arguments).await;
        metrics::histogram!(
            "tool_dispatch_latency",
            started.elapsed().as_secs_f64() * 1000.0
        );

        session.append(TranscriptEntry::with_metadata(
            Role::Tool,
            result.message.clone(),
            json!({
                "operation": operation.name,
                "call_id": request.call_id,
                "ok": result.ok,
            }),
        ));

        self.log_audit_isolated(session.id(), operation, &request.arguments, &result);

        result
    }

    async fn run(&self, operation: &'static Operation, arguments: &Arguments) -> ToolCallResult {
        let missing = operation.missing_params(arguments);
        if !missing.is_empty() {
            match self.policy {
                ValidationPolicy::Permissive => {
                    warn!(
                        "Operation {} missing parameter(s): {}; passing through",
                        operation.name,
                        missing.join(", ")
                    );
                }
                ValidationPolicy::Strict => {
                    return ToolCallResult::failure(format!(
                        "Missing required parameter(s) for {}: {}",
                        operation.name,
                        missing.join(", ")
                    ));
                }
            }
        }

        let Some(handler) = self.handlers.get(operation.group) else {
            error!("No handler registered for group {}", operation.group);
            return ToolCallResult::failure(format!(
                "Error in {} operation: no handler available",
                operation.group
            ));
        };

        match self
            .execute_with_protection(handler, operation.name, arguments.clone())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Operation {} failed: {}", operation.name, e);
                ToolCallResult::failure(format!("Error in {} operation: {}", operation.group, e))
            }
        }
    }

    async fn execute_with_protection(
        &self,
        handler: Arc<dyn CapabilityHandler>,
        operation: &'static str,
        arguments: Arguments,
    ) -> Result<ToolCallResult, HandlerError> {
        let timeout_ms = self.timeout_ms;

        // Spawned so a panicking handler cannot take the caller down.
        let handle = tokio::spawn(async move { handler.execute(operation, &arguments).await });
        let abort = handle.abort_handle();

        match timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Handler for {} panicked", operation);
                    Err(HandlerError::Panicked)
                } else {
                    error!("Handler for {} cancelled", operation);
                    Err(HandlerError::Cancelled)
                }
            }
            Err(_) => {
                abort.abort();
                warn!("Operation {} timed out after {}ms", operation, timeout_ms);
                Err(HandlerError::Timeout(timeout_ms))
            }
        }
    }

    fn log_audit_isolated(
        &self,
        session_id: &str,
        operation: &Operation,
        arguments: &Arguments,
        result: &ToolCallResult,
    ) {
        let entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "session": session_id,
            "operation": operation.name,
            "group": operation.group,
            "arguments": arguments,
            "ok": result.ok,
            "message": result.message,
        });

        // Fire and forget
        let audit = self.audit.clone();
        tokio::spawn(async move {
            audit.log(entry).await;
        });
    }
}
