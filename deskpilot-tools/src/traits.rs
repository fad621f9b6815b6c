use async_trait::async_trait;
use serde_json::Value;

/// Sink for the audit record written after every dispatch.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, entry: Value);
}
