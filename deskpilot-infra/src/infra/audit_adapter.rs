use crate::infra::audit_logger::AuditLogger;
use crate::infra::contracts::AuditEntry;
use async_trait::async_trait;
use deskpilot_tools::AuditLogger as AuditLoggerTrait;
use tracing::warn;

#[async_trait]
impl AuditLoggerTrait for AuditLogger {
    async fn log(&self, entry: serde_json::Value) {
        let audit_entry = AuditEntry::from_value(&entry);
        if let Err(e) = self.append(&audit_entry) {
            warn!("Failed to write audit entry: {}", e);
        }
    }
}
