pub mod infra;

pub use infra::audit_logger::{AuditLogger, AuditLoggerError};
pub use infra::contracts::AuditEntry;
pub use infra::session_store::{SessionStore, SessionStoreError};
pub use infra::settings_store::{SettingsStore, SettingsError};
