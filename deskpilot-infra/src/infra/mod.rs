pub mod audit_adapter;
pub mod audit_logger;
pub mod contracts;
pub mod session_store;
pub mod settings_store;
