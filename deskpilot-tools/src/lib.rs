pub mod command_guard;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod params;
pub mod platform;
pub mod registry;
pub mod traits;

pub use dispatcher::{Dispatcher, ValidationPolicy};
pub use error::HandlerError;
pub use handler::{CapabilityHandler, HandlerSet};
pub use platform::{FeatureSet, OsError, PlatformCapability};
pub use registry::{Operation, OperationGroup, OperationRegistry};
pub use traits::AuditLogger;
