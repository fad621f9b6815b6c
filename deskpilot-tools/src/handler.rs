use crate::error::HandlerError;
use crate::registry::OperationGroup;
use async_trait::async_trait;
use deskpilot_core::{Arguments, ToolCallResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Executes every operation of one group.
///
/// A returned `Err` is a handler failure; the dispatcher reports it as
/// `"Error in <group> operation: <detail>"`. Expected negative outcomes
/// (unsupported feature, process not running) are `Ok` with `ok: false`.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    fn group(&self) -> OperationGroup;

    async fn execute(
        &self,
        operation: &str,
        params: &Arguments,
    ) -> Result<ToolCallResult, HandlerError>;
}

/// Handlers injected into a dispatcher, keyed by group.
#[derive(Default, Clone)]
pub struct HandlerSet {
    handlers: HashMap<OperationGroup, Arc<dyn CapabilityHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler, replacing any previous handler of the same group.
    pub fn with(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.insert(handler);
        self
    }

    pub fn insert(&mut self, handler: Arc<dyn CapabilityHandler>) -> &mut Self {
        self.handlers.insert(handler.group(), handler);
        self
    }

    pub fn get(&self, group: OperationGroup) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(&group).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
