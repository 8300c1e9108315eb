//! State shared by the nodes of a single workflow run.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct RunState {
    secondary: HashMap<String, Value>,
    ready: HashMap<String, bool>,
    inactive: HashSet<String>,
}

/// Read view of a workflow run handed to dependents and conditions.
///
/// Nodes whose activation condition was not met read as having no resource.
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    state: Arc<RwLock<RunState>>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observed state of the secondary resource managed by `node`.
    pub fn secondary_resource(&self, node: &str) -> Option<Value> {
        let state = self.state.read();
        if state.inactive.contains(node) {
            return None;
        }
        state.secondary.get(node).cloned()
    }

    /// Ready postcondition of `node`, once it has been reconciled in this run.
    pub fn is_ready(&self, node: &str) -> Option<bool> {
        self.state.read().ready.get(node).copied()
    }

    pub fn is_active(&self, node: &str) -> bool {
        !self.state.read().inactive.contains(node)
    }

    pub(crate) fn record_secondary(&self, node: &str, resource: Option<Value>) {
        let mut state = self.state.write();
        match resource {
            Some(resource) => {
                state.secondary.insert(node.to_string(), resource);
            }
            None => {
                state.secondary.remove(node);
            }
        }
    }

    pub(crate) fn record_ready(&self, node: &str, ready: bool) {
        self.state.write().ready.insert(node.to_string(), ready);
    }

    pub(crate) fn mark_inactive(&self, node: &str) {
        let mut state = self.state.write();
        state.secondary.remove(node);
        state.inactive.insert(node.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inactive_nodes_read_as_absent() {
        let context = WorkflowContext::new();
        context.record_secondary("config", Some(json!({"data": 1})));
        assert_eq!(context.secondary_resource("config"), Some(json!({"data": 1})));

        context.mark_inactive("config");
        assert_eq!(context.secondary_resource("config"), None);
        assert!(!context.is_active("config"));
    }

    #[test]
    fn test_ready_tracking() {
        let context = WorkflowContext::new();
        assert_eq!(context.is_ready("deployment"), None);
        context.record_ready("deployment", false);
        assert_eq!(context.is_ready("deployment"), Some(false));
    }
}
