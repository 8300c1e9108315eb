//! Dependent resources, their capabilities and the conditions gating them.

use super::context::WorkflowContext;
use crate::error::Result;
use crate::resource::ManagedResource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Operations a dependent resource supports, checked once when the graph is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub creatable: bool,
    pub updatable: bool,
    pub deletable: bool,
    /// Removed by the external system together with the primary resource
    pub garbage_collected: bool,
}

impl Capabilities {
    /// Create, update and explicit delete.
    pub const fn full() -> Self {
        Self {
            creatable: true,
            updatable: true,
            deletable: true,
            garbage_collected: false,
        }
    }

    /// Create and update; deletion left to the external garbage collector.
    pub const fn garbage_collected() -> Self {
        Self {
            creatable: true,
            updatable: true,
            deletable: false,
            garbage_collected: true,
        }
    }

    /// Observed only.
    pub const fn read_only() -> Self {
        Self {
            creatable: false,
            updatable: false,
            deletable: false,
            garbage_collected: false,
        }
    }

    /// Whether cleanup must call the dependent's delete logic.
    pub fn requires_explicit_delete(&self) -> bool {
        self.deletable && !self.garbage_collected
    }

    pub fn is_read_only(&self) -> bool {
        !self.creatable && !self.updatable && !self.deletable
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// What a dependent resource did during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOperation {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for ReconcileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependentReconcileResult {
    pub operation: ReconcileOperation,
    /// Observed state of the secondary resource, visible to downstream nodes
    pub resource: Option<Value>,
}

impl DependentReconcileResult {
    pub fn new(operation: ReconcileOperation, resource: Option<Value>) -> Self {
        Self {
            operation,
            resource,
        }
    }

    pub fn unchanged(resource: Option<Value>) -> Self {
        Self::new(ReconcileOperation::Unchanged, resource)
    }
}

/// A secondary resource derived from the primary resource's desired state.
#[async_trait]
pub trait DependentResource: Send + Sync {
    fn capabilities(&self) -> Capabilities {
        Capabilities::full()
    }

    /// Brings the secondary resource to its desired state.
    async fn reconcile(
        &self,
        primary: &ManagedResource,
        context: &WorkflowContext,
    ) -> Result<DependentReconcileResult>;

    /// Deletes the secondary resource. Only called when
    /// [`Capabilities::requires_explicit_delete`] holds.
    async fn delete(&self, _primary: &ManagedResource, _context: &WorkflowContext) -> Result<()> {
        Ok(())
    }
}

/// A predicate over the primary resource and the state of the current run.
pub trait Condition: Send + Sync {
    fn is_met(&self, primary: &ManagedResource, context: &WorkflowContext) -> bool;
}

impl<F> Condition for F
where
    F: Fn(&ManagedResource, &WorkflowContext) -> bool + Send + Sync,
{
    fn is_met(&self, primary: &ManagedResource, context: &WorkflowContext) -> bool {
        self(primary, context)
    }
}

/// One vertex of the workflow graph.
#[derive(Clone)]
pub struct DependentResourceNode {
    pub(crate) name: String,
    pub(crate) dependent: Arc<dyn DependentResource>,
    pub(crate) depends_on: Vec<String>,
    pub(crate) activation_condition: Option<Arc<dyn Condition>>,
    pub(crate) reconcile_precondition: Option<Arc<dyn Condition>>,
    pub(crate) ready_postcondition: Option<Arc<dyn Condition>>,
    pub(crate) delete_postcondition: Option<Arc<dyn Condition>>,
}

impl DependentResourceNode {
    pub fn new(name: impl Into<String>, dependent: impl DependentResource + 'static) -> Self {
        Self::from_arc(name, Arc::new(dependent))
    }

    pub fn from_arc(name: impl Into<String>, dependent: Arc<dyn DependentResource>) -> Self {
        Self {
            name: name.into(),
            dependent,
            depends_on: Vec::new(),
            activation_condition: None,
            reconcile_precondition: None,
            ready_postcondition: None,
            delete_postcondition: None,
        }
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_activation_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.activation_condition = Some(Arc::new(condition));
        self
    }

    pub fn with_reconcile_precondition(mut self, condition: impl Condition + 'static) -> Self {
        self.reconcile_precondition = Some(Arc::new(condition));
        self
    }

    pub fn with_ready_postcondition(mut self, condition: impl Condition + 'static) -> Self {
        self.ready_postcondition = Some(Arc::new(condition));
        self
    }

    pub fn with_delete_postcondition(mut self, condition: impl Condition + 'static) -> Self {
        self.delete_postcondition = Some(Arc::new(condition));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn capabilities(&self) -> Capabilities {
        self.dependent.capabilities()
    }

    pub fn has_delete_postcondition(&self) -> bool {
        self.delete_postcondition.is_some()
    }

    pub(crate) fn activation_met(&self, primary: &ManagedResource, context: &WorkflowContext) -> bool {
        check(&self.activation_condition, primary, context)
    }

    pub(crate) fn precondition_met(&self, primary: &ManagedResource, context: &WorkflowContext) -> bool {
        check(&self.reconcile_precondition, primary, context)
    }

    pub(crate) fn ready(&self, primary: &ManagedResource, context: &WorkflowContext) -> bool {
        check(&self.ready_postcondition, primary, context)
    }

    pub(crate) fn delete_completed(&self, primary: &ManagedResource, context: &WorkflowContext) -> bool {
        check(&self.delete_postcondition, primary, context)
    }
}

/// Absent conditions are met.
fn check(
    condition: &Option<Arc<dyn Condition>>,
    primary: &ManagedResource,
    context: &WorkflowContext,
) -> bool {
    condition
        .as_ref()
        .map(|condition| condition.is_met(primary, context))
        .unwrap_or(true)
}

impl fmt::Debug for DependentResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentResourceNode")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("capabilities", &self.capabilities())
            .field("activation_condition", &self.activation_condition.is_some())
            .field("reconcile_precondition", &self.reconcile_precondition.is_some())
            .field("ready_postcondition", &self.ready_postcondition.is_some())
            .field("delete_postcondition", &self.delete_postcondition.is_some())
            .finish()
    }
}

/// Pins a closure to the [`Condition`] signature so its argument types are inferred.
pub fn condition<F>(predicate: F) -> F
where
    F: Fn(&ManagedResource, &WorkflowContext) -> bool + Send + Sync + 'static,
{
    predicate
}
