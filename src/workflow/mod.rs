//! # Dependent Resource Workflows
//!
//! A [`Workflow`] is a DAG of dependent resources belonging to one primary
//! resource type. Reconciliation visits nodes in dependency order, running
//! independent nodes in parallel; cleanup visits them in reverse.
//!
//! ## Per-node flow
//!
//! ```text
//! reconcile: activation ─▶ reconcile precondition ─▶ create/update ─▶ ready postcondition
//! cleanup:   activation ─▶ delete (if deletable)   ─▶ delete postcondition
//! ```
//!
//! A failed node skips everything downstream of it. Unmet conditions are not
//! failures: an inactive node reads as "no resource" for the rest of the run
//! and its dependents still reconcile.
//!
//! ## Error propagation
//!
//! By default node errors are aggregated into
//! [`OperatorError::AggregatedWorkflow`](crate::error::OperatorError::AggregatedWorkflow)
//! and fail the reconciliation. In silent mode the [`WorkflowResult`] is
//! returned as-is for the caller to inspect.

pub mod context;
pub mod executor;
pub mod graph;
pub mod node;
pub mod result;

pub use context::WorkflowContext;
pub use executor::WorkflowExecutor;
pub use graph::WorkflowGraph;
pub use node::{
    condition, Capabilities, Condition, DependentReconcileResult, DependentResource,
    DependentResourceNode, ReconcileOperation,
};
pub use result::{ConditionType, NodeOutcome, NodeResult, WorkflowResult, WorkflowRunKind};

use crate::constants::defaults;
use crate::error::Result;
use crate::resource::ManagedResource;
use std::sync::Arc;

/// A validated graph plus the settings that govern how it is driven.
#[derive(Debug, Clone)]
pub struct Workflow {
    graph: Arc<WorkflowGraph>,
    executor: WorkflowExecutor,
    silent: bool,
    explicit_invocation: bool,
}

impl Workflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::default()
    }

    /// Reconciles every node; node errors become an aggregated error unless silent.
    pub async fn reconcile(&self, primary: &ManagedResource) -> Result<WorkflowResult> {
        let result = self.executor.reconcile(&self.graph, primary).await;
        self.finish(result)
    }

    /// Cleans up every node in reverse order; errors are handled as in [`reconcile`](Self::reconcile).
    pub async fn cleanup(&self, primary: &ManagedResource) -> Result<WorkflowResult> {
        let result = self.executor.cleanup(&self.graph, primary).await;
        self.finish(result)
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Whether any node needs explicit deletion during cleanup.
    pub fn has_cleaner(&self) -> bool {
        self.graph.has_cleaner()
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn is_explicit_invocation(&self) -> bool {
        self.explicit_invocation
    }

    fn finish(&self, result: WorkflowResult) -> Result<WorkflowResult> {
        if self.silent {
            Ok(result)
        } else {
            result.into_result()
        }
    }
}

#[derive(Debug)]
pub struct WorkflowBuilder {
    nodes: Vec<DependentResourceNode>,
    silent: bool,
    explicit_invocation: bool,
    pool_size: usize,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            silent: false,
            explicit_invocation: false,
            pool_size: defaults::WORKFLOW_POOL_SIZE,
        }
    }
}

impl WorkflowBuilder {
    pub fn add(mut self, node: DependentResourceNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn explicit_invocation(mut self, explicit: bool) -> Self {
        self.explicit_invocation = explicit;
        self
    }

    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Validates the graph; cycles and unknown dependencies are fatal.
    pub fn build(self) -> Result<Workflow> {
        Ok(Workflow {
            graph: Arc::new(WorkflowGraph::build(self.nodes)?),
            executor: WorkflowExecutor::new(self.pool_size),
            silent: self.silent,
            explicit_invocation: self.explicit_invocation,
        })
    }
}
