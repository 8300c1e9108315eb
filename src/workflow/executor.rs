//! Layered traversal of a [`WorkflowGraph`].
//!
//! Reconciliation walks the layers top-down and cleanup walks them bottom-up.
//! Nodes within a layer run as concurrent tokio tasks bounded by the executor's
//! semaphore; each layer boundary is a join point for the current run only.

use super::context::WorkflowContext;
use super::graph::WorkflowGraph;
use super::node::DependentResourceNode;
use super::result::{ConditionType, NodeOutcome, NodeResult, WorkflowResult, WorkflowRunKind};
use crate::error::OperatorError;
use crate::resource::ManagedResource;
use crate::utils::catch_panic;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct WorkflowExecutor {
    permits: Arc<Semaphore>,
    pool_size: usize,
}

impl WorkflowExecutor {
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub async fn reconcile(
        &self,
        graph: &Arc<WorkflowGraph>,
        primary: &ManagedResource,
    ) -> WorkflowResult {
        self.run(graph, primary, WorkflowRunKind::Reconcile).await
    }

    pub async fn cleanup(&self, graph: &Arc<WorkflowGraph>, primary: &ManagedResource) -> WorkflowResult {
        self.run(graph, primary, WorkflowRunKind::Cleanup).await
    }

    async fn run(
        &self,
        graph: &Arc<WorkflowGraph>,
        primary: &ManagedResource,
        kind: WorkflowRunKind,
    ) -> WorkflowResult {
        let primary = Arc::new(primary.clone());
        let context = WorkflowContext::new();
        let mut results: BTreeMap<usize, NodeResult> = BTreeMap::new();

        let mut layers: Vec<&Vec<usize>> = graph.layers().iter().collect();
        if kind == WorkflowRunKind::Cleanup {
            layers.reverse();
        }

        for layer in layers {
            let mut tasks = JoinSet::new();

            for &position in layer {
                let node = graph.node_at(position);
                if let Some(blocker) = first_blocker(graph, position, kind, &results) {
                    debug!(
                        resource = %primary.id,
                        node = node.name(),
                        blocked_by = blocker,
                        run = ?kind,
                        "Skipping dependent resource"
                    );
                    results.insert(position, NodeResult::outcome(NodeOutcome::Skipped));
                    continue;
                }

                let node = Arc::clone(node);
                let primary = Arc::clone(&primary);
                let context = context.clone();
                let permits = Arc::clone(&self.permits);
                tasks.spawn(async move {
                    let result = match permits.acquire_owned().await {
                        Ok(_permit) => match kind {
                            WorkflowRunKind::Reconcile => {
                                reconcile_node(&node, &primary, &context).await
                            }
                            WorkflowRunKind::Cleanup => cleanup_node(&node, &primary, &context).await,
                        },
                        Err(_) => NodeResult::errored(OperatorError::internal(
                            "workflow executor pool closed",
                        )),
                    };
                    (position, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((position, result)) => {
                        log_node_result(&primary, graph.node_at(position), &result);
                        results.insert(position, result);
                    }
                    Err(join_error) => {
                        error!(resource = %primary.id, error = %join_error, "Workflow node task failed");
                    }
                }
            }

            for &position in layer {
                results.entry(position).or_insert_with(|| {
                    NodeResult::errored(OperatorError::internal(format!(
                        "node '{}' terminated unexpectedly",
                        graph.node_at(position).name()
                    )))
                });
            }
        }

        let result = WorkflowResult::new(
            kind,
            results
                .into_iter()
                .map(|(position, result)| (graph.node_at(position).name().to_string(), result))
                .collect(),
        );
        info!(
            resource = %primary.id,
            run = ?kind,
            nodes = graph.len(),
            errored = result.errored_nodes().len(),
            skipped = result.skipped_nodes().len(),
            "Workflow run finished"
        );
        result
    }
}

/// The first neighbor that prevents `position` from running.
///
/// Reconcile waits on dependencies; cleanup waits on dependents.
fn first_blocker<'a>(
    graph: &'a WorkflowGraph,
    position: usize,
    kind: WorkflowRunKind,
    results: &BTreeMap<usize, NodeResult>,
) -> Option<&'a str> {
    let neighbors = match kind {
        WorkflowRunKind::Reconcile => graph.parents_of(position),
        WorkflowRunKind::Cleanup => graph.children_of(position),
    };
    neighbors
        .iter()
        .find(|&&neighbor| match results.get(&neighbor) {
            Some(result) => match kind {
                WorkflowRunKind::Reconcile => !result.outcome.unblocks_dependents(),
                WorkflowRunKind::Cleanup => !result.outcome.unblocks_dependencies(),
            },
            None => true,
        })
        .map(|&neighbor| graph.node_at(neighbor).name())
}

async fn reconcile_node(
    node: &DependentResourceNode,
    primary: &ManagedResource,
    context: &WorkflowContext,
) -> NodeResult {
    if !node.activation_met(primary, context) {
        context.mark_inactive(node.name());
        return NodeResult::outcome(NodeOutcome::ConditionNotMet(ConditionType::Activation));
    }
    if !node.precondition_met(primary, context) {
        return NodeResult::outcome(NodeOutcome::ConditionNotMet(
            ConditionType::ReconcilePrecondition,
        ));
    }

    let operation = format!("dependent resource '{}'", node.name());
    match catch_panic(&operation, node.dependent.reconcile(primary, context)).await {
        Ok(reconciled) => {
            context.record_secondary(node.name(), reconciled.resource);
            let ready = node.ready(primary, context);
            context.record_ready(node.name(), ready);
            NodeResult {
                operation: Some(reconciled.operation),
                ready: Some(ready),
                ..NodeResult::outcome(NodeOutcome::Reconciled)
            }
        }
        Err(error) => NodeResult::errored(error),
    }
}

async fn cleanup_node(
    node: &DependentResourceNode,
    primary: &ManagedResource,
    context: &WorkflowContext,
) -> NodeResult {
    if !node.activation_met(primary, context) {
        context.mark_inactive(node.name());
        return NodeResult::outcome(NodeOutcome::ConditionNotMet(ConditionType::Activation));
    }

    let delete_invoked = node.capabilities().requires_explicit_delete();
    if delete_invoked {
        let operation = format!("deleting dependent resource '{}'", node.name());
        if let Err(error) = catch_panic(&operation, node.dependent.delete(primary, context)).await {
            return NodeResult {
                delete_invoked,
                ..NodeResult::errored(error)
            };
        }
    }

    let outcome = if node.delete_completed(primary, context) {
        NodeOutcome::CleanedUp
    } else {
        NodeOutcome::ConditionNotMet(ConditionType::DeletePostcondition)
    };
    NodeResult {
        delete_invoked,
        ..NodeResult::outcome(outcome)
    }
}

fn log_node_result(primary: &ManagedResource, node: &DependentResourceNode, result: &NodeResult) {
    match &result.error {
        Some(error) => error!(
            resource = %primary.id,
            node = node.name(),
            error = %error,
            "❌ Dependent resource failed"
        ),
        None => debug!(
            resource = %primary.id,
            node = node.name(),
            outcome = %result.outcome,
            operation = ?result.operation,
            ready = ?result.ready,
            "Dependent resource processed"
        ),
    }
}
