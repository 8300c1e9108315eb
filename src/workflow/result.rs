//! Per-node outcomes of a workflow run.

use super::node::ReconcileOperation;
use crate::error::{OperatorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Activation,
    ReconcilePrecondition,
    ReadyPostcondition,
    DeletePostcondition,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activation => write!(f, "activation"),
            Self::ReconcilePrecondition => write!(f, "reconcile_precondition"),
            Self::ReadyPostcondition => write!(f, "ready_postcondition"),
            Self::DeletePostcondition => write!(f, "delete_postcondition"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "condition")]
pub enum NodeOutcome {
    /// Create/update logic ran
    Reconciled,
    /// Cleanup finished for the node
    CleanedUp,
    /// A condition gated the node; not a failure
    ConditionNotMet(ConditionType),
    /// Not executed because an upstream node failed or is still being deleted
    Skipped,
    Errored,
}

impl NodeOutcome {
    /// Whether nodes that depend on this one may reconcile.
    pub(crate) fn unblocks_dependents(&self) -> bool {
        matches!(self, Self::Reconciled | Self::ConditionNotMet(_))
    }

    /// Whether nodes this one depends on may be cleaned up.
    pub(crate) fn unblocks_dependencies(&self) -> bool {
        matches!(
            self,
            Self::CleanedUp | Self::ConditionNotMet(ConditionType::Activation)
        )
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconciled => write!(f, "reconciled"),
            Self::CleanedUp => write!(f, "cleaned_up"),
            Self::ConditionNotMet(condition) => write!(f, "condition_not_met({condition})"),
            Self::Skipped => write!(f, "skipped"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult {
    pub outcome: NodeOutcome,
    pub error: Option<OperatorError>,
    pub operation: Option<ReconcileOperation>,
    /// Ready postcondition, evaluated after a successful reconcile
    pub ready: Option<bool>,
    /// Whether the node's delete logic was invoked
    pub delete_invoked: bool,
}

impl NodeResult {
    pub(crate) fn outcome(outcome: NodeOutcome) -> Self {
        Self {
            outcome,
            error: None,
            operation: None,
            ready: None,
            delete_invoked: false,
        }
    }

    pub(crate) fn errored(error: OperatorError) -> Self {
        Self {
            error: Some(error),
            ..Self::outcome(NodeOutcome::Errored)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunKind {
    Reconcile,
    Cleanup,
}

/// Aggregated outcome of one workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowResult {
    kind: WorkflowRunKind,
    nodes: BTreeMap<String, NodeResult>,
}

impl WorkflowResult {
    pub(crate) fn new(kind: WorkflowRunKind, nodes: BTreeMap<String, NodeResult>) -> Self {
        Self { kind, nodes }
    }

    pub fn kind(&self) -> WorkflowRunKind {
        self.kind
    }

    pub fn node(&self, name: &str) -> Option<&NodeResult> {
        self.nodes.get(name)
    }

    pub fn outcome(&self, name: &str) -> Option<NodeOutcome> {
        self.nodes.get(name).map(|result| result.outcome)
    }

    pub fn nodes(&self) -> &BTreeMap<String, NodeResult> {
        &self.nodes
    }

    pub fn has_errors(&self) -> bool {
        self.nodes.values().any(|result| result.error.is_some())
    }

    pub fn errors(&self) -> BTreeMap<String, OperatorError> {
        self.nodes
            .iter()
            .filter_map(|(name, result)| result.error.clone().map(|error| (name.clone(), error)))
            .collect()
    }

    pub fn errored_nodes(&self) -> Vec<&str> {
        self.names_with(|result| result.outcome == NodeOutcome::Errored)
    }

    pub fn skipped_nodes(&self) -> Vec<&str> {
        self.names_with(|result| result.outcome == NodeOutcome::Skipped)
    }

    pub fn reconciled_nodes(&self) -> Vec<&str> {
        self.names_with(|result| result.outcome == NodeOutcome::Reconciled)
    }

    pub fn condition_not_met_nodes(&self, condition: ConditionType) -> Vec<&str> {
        self.names_with(|result| result.outcome == NodeOutcome::ConditionNotMet(condition))
    }

    pub fn deleted_nodes(&self) -> Vec<&str> {
        self.names_with(|result| result.delete_invoked)
    }

    pub fn not_ready_nodes(&self) -> Vec<&str> {
        self.names_with(|result| result.ready == Some(false))
    }

    /// No errors, no skipped nodes, and every reconciled node is ready.
    pub fn is_ready(&self) -> bool {
        self.kind == WorkflowRunKind::Reconcile
            && !self.has_errors()
            && self.skipped_nodes().is_empty()
            && self.not_ready_nodes().is_empty()
    }

    /// Every node was cleaned up or deactivated.
    pub fn is_cleanup_complete(&self) -> bool {
        self.kind == WorkflowRunKind::Cleanup
            && self
                .nodes
                .values()
                .all(|result| result.outcome.unblocks_dependencies())
    }

    pub fn aggregate_error(&self) -> Option<OperatorError> {
        let errors = self.errors();
        if errors.is_empty() {
            None
        } else {
            Some(OperatorError::AggregatedWorkflow { errors })
        }
    }

    /// Converts node errors into an aggregated error.
    pub fn into_result(self) -> Result<Self> {
        match self.aggregate_error() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    fn names_with(&self, predicate: impl Fn(&NodeResult) -> bool) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, result)| predicate(result))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(kind: WorkflowRunKind, entries: Vec<(&str, NodeResult)>) -> WorkflowResult {
        WorkflowResult::new(
            kind,
            entries
                .into_iter()
                .map(|(name, result)| (name.to_string(), result))
                .collect(),
        )
    }

    #[test]
    fn test_readiness() {
        let mut ready = NodeResult::outcome(NodeOutcome::Reconciled);
        ready.ready = Some(true);
        let mut not_ready = NodeResult::outcome(NodeOutcome::Reconciled);
        not_ready.ready = Some(false);

        let run = result(
            WorkflowRunKind::Reconcile,
            vec![("a", ready.clone()), ("b", not_ready)],
        );
        assert!(!run.is_ready());
        assert_eq!(run.not_ready_nodes(), vec!["b"]);

        let run = result(
            WorkflowRunKind::Reconcile,
            vec![
                ("a", ready),
                ("b", NodeResult::outcome(NodeOutcome::ConditionNotMet(ConditionType::Activation))),
            ],
        );
        assert!(run.is_ready());
    }

    #[test]
    fn test_into_result_aggregates_errors() {
        let run = result(
            WorkflowRunKind::Reconcile,
            vec![
                ("a", NodeResult::outcome(NodeOutcome::Reconciled)),
                ("b", NodeResult::errored(OperatorError::reconcile("boom"))),
                ("c", NodeResult::outcome(NodeOutcome::Skipped)),
            ],
        );
        assert_eq!(run.errored_nodes(), vec!["b"]);
        assert_eq!(run.skipped_nodes(), vec!["c"]);

        match run.into_result() {
            Err(OperatorError::AggregatedWorkflow { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors["b"], OperatorError::reconcile("boom"));
            }
            other => panic!("expected aggregated error, got {other:?}"),
        }
    }

    #[test]
    fn test_cleanup_completion() {
        let pending = result(
            WorkflowRunKind::Cleanup,
            vec![
                ("a", NodeResult::outcome(NodeOutcome::Skipped)),
                (
                    "c",
                    NodeResult::outcome(NodeOutcome::ConditionNotMet(ConditionType::DeletePostcondition)),
                ),
            ],
        );
        assert!(!pending.is_cleanup_complete());

        let done = result(
            WorkflowRunKind::Cleanup,
            vec![("a", NodeResult::outcome(NodeOutcome::CleanedUp))],
        );
        assert!(done.is_cleanup_complete());
        assert!(!done.is_ready());
    }
}
