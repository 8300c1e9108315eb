//! # Operator Errors
//!
//! Error types shared by the scheduler, the workflow engine and the configuration layer.
//!
//! Errors fall into four categories (see [`ErrorCategory`]):
//!
//! - **Transient**: a reconciler or dependent resource failed; retried with backoff.
//! - **Conflict**: the external system rejected a write on a stale version; retried
//!   without backoff.
//! - **Configuration**: an invalid workflow graph or policy; fatal at registration.
//! - **Node-local**: failures captured per workflow node and aggregated.

use crate::resource::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperatorError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),
    #[error("Reconciliation error: {0}")]
    Reconcile(String),
    #[error("Version conflict on {resource}: {reason}")]
    Conflict { resource: ResourceId, reason: String },
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },
    #[error("Dependent resource '{node}' failed: {reason}")]
    DependentResource { node: String, reason: String },
    #[error("Workflow failed in {} node(s): {}", .errors.len(), summarize_node_errors(.errors))]
    AggregatedWorkflow {
        errors: BTreeMap<String, OperatorError>,
    },
    #[error("Resource client error: {0}")]
    Client(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How the scheduler treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transient,
    Conflict,
    Configuration,
    NodeLocal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Conflict => write!(f, "conflict"),
            Self::Configuration => write!(f, "configuration"),
            Self::NodeLocal => write!(f, "node_local"),
        }
    }
}

impl OperatorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_workflow(message: impl Into<String>) -> Self {
        Self::InvalidWorkflow(message.into())
    }

    pub fn reconcile(message: impl Into<String>) -> Self {
        Self::Reconcile(message.into())
    }

    pub fn conflict(resource: &ResourceId, reason: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.clone(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn dependent(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DependentResource {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::Client(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn classify(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidWorkflow(_) => ErrorCategory::Configuration,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::DependentResource { .. } | Self::AggregatedWorkflow { .. } => {
                ErrorCategory::NodeLocal
            }
            _ => ErrorCategory::Transient,
        }
    }

    /// Conflicts are retried immediately instead of waiting out the backoff interval.
    pub fn is_conflict(&self) -> bool {
        matches!(self.classify(), ErrorCategory::Conflict)
    }

    /// Configuration errors are never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.classify(), ErrorCategory::Configuration)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

fn summarize_node_errors(errors: &BTreeMap<String, OperatorError>) -> String {
    errors
        .iter()
        .map(|(node, error)| format!("{node}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<anyhow::Error> for OperatorError {
    fn from(error: anyhow::Error) -> Self {
        OperatorError::Reconcile(format!("{error:#}"))
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(error: serde_json::Error) -> Self {
        OperatorError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(error: serde_yaml::Error) -> Self {
        OperatorError::Configuration(format!("YAML parsing error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
