//! # Managed Resources
//!
//! Identity and snapshot types for the primary resources driven by the scheduler.
//!
//! A [`ManagedResource`] is an immutable observation: every change produces a new
//! snapshot. The builder-style `with_*` methods therefore consume the snapshot and
//! return its successor rather than mutating in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identity key of a primary resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    name: String,
    namespace: Option<String>,
}

impl ResourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A versioned snapshot of a primary resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedResource {
    pub id: ResourceId,
    /// Uniqueness token; a deleted and recreated resource gets a new one.
    pub uid: Uuid,
    /// Opaque version token assigned by the external system on every write.
    pub resource_version: String,
    /// Incremented by the external system when the desired state changes.
    pub generation: i64,
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub finalizers: BTreeSet<String>,
    pub spec: Value,
    pub status: Option<Value>,
}

impl ManagedResource {
    pub fn new(id: ResourceId, spec: Value) -> Self {
        Self {
            id,
            uid: Uuid::new_v4(),
            resource_version: "1".to_string(),
            generation: 1,
            deletion_timestamp: None,
            finalizers: BTreeSet::new(),
            spec,
            status: None,
        }
    }

    pub fn with_version(mut self, resource_version: impl Into<String>) -> Self {
        self.resource_version = resource_version.into();
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.finalizers.insert(finalizer.into());
        self
    }

    pub fn without_finalizer(mut self, finalizer: &str) -> Self {
        self.finalizers.remove(finalizer);
        self
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn marked_for_deletion(mut self) -> Self {
        self.deletion_timestamp.get_or_insert_with(Utc::now);
        self
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.contains(finalizer)
    }

    /// Orders two snapshots by version token, if both tokens are numeric.
    pub fn compare_version(&self, other: &ManagedResource) -> Option<Ordering> {
        compare_resource_versions(&self.resource_version, &other.resource_version)
    }
}

/// Compares two version tokens numerically.
///
/// Version tokens are opaque in general; ordering is only defined when both parse
/// as unsigned integers. Returns `None` otherwise.
pub fn compare_resource_versions(left: &str, right: &str) -> Option<Ordering> {
    let left = left.trim().parse::<u64>().ok()?;
    let right = right.trim().parse::<u64>().ok()?;
    Some(left.cmp(&right))
}
