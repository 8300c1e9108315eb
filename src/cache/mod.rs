//! # Resource Freshness Cache
//!
//! After the scheduler writes a primary resource, the change-notification source
//! may still deliver the pre-write snapshot for a while. The cache remembers the
//! `(before, after)` pair of each local write and substitutes the written snapshot
//! for stale observations until an observation catches up.
//!
//! Whether an observation has caught up is decided by a pluggable
//! [`EvictionPredicate`].

pub mod eviction;

pub use eviction::{EvictionPredicate, OptimisticLockEquality, VersionOrdering};

use crate::resource::{ManagedResource, ResourceId};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Snapshots on both sides of a local write.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPair {
    pub before_update: ManagedResource,
    pub after_update: ManagedResource,
}

#[derive(Debug, Clone)]
pub struct ResourceFreshnessCache {
    entries: Arc<DashMap<ResourceId, CachedPair>>,
    predicate: Arc<dyn EvictionPredicate>,
}

impl ResourceFreshnessCache {
    pub fn new(predicate: Arc<dyn EvictionPredicate>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            predicate,
        }
    }

    pub fn with_version_ordering() -> Self {
        Self::new(Arc::new(VersionOrdering))
    }

    pub fn with_optimistic_lock_equality() -> Self {
        Self::new(Arc::new(OptimisticLockEquality))
    }

    pub fn predicate_name(&self) -> &'static str {
        self.predicate.name()
    }

    /// Records a local write, keyed by the identity of `before`.
    pub fn cache_resource(&self, before: ManagedResource, after: ManagedResource) {
        debug!(
            resource = %before.id,
            before_version = %before.resource_version,
            after_version = %after.resource_version,
            "Caching locally written resource"
        );
        self.entries.insert(
            before.id.clone(),
            CachedPair {
                before_update: before,
                after_update: after,
            },
        );
    }

    /// Returns the freshest known snapshot for `observed`.
    pub fn get_fresh_resource(&self, observed: &ManagedResource) -> ManagedResource {
        let cached = match self.entries.get(&observed.id) {
            Some(entry) => entry.value().clone(),
            None => return observed.clone(),
        };

        if cached.after_update.uid != observed.uid {
            debug!(resource = %observed.id, "Evicting cached write for a recreated resource");
            self.entries.remove(&observed.id);
            return observed.clone();
        }

        if self.predicate.is_at_least_as_fresh(&cached, observed) {
            debug!(
                resource = %observed.id,
                observed_version = %observed.resource_version,
                predicate = self.predicate.name(),
                "Observed resource caught up with cached write, evicting"
            );
            self.entries
                .remove_if(&observed.id, |_, current| current == &cached);
            return observed.clone();
        }

        debug!(
            resource = %observed.id,
            observed_version = %observed.resource_version,
            cached_version = %cached.after_update.resource_version,
            "Using cached write over stale observation"
        );
        cached.after_update
    }

    pub fn evict(&self, id: &ResourceId) {
        self.entries.remove(id);
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
