//! Eviction predicates deciding whether an observed snapshot supersedes a cached write.
//!
//! Two strategies are provided and neither is the default; controllers choose one
//! explicitly when building their configuration.

use super::CachedPair;
use crate::resource::ManagedResource;
use std::cmp::Ordering;
use std::fmt;

/// Decides whether `observed` is at least as fresh as the cached write.
pub trait EvictionPredicate: Send + Sync + fmt::Debug {
    fn is_at_least_as_fresh(&self, cached: &CachedPair, observed: &ManagedResource) -> bool;

    fn name(&self) -> &'static str;
}

/// Orders version tokens numerically; the observed snapshot wins once its version
/// reaches the version produced by the local write.
///
/// Tokens that cannot be ordered are treated as fresh so an unparseable version
/// never pins a stale cached write.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionOrdering;

impl EvictionPredicate for VersionOrdering {
    fn is_at_least_as_fresh(&self, cached: &CachedPair, observed: &ManagedResource) -> bool {
        match observed.compare_version(&cached.after_update) {
            Some(Ordering::Less) => false,
            Some(_) | None => true,
        }
    }

    fn name(&self) -> &'static str {
        "version_ordering"
    }
}

/// Optimistic-lock comparison: the observed snapshot is stale only while it still
/// carries exactly the version the local write replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimisticLockEquality;

impl EvictionPredicate for OptimisticLockEquality {
    fn is_at_least_as_fresh(&self, cached: &CachedPair, observed: &ManagedResource) -> bool {
        observed.resource_version != cached.before_update.resource_version
    }

    fn name(&self) -> &'static str {
        "optimistic_lock_equality"
    }
}
