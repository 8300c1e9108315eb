//! # Resource Client
//!
//! The boundary to the external system that stores primary resources. The
//! dispatcher uses it to add and remove finalizers and to apply the writes a
//! reconciler requests; dependent resources usually carry their own clients.

use crate::error::{OperatorError, Result};
use crate::resource::{ManagedResource, ResourceId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Writes to primary resources.
///
/// Implementations return the snapshot produced by the write, carrying the new
/// version token, and fail with [`OperatorError::Conflict`] when the written
/// snapshot's version is stale.
#[async_trait]
pub trait ResourceClient: Send + Sync + 'static {
    /// Replaces metadata and spec.
    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource>;

    /// Replaces the status only.
    async fn patch_status(&self, resource: &ManagedResource) -> Result<ManagedResource>;

    async fn add_finalizer(
        &self,
        resource: &ManagedResource,
        finalizer: &str,
    ) -> Result<ManagedResource> {
        self.update(&resource.clone().with_finalizer(finalizer)).await
    }

    async fn remove_finalizer(
        &self,
        resource: &ManagedResource,
        finalizer: &str,
    ) -> Result<ManagedResource> {
        self.update(&resource.clone().without_finalizer(finalizer))
            .await
    }
}

/// Map-backed client with optimistic locking on numeric version tokens.
#[derive(Debug, Default, Clone)]
pub struct InMemoryResourceClient {
    resources: Arc<DashMap<ResourceId, ManagedResource>>,
    version_counter: Arc<AtomicU64>,
}

impl InMemoryResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `resource` as-is, as if created externally.
    pub fn insert(&self, resource: ManagedResource) {
        if let Ok(version) = resource.resource_version.parse::<u64>() {
            self.version_counter.fetch_max(version, Ordering::SeqCst);
        }
        self.resources.insert(resource.id.clone(), resource);
    }

    pub fn get(&self, id: &ResourceId) -> Option<ManagedResource> {
        self.resources.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &ResourceId) -> Option<ManagedResource> {
        self.resources.remove(id).map(|(_, resource)| resource)
    }

    fn write(
        &self,
        resource: &ManagedResource,
        apply: impl FnOnce(&ManagedResource, &ManagedResource) -> ManagedResource,
    ) -> Result<ManagedResource> {
        let mut entry = self
            .resources
            .get_mut(&resource.id)
            .ok_or_else(|| OperatorError::client(format!("resource {} not found", resource.id)))?;

        let stored = entry.value();
        if stored.uid != resource.uid || stored.resource_version != resource.resource_version {
            return Err(OperatorError::conflict(
                &resource.id,
                format!(
                    "stored version {} does not match written version {}",
                    stored.resource_version, resource.resource_version
                ),
            ));
        }

        let mut written = apply(stored, resource);
        let version = self.version_counter.fetch_add(1, Ordering::SeqCst) + 1;
        written.resource_version = version.to_string();
        *entry.value_mut() = written.clone();
        Ok(written)
    }
}

#[async_trait]
impl ResourceClient for InMemoryResourceClient {
    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        self.write(resource, |stored, requested| {
            let mut written = requested.clone();
            written.status = stored.status.clone();
            if requested.spec != stored.spec {
                written.generation = stored.generation + 1;
            }
            written
        })
    }

    async fn patch_status(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        self.write(resource, |stored, requested| {
            let mut written = stored.clone();
            written.status = requested.status.clone();
            written
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(client: &InMemoryResourceClient) -> ManagedResource {
        let resource = ManagedResource::new(ResourceId::new("web"), json!({"replicas": 1}));
        client.insert(resource.clone());
        resource
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_generation() {
        let client = InMemoryResourceClient::new();
        let original = stored(&client);

        let updated = client
            .update(&original.clone().with_spec(json!({"replicas": 2})))
            .await
            .unwrap();
        assert_eq!(updated.resource_version, "2");
        assert_eq!(updated.generation, 2);

        let patched = client
            .patch_status(&updated.clone().with_status(json!({"ready": true})))
            .await
            .unwrap();
        assert_eq!(patched.generation, 2);
        assert_eq!(patched.status, Some(json!({"ready": true})));
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let client = InMemoryResourceClient::new();
        let original = stored(&client);
        client.add_finalizer(&original, "test/finalizer").await.unwrap();

        let error = client
            .add_finalizer(&original, "test/finalizer")
            .await
            .unwrap_err();
        assert!(error.is_conflict());
    }

    #[tokio::test]
    async fn test_finalizer_round_trip() {
        let client = InMemoryResourceClient::new();
        let original = stored(&client);

        let with = client.add_finalizer(&original, "test/finalizer").await.unwrap();
        assert!(with.has_finalizer("test/finalizer"));
        assert_eq!(with.generation, original.generation);

        let without = client.remove_finalizer(&with, "test/finalizer").await.unwrap();
        assert!(!without.has_finalizer("test/finalizer"));
        assert_eq!(client.get(&original.id), Some(without));
    }
}
