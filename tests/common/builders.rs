use operator_core::controller::{ControllerConfiguration, ControllerConfigurationBuilder, SchedulerEvent};
use operator_core::resource::{ManagedResource, ResourceId};
use operator_core::retry::GenericRetry;
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast;

/// Primary resource in the `default` namespace.
pub fn primary(name: &str) -> ManagedResource {
    ManagedResource::new(
        ResourceId::namespaced(name, "default"),
        json!({"replicas": 1, "image": "nginx:1.25"}),
    )
}

/// Controller settings for tests: version ordering, no periodic re-reconciliation,
/// no finalizer and a short linear retry.
pub fn controller_config(name: &str) -> ControllerConfigurationBuilder {
    ControllerConfiguration::builder(name)
        .version_ordering()
        .use_finalizer(false)
        .max_reconciliation_interval(None)
        .retry(GenericRetry::linear(Duration::from_secs(1), 3))
}

/// Next scheduler event; fails the test if none arrives within a minute of
/// (possibly paused) time.
pub async fn next_event(events: &mut broadcast::Receiver<SchedulerEvent>) -> SchedulerEvent {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for scheduler event")
        .expect("scheduler event stream closed")
}

/// Skips events until one matches `predicate`.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<SchedulerEvent>,
    predicate: F,
) -> SchedulerEvent
where
    F: Fn(&SchedulerEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if predicate(&event) {
            return event;
        }
    }
}

/// Asserts nothing is published for `quiet` of (possibly paused) time.
pub async fn assert_no_event(events: &mut broadcast::Receiver<SchedulerEvent>, quiet: Duration) {
    if let Ok(event) = tokio::time::timeout(quiet, events.recv()).await {
        panic!("unexpected scheduler event: {event:?}");
    }
}
