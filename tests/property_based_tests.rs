mod common;

use async_trait::async_trait;
use common::strategies::*;
use operator_core::error::Result;
use operator_core::rate_limiter::LinearRateLimiter;
use operator_core::resource::ManagedResource;
use operator_core::retry::GenericRetry;
use operator_core::workflow::{
    DependentReconcileResult, DependentResource, DependentResourceNode, WorkflowContext,
    WorkflowGraph,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

struct Inert;

#[async_trait]
impl DependentResource for Inert {
    async fn reconcile(
        &self,
        _primary: &ManagedResource,
        _context: &WorkflowContext,
    ) -> Result<DependentReconcileResult> {
        Ok(DependentReconcileResult::unchanged(None))
    }
}

fn build_graph(parents: &[Vec<usize>]) -> WorkflowGraph {
    let nodes = parents
        .iter()
        .enumerate()
        .map(|(index, deps)| {
            DependentResourceNode::new(node_name(index), Inert)
                .depends_on(deps.iter().map(|&dep| node_name(dep)))
        })
        .collect();
    WorkflowGraph::build(nodes).unwrap()
}

proptest! {
    /// Property: backoff delays never shrink and never exceed the cap
    #[test]
    fn backoff_is_monotonic_and_capped((initial, multiplier, max, attempts) in backoff_strategy()) {
        let policy = GenericRetry::default()
            .with_initial_interval(Duration::from_millis(initial))
            .with_multiplier(multiplier)
            .with_max_interval(Some(Duration::from_millis(max)))
            .with_max_attempts(attempts);
        let mut execution = policy.init_execution_after_first_attempt();

        let mut previous = Duration::ZERO;
        let mut delays = 0;
        while let Some(delay) = execution.next_delay() {
            prop_assert!(delay >= previous, "{:?} < {:?}", delay, previous);
            prop_assert!(delay <= Duration::from_millis(max));
            previous = delay;
            delays += 1;
        }
        // The first attempt already ran, so attempts - 1 retries remain
        prop_assert_eq!(delays, attempts - 1);
    }

    /// Property: every node lands in a later layer than all of its dependencies
    #[test]
    fn layering_respects_dependencies(parents in dag_strategy()) {
        let graph = build_graph(&parents);
        let layer_of: HashMap<String, usize> = graph
            .layer_names()
            .into_iter()
            .enumerate()
            .flat_map(|(layer, names)| names.into_iter().map(move |name| (name.to_string(), layer)))
            .collect();

        prop_assert_eq!(layer_of.len(), parents.len());
        for (index, deps) in parents.iter().enumerate() {
            for &dep in deps {
                prop_assert!(layer_of[&node_name(index)] > layer_of[&node_name(dep)]);
            }
        }
    }

    /// Property: top-level nodes are exactly the nodes without dependencies
    #[test]
    fn top_level_nodes_have_no_dependencies(parents in dag_strategy()) {
        let graph = build_graph(&parents);
        let mut expected: Vec<String> = parents
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(index, _)| node_name(index))
            .collect();
        let mut actual: Vec<String> = graph.top_level_nodes().into_iter().map(str::to_string).collect();
        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }

    /// Property: a window admits exactly `permits` executions
    #[test]
    fn rate_limiter_admits_exactly_the_permits((period, permits) in rate_limit_strategy()) {
        let limiter = LinearRateLimiter::new(period, permits);
        let mut state = limiter.init_state();
        let now = state.window_start();

        for _ in 0..permits {
            prop_assert!(limiter.is_limited_at(&mut state, now).is_none());
        }
        let delay = limiter.is_limited_at(&mut state, now);
        prop_assert_eq!(delay, Some(period));
        prop_assert!(limiter.is_limited_at(&mut state, now + period).is_none());
    }
}
