use proptest::prelude::*;
use std::time::Duration;

/// Exponential backoff parameters: (initial ms, multiplier, max interval ms, max attempts).
pub fn backoff_strategy() -> impl Strategy<Value = (u64, f64, u64, i32)> {
    (1u64..5_000, 1.0f64..4.0, 0u64..60_000, 1i32..20).prop_map(
        |(initial, multiplier, extra, attempts)| (initial, multiplier, initial + extra, attempts),
    )
}

/// Acyclic dependency lists: node `i` may only depend on nodes `< i`.
pub fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|size| {
        (0..size)
            .map(|index| {
                if index == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::collection::btree_set(0..index, 0..=index.min(3))
                        .prop_map(|parents| parents.into_iter().collect())
                        .boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

pub fn node_name(index: usize) -> String {
    format!("node-{index}")
}

/// Rate-limit windows: (period, permits).
pub fn rate_limit_strategy() -> impl Strategy<Value = (Duration, u32)> {
    (1u64..10_000, 1u32..20).prop_map(|(period, permits)| (Duration::from_millis(period), permits))
}
