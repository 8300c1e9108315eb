//! Small helpers shared by the scheduler and the workflow executor.

use crate::error::{OperatorError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Runs `future`, turning a panic into an [`OperatorError::Reconcile`].
pub async fn catch_panic<T, F>(operation: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(OperatorError::reconcile(format!(
            "{operation} panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catch_panic_converts_payload() {
        let explode = true;
        let result: Result<()> = catch_panic("reconcile", async move {
            if explode {
                panic!("exploded");
            }
            Ok(())
        })
        .await;
        assert_eq!(
            result.unwrap_err(),
            OperatorError::Reconcile("reconcile panicked: exploded".to_string())
        );
    }

    #[tokio::test]
    async fn test_catch_panic_passes_results_through() {
        let value = catch_panic("reconcile", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
