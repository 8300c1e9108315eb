//! Delayed re-submission of resources.
//!
//! At most one timer is armed per resource; arming replaces the previous one.
//! A fired timer sends `(id, token)` to the scheduler, which forgets the timer
//! only when the token still matches, so a timer re-armed in between survives.

use crate::resource::ResourceId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::trace;

pub(crate) type TimerFired = (ResourceId, u64);

#[derive(Debug)]
pub(crate) struct TimerScheduler {
    timers: DashMap<ResourceId, (u64, AbortHandle)>,
    next_token: AtomicU64,
    sender: mpsc::UnboundedSender<TimerFired>,
}

impl TimerScheduler {
    pub fn new(sender: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            timers: DashMap::new(),
            next_token: AtomicU64::new(0),
            sender,
        }
    }

    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, id: &ResourceId, delay: Duration) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let sender = self.sender.clone();
        let fired = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the scheduler stopped
            let _ = sender.send((fired, token));
        })
        .abort_handle();

        trace!(resource = %id, delay_ms = delay.as_millis() as u64, "Timer armed");
        if let Some((_, previous)) = self.timers.insert(id.clone(), (token, handle)) {
            previous.abort();
        }
    }

    pub fn cancel(&self, id: &ResourceId) -> bool {
        match self.timers.remove(id) {
            Some((_, (_, handle))) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forgets a fired timer. Returns false when it was cancelled or replaced.
    pub fn fired(&self, id: &ResourceId, token: u64) -> bool {
        self.timers
            .remove_if(id, |_, (current, _)| *current == token)
            .is_some()
    }

    pub fn cancel_all(&self) {
        self.timers.iter().for_each(|entry| entry.value().1.abort());
        self.timers.clear();
    }

    pub fn is_scheduled(&self, id: &ResourceId) -> bool {
        self.timers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }
}
