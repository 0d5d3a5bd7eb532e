use std::time::Duration;

use rand::Rng;
use tracing::error;

use crate::BackoffPolicy;
use crate::Result;

/// Delay sequence for retry loops: doubles from the policy base up to the
/// policy cap. `reset` returns to the base after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    max_retries: usize,
    attempts: usize,
}

impl Backoff {
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self {
            base: policy.base_delay(),
            max: policy.max_delay(),
            current: policy.base_delay(),
            max_retries: policy.max_retries,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once `max_retries` is
    /// exhausted (never, when it is 0).
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_retries > 0 && self.attempts >= self.max_retries {
            return None;
        }
        self.attempts += 1;
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

/// Adds up to 10% random slack to `delay`.
pub fn jitter(delay: Duration) -> Duration {
    let slack = delay.as_millis() as u64 / 10;
    if slack == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=slack))
}

// Helper function to spawn tasks and track their JoinHandles
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<tokio::task::JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}
