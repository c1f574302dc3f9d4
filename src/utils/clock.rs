//! Wall clock and suspension points.
//!
//! Every wait in the lifecycle goes through [`Clock`], so tests can replay a
//! whole trading day with [`ManualClock`] instead of sleeping for real.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::sync::Mutex;
use std::time::Duration;

/// Source of local time plus the ability to suspend.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by the host's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock; `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward without suspending.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(step) = chrono::Duration::from_std(duration) {
            *now += step;
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Suspend until `predicate` holds for the current time or `timeout` elapses,
/// re-checking every `poll`. Returns whether the predicate was met.
pub async fn wait_until<F>(
    clock: &dyn Clock,
    poll: Duration,
    timeout: Option<Duration>,
    mut predicate: F,
) -> bool
where
    F: FnMut(NaiveDateTime) -> bool + Send,
{
    let deadline = timeout
        .and_then(|t| chrono::Duration::from_std(t).ok())
        .map(|t| clock.now() + t);

    loop {
        let now = clock.now();
        if predicate(now) {
            return true;
        }
        if deadline.is_some_and(|deadline| now >= deadline) {
            return false;
        }
        clock.sleep(poll).await;
    }
}
