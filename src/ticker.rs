//! Monotonic tick source driving the Scheduler Loop. Abstracted as a
//! trait so the loop itself can be tested against a synthetic ticker
//! without waiting on wall-clock time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Interval};

/// Emits a tick carrying the wall-clock instant it fired at.
#[async_trait]
pub trait Ticker: Send + Sync {
    /// Wait for and return the next tick.
    async fn tick(&self) -> DateTime<Utc>;

    /// Stop emitting ticks. Subsequent `tick()` calls never resolve.
    fn stop(&self);
}

/// `Ticker` backed by a `tokio::time::interval(Duration::from_millis(tick_ms))`
/// loop.
pub struct IntervalTicker {
    interval: Mutex<Interval>,
    stopped: std::sync::atomic::AtomicBool,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        IntervalTicker {
            interval: Mutex::new(interval(period)),
            stopped: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&self) -> DateTime<Utc> {
        if self.stopped.load(std::sync::atomic::Ordering::Relaxed) {
            std::future::pending::<()>().await;
        }
        self.interval.lock().await.tick().await;
        Utc::now()
    }

    fn stop(&self) {
        self.stopped.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn interval_ticker_fires() {
        let t = IntervalTicker::new(Duration::from_millis(5));
        let before = Utc::now();
        let at = t.tick().await;
        assert!(at >= before);
    }

    #[tokio::test]
    async fn stop_suspends_further_ticks() {
        let t = IntervalTicker::new(Duration::from_millis(5));
        t.tick().await;
        t.stop();
        let result = tokio::time::timeout(Duration::from_millis(50), t.tick()).await;
        assert!(result.is_err(), "ticker should not fire after stop()");
    }
}
