//! Bounded-retry combinator.
//!
//! Every wait in the harness has the same shape: attempt, sleep a fixed
//! interval, stop at a wall-clock deadline. Channels reuse this one loop
//! for console opens and per-command sends rather than hand-rolling it.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

/// Run `attempt` until it yields a value or the budget is spent.
///
/// The first attempt runs immediately. After a failed attempt the loop
/// sleeps `interval`, unless that sleep would overrun `budget`, in which
/// case `None` is returned. When every attempt fails instantly the total
/// wall-clock spent lands in `[budget - interval, budget]`. A timeout does
/// not interrupt an in-flight attempt; it only stops further retries.
pub async fn until<T, F, Fut>(what: &str, interval: Duration, budget: Duration, mut attempt: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = Instant::now();
    let mut tries = 0u32;
    loop {
        tries += 1;
        if let Some(value) = attempt().await {
            return Some(value);
        }
        if started.elapsed() + interval > budget {
            debug!("{what}: giving up after {tries} attempts");
            return None;
        }
        debug!("{what}: attempt {tries} not ready, retrying in {interval:?}");
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    }

    const fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn returns_the_first_success() {
        init_test_logging();
        let attempts = Cell::new(0u32);
        let started = Instant::now();
        let value = until("test", secs(1), secs(30), || {
            attempts.set(attempts.get() + 1);
            let ready = attempts.get() == 3;
            async move { ready.then_some(42) }
        })
        .await;
        assert_eq!(value, Some(42));
        assert_eq!(attempts.get(), 3);
        assert_eq!(started.elapsed(), secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_budget() {
        init_test_logging();
        let started = Instant::now();
        let value: Option<()> = until("test", secs(1), secs(10), || async { None }).await;
        assert!(value.is_none());
        let elapsed = started.elapsed();
        assert!(elapsed >= secs(9), "gave up too early: {elapsed:?}");
        assert!(elapsed <= secs(10), "overran the budget: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn always_attempts_at_least_once() {
        let attempts = Cell::new(0u32);
        let value: Option<()> = until("test", secs(5), secs(1), || {
            attempts.set(attempts.get() + 1);
            async { None }
        })
        .await;
        assert!(value.is_none());
        assert_eq!(attempts.get(), 1);
    }
}
