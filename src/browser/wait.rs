//! Bounded polling with backoff.
//!
//! Rendered pages fill in asynchronously; every "wait for X to appear" in the
//! crate goes through [`poll_until`] instead of ad-hoc sleep loops.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Growth factor applied to the delay after each miss.
const BACKOFF_FACTOR: f64 = 1.5;

/// Upper bound of the delay, as a multiple of the initial interval.
const MAX_INTERVAL_MULTIPLIER: u32 = 4;

/// Calls `probe` until it yields a value or `timeout` elapses.
///
/// The probe runs once immediately. Between misses the delay starts at
/// `interval` and grows by half each round, capped at four intervals and
/// never sleeping past the deadline.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    let max_delay = interval * MAX_INTERVAL_MULTIPLIER;
    let mut delay = interval;

    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }

        sleep(delay.min(deadline - now)).await;
        delay = delay.mul_f64(BACKOFF_FACTOR).min(max_delay);
    }
}

/// Waits until `predicate` holds. Returns false on timeout.
pub async fn wait_until<F, Fut>(timeout: Duration, interval: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let probe = || {
        let check = predicate();
        async move { check.await.then_some(()) }
    };
    poll_until(timeout, interval, probe).await.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let start = Instant::now();
        let value = poll_until(Duration::from_secs(5), Duration::from_millis(100), || async {
            Some(7)
        })
        .await;

        assert_eq!(value, Some(7));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_a_few_polls() {
        let calls = AtomicUsize::new(0);
        let value = poll_until(Duration::from_secs(5), Duration::from_millis(100), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { (n >= 3).then_some(n) }
        })
        .await;

        assert_eq!(value, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_deadline() {
        let start = Instant::now();
        let value: Option<()> =
            poll_until(Duration::from_secs(2), Duration::from_millis(100), || async { None }).await;

        assert!(value.is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_backs_off_and_caps() {
        let stamps = std::sync::Mutex::new(Vec::new());
        let start = Instant::now();
        let _: Option<()> = poll_until(Duration::from_secs(3), Duration::from_millis(100), || {
            stamps.lock().unwrap().push(start.elapsed());
            async { None }
        })
        .await;

        let stamps = stamps.into_inner().unwrap();
        let gaps: Vec<u128> = stamps.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        let near = |gap: u128, ms: u128| gap.abs_diff(ms) <= 1;
        assert!(near(gaps[0], 100));
        assert!(near(gaps[1], 150));
        assert!(near(gaps[2], 225));
        assert!(gaps.iter().all(|g| *g <= 401));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until() {
        let calls = AtomicUsize::new(0);
        let ready = wait_until(Duration::from_secs(1), Duration::from_millis(50), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { n == 2 }
        })
        .await;
        assert!(ready);

        let ready =
            wait_until(Duration::from_millis(200), Duration::from_millis(50), || async { false })
                .await;
        assert!(!ready);
    }
}
