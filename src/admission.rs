//! Fixed-window admission control.
//!
//! All queries share one window. A query arriving within a second of the
//! window start increments the counter; once the counter exceeds the limit the
//! query is held until the window ends and is then dropped. A query arriving
//! after the window has ended opens a new window with the counter at zero, so
//! a limit of `n` lets `n + 1` queries through per window.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Length of one admission window.
pub const WINDOW: Duration = Duration::from_secs(1);

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    /// Over the limit. The caller has already been held until the window ended.
    Drop,
}

impl Admission {
    pub fn is_dropped(self) -> bool {
        self == Admission::Drop
    }
}

struct RateWindow {
    started_at: Option<Instant>,
    count: u32,
}

/// Process-wide request limiter.
///
/// The window state sits behind a single mutex so concurrent checks are
/// serialized. The lock is never held while a caller is being stalled.
pub struct AdmissionController {
    limit: u32,
    window: Mutex<RateWindow>,
}

impl AdmissionController {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: Mutex::new(RateWindow {
                started_at: None,
                count: 0,
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Check one incoming query against the current window.
    ///
    /// Over-limit queries sleep for the rest of the window before
    /// [`Admission::Drop`] is returned. Only the calling task is suspended.
    pub async fn admit(&self) -> Admission {
        let (admission, stall) = self.check_at(Instant::now());

        if let Some(stall) = stall {
            debug!(
                limit = self.limit,
                stall_ms = stall.as_millis() as u64,
                "Rate limit exceeded, stalling query"
            );
            tokio::time::sleep(stall).await;
        }

        admission
    }

    fn check_at(&self, now: Instant) -> (Admission, Option<Duration>) {
        let mut window = match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut stall = None;
        match window.started_at {
            Some(start) if now.duration_since(start) < WINDOW => {
                window.count = window.count.saturating_add(1);
                if window.count > self.limit {
                    stall = Some(WINDOW - now.duration_since(start));
                }
            }
            _ => {
                window.started_at = Some(now);
                window.count = 0;
            }
        }

        let admission = if window.count > self.limit {
            Admission::Drop
        } else {
            Admission::Proceed
        };
        (admission, stall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limit_counts_from_zero_in_each_window() {
        let limiter = AdmissionController::new(2);

        assert_eq!(limiter.admit().await, Admission::Proceed);
        assert_eq!(limiter.admit().await, Admission::Proceed);
        assert_eq!(limiter.admit().await, Admission::Proceed);
        assert_eq!(limiter.admit().await, Admission::Drop);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_admits_first_query_only() {
        let limiter = AdmissionController::new(0);

        assert_eq!(limiter.admit().await, Admission::Proceed);
        assert!(limiter.admit().await.is_dropped());
    }

    #[tokio::test(start_paused = true)]
    async fn over_limit_query_stalls_until_window_ends() {
        let limiter = AdmissionController::new(0);
        let start = Instant::now();
        assert_eq!(limiter.admit().await, Admission::Proceed);

        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(limiter.admit().await, Admission::Drop);

        let waited = start.elapsed();
        assert!(waited >= WINDOW);
        assert!(waited < WINDOW + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn window_rolls_over_after_one_second() {
        let limiter = AdmissionController::new(1);

        assert_eq!(limiter.admit().await, Admission::Proceed);
        assert_eq!(limiter.admit().await, Admission::Proceed);

        tokio::time::advance(WINDOW).await;
        assert_eq!(limiter.admit().await, Admission::Proceed);
        assert_eq!(limiter.admit().await, Admission::Proceed);
        assert_eq!(limiter.admit().await, Admission::Drop);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_window() {
        let limiter = std::sync::Arc::new(AdmissionController::new(3));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit().await })
            })
            .collect();

        let mut proceeded = 0;
        for task in tasks {
            if task.await.unwrap() == Admission::Proceed {
                proceeded += 1;
            }
        }
        assert_eq!(proceeded, 4);
    }

    #[test]
    fn stall_covers_remaining_window() {
        let limiter = AdmissionController::new(0);
        let t0 = Instant::now();

        let (first, stall) = limiter.check_at(t0);
        assert_eq!(first, Admission::Proceed);
        assert!(stall.is_none());

        let (second, stall) = limiter.check_at(t0 + Duration::from_millis(250));
        assert_eq!(second, Admission::Drop);
        assert_eq!(stall, Some(Duration::from_millis(750)));
    }
}
