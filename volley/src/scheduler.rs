use futures_util::FutureExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::any::Any;
use std::future::Future;
use std::num::{NonZeroU32, NonZeroUsize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace};
use volley_core::{Outcome, RequestKind, PROGRESS_INTERVAL};

/// Runs a plan with at most `concurrency` units in flight.
///
/// Every unit is spawned up front and parks on the permit pool; tokio's semaphore admits
/// waiters in FIFO order. The permit lives inside the task, so it is released on every exit
/// path including a panic.
pub(crate) struct Scheduler {
    concurrency: NonZeroUsize,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl Scheduler {
    pub(crate) fn new(concurrency: NonZeroUsize) -> Self {
        Self {
            concurrency,
            limiter: None,
        }
    }

    /// Caps dispatch at `tps` requests per second on top of the permit bound.
    pub(crate) fn tps(mut self, tps: Option<NonZeroU32>) -> Self {
        self.limiter = tps.map(|tps| Arc::new(rate_limiter(tps)));
        self
    }

    /// Outcomes come back in completion order.
    pub(crate) async fn run<F, Fut>(&self, plan: Vec<RequestKind>, work: F) -> Vec<Outcome>
    where
        F: Fn(RequestKind) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let total = plan.len();
        let permits = Arc::new(Semaphore::new(self.concurrency.get()));
        let work = Arc::new(work);
        let start = Instant::now();

        let mut set = JoinSet::new();
        for kind in plan {
            let permits = permits.clone();
            let limiter = self.limiter.clone();
            let work = work.clone();
            set.spawn(async move {
                let Ok(_permit) = permits.acquire().await else {
                    return Outcome::transport_failure(
                        kind.endpoint(),
                        Duration::ZERO,
                        "Permit pool closed",
                    );
                };
                if let Some(limiter) = limiter {
                    limiter.until_ready().await;
                }

                match AssertUnwindSafe(work(kind)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!("Request {kind} panicked: {reason}");
                        Outcome::transport_failure(
                            kind.endpoint(),
                            Duration::ZERO,
                            format!("Request panicked: {reason}"),
                        )
                    }
                }
            });
        }
        debug!(
            "Dispatched {total} requests with {} permits",
            self.concurrency
        );

        let mut outcomes = Vec::with_capacity(total);
        while let Some(res) = set.join_next().await {
            match res {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!("Request task did not complete: {err}"),
            }

            let done = outcomes.len();
            if done % PROGRESS_INTERVAL == 0 || done == total {
                let elapsed = start.elapsed().as_secs_f64();
                let rate = if elapsed > 0. { done as f64 / elapsed } else { 0. };
                info!("Completed {done}/{total} requests ({rate:.1} req/s)");
            }
        }

        outcomes
    }
}

fn rate_limiter(tps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(tps).allow_burst(NonZeroU32::MIN))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_distr::{Distribution, Normal};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plan(n: usize) -> Vec<RequestKind> {
        (0..n).map(|i| RequestKind::ALL[i % 4]).collect()
    }

    fn scheduler(concurrency: usize) -> Scheduler {
        Scheduler::new(NonZeroUsize::new(concurrency).unwrap())
    }

    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        max: AtomicUsize,
        calls: AtomicUsize,
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn conserves_outcomes() {
        let outcomes = scheduler(7)
            .run(plan(103), |kind| async move {
                Outcome::success(kind.endpoint(), 200, Duration::from_millis(1))
            })
            .await;

        assert_eq!(outcomes.len(), 103);
        assert!(outcomes.iter().all(|o| o.success));
    }

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_concurrency() {
        let stats = Arc::new(InFlight::default());

        let tracker = stats.clone();
        let outcomes = scheduler(5)
            .run(plan(60), move |kind| {
                let tracker = tracker.clone();
                async move {
                    let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
                    tracker.max.fetch_max(now, Ordering::SeqCst);
                    let micros = {
                        let normal = Normal::<f64>::new(3_000., 1_000.).unwrap();
                        normal.sample(&mut rand::thread_rng()).max(100.)
                    };
                    tokio::time::sleep(Duration::from_micros(micros as u64)).await;
                    tracker.current.fetch_sub(1, Ordering::SeqCst);
                    Outcome::success(kind.endpoint(), 200, Duration::from_millis(3))
                }
            })
            .await;

        assert_eq!(outcomes.len(), 60);
        assert!(stats.max.load(Ordering::SeqCst) <= 5);
        assert!(stats.max.load(Ordering::SeqCst) > 1);
        assert_eq!(stats.current.load(Ordering::SeqCst), 0);
        assert!(logs_contain("Completed 60/60 requests"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failures_are_isolated() {
        let stats = Arc::new(InFlight::default());

        let tracker = stats.clone();
        let outcomes = scheduler(4)
            .run(plan(100), move |kind| {
                let call = tracker.calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call % 3 == 0 {
                        Outcome::transport_failure(kind.endpoint(), Duration::ZERO, "boom")
                    } else {
                        Outcome::success(kind.endpoint(), 200, Duration::from_millis(1))
                    }
                }
            })
            .await;

        assert_eq!(outcomes.len(), 100);
        assert_eq!(outcomes.iter().filter(|o| !o.success).count(), 34);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panics_become_failed_outcomes() {
        let outcomes = scheduler(2)
            .run(plan(8), |kind| async move {
                if kind == RequestKind::Health {
                    panic!("executor blew up");
                }
                Outcome::success(kind.endpoint(), 200, Duration::from_millis(1))
            })
            .await;

        assert_eq!(outcomes.len(), 8);
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.success).collect();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].endpoint, "/health");
        assert_eq!(
            failed[0].error.as_deref(),
            Some("Request panicked: executor blew up")
        );
    }

    #[tokio::test]
    async fn tps_cap_spaces_dispatch() {
        // governor keeps its own clock, so this runs in real time
        let start = std::time::Instant::now();
        let outcomes = scheduler(10)
            .tps(NonZeroU32::new(10))
            .run(plan(21), |kind| async move {
                Outcome::success(kind.endpoint(), 200, Duration::ZERO)
            })
            .await;

        assert_eq!(outcomes.len(), 21);
        assert!(start.elapsed() >= Duration::from_millis(1900));
    }
}
