//! Core rate limiter implementation.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::clock::{Clock, TokioClock};
use super::history::PermitHistory;
use super::window::{Fairness, LimitConfig, TimeUnit};
use crate::error::{Result, TollgateError};

/// Authorization for one invocation of the gated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    granted_at: Instant,
}

impl Permit {
    /// The timestamp recorded for this permit.
    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }
}

/// Shared admission state, guarded by a short critical section.
struct State {
    history: PermitHistory,
    /// Whether some waiter is currently sleeping until the oldest permit expires.
    timer_held: bool,
}

/// Outcome of one admission attempt.
enum Admission {
    Granted(Permit),
    /// History is full and nobody is watching the clock; sleep until the deadline.
    Sleep(Instant),
    /// History is full and another waiter holds the timer.
    Park,
}

/// A sliding-window rate limiter.
///
/// At most `limit` permits are granted within any trailing window
/// `(now - window, now]`. Callers that find the window full wait until the
/// oldest permit ages out and then re-compete for admission.
///
/// Only one waiter at a time sleeps on the timer; the rest park on a
/// notification and are woken one by one as the timer holder leaves or as
/// grants leave room behind. With [`Fairness::Fifo`] waiters are additionally
/// queued and served in arrival order.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter<C: Clock = TokioClock> {
    config: LimitConfig,
    state: Mutex<State>,
    wakeups: Notify,
    /// FIFO turn queue, present only for [`Fairness::Fifo`]
    queue: Option<tokio::sync::Mutex<()>>,
    clock: C,
}

impl RateLimiter<TokioClock> {
    /// Create a limiter allowing `limit` permits per `window`.
    pub fn new(limit: usize, window: Duration) -> Result<Self> {
        Ok(Self::from_config(LimitConfig::new(limit, window)?))
    }

    /// Create a limiter allowing `limit` permits per time unit.
    pub fn per_unit(unit: TimeUnit, limit: usize) -> Result<Self> {
        Ok(Self::from_config(LimitConfig::per_unit(unit, limit)?))
    }

    /// Create a limiter from a validated configuration.
    pub fn from_config(config: LimitConfig) -> Self {
        Self::with_clock(config, TokioClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter driven by a custom clock.
    pub fn with_clock(config: LimitConfig, clock: C) -> Self {
        let queue = match config.fairness() {
            Fairness::Fifo => Some(tokio::sync::Mutex::new(())),
            Fairness::Unordered => None,
        };

        Self {
            state: Mutex::new(State {
                history: PermitHistory::with_limit(config.limit()),
                timer_held: false,
            }),
            wakeups: Notify::new(),
            queue,
            config,
            clock,
        }
    }

    /// Wait until a permit is available, record it and return it.
    ///
    /// Cancel-safe: dropping the future before it resolves grants nothing and
    /// leaves the history untouched.
    pub async fn acquire(&self) -> Permit {
        let _turn = match &self.queue {
            Some(queue) => Some(queue.lock().await),
            None => None,
        };

        loop {
            let deadline = {
                let notified = self.wakeups.notified();
                tokio::pin!(notified);
                // Register before inspecting state so a release in between is not lost
                notified.as_mut().enable();

                match self.admit() {
                    Admission::Granted(permit) => {
                        // Hand the baton on: a parked waiter either takes spare room or becomes the timer holder
                        self.wakeups.notify_one();
                        return permit;
                    }
                    Admission::Park => {
                        trace!("Window full, parking until the timer holder releases");
                        notified.await;
                        continue;
                    }
                    Admission::Sleep(deadline) => deadline,
                }
            };

            let _hold = TimerHold { limiter: self };
            self.clock.sleep_until(deadline).await;
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up when `cancel` resolves first.
    ///
    /// Fails with [`TollgateError::Cancelled`] in that case; no permit is recorded.
    pub async fn acquire_until<F>(&self, cancel: F) -> Result<Permit>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!("Permit acquisition cancelled");
                Err(TollgateError::Cancelled)
            }
            permit = self.acquire() => Ok(permit),
        }
    }

    /// Grant a permit only if one is available right now.
    ///
    /// In FIFO mode this also fails while another caller is queued.
    pub fn try_acquire(&self) -> Option<Permit> {
        let _turn = match &self.queue {
            Some(queue) => Some(queue.try_lock().ok()?),
            None => None,
        };

        let mut state = self.state.lock();
        let now = self.clock.now();
        state.history.evict_expired(now, self.config.window());
        let granted_at = state.history.record(now)?;

        trace!(in_window = state.history.len(), "Permit granted without waiting");
        Some(Permit { granted_at })
    }

    /// Evict, check and record as one atomic step.
    fn admit(&self) -> Admission {
        let window = self.config.window();
        let mut state = self.state.lock();
        // Read under the lock so recorded timestamps follow grant order
        let now = self.clock.now();

        let evicted = state.history.evict_expired(now, window);
        if let Some(granted_at) = state.history.record(now) {
            trace!(
                evicted = evicted,
                in_window = state.history.len(),
                "Permit granted"
            );
            return Admission::Granted(Permit { granted_at });
        }

        if state.timer_held {
            return Admission::Park;
        }

        match state.history.next_expiry(window) {
            Some(deadline) => {
                state.timer_held = true;
                debug!(
                    wait_ms = deadline.saturating_duration_since(now).as_millis() as u64,
                    limit = self.config.limit(),
                    "Rate limit reached, waiting for the window to slide"
                );
                Admission::Sleep(deadline)
            }
            // The oldest permit never expires within representable time
            None => Admission::Park,
        }
    }

    /// Get the maximum number of permits per window.
    pub fn limit(&self) -> usize {
        self.config.limit()
    }

    /// Get the window duration.
    pub fn window(&self) -> Duration {
        self.config.window()
    }

    /// Get the waiter ordering policy.
    pub fn fairness(&self) -> Fairness {
        self.config.fairness()
    }

    /// Number of permits currently counting against the limit.
    pub fn in_window(&self) -> usize {
        let now = self.clock.now();
        self.state.lock().history.live_at(now, self.config.window())
    }

    /// Number of permits that could be granted right now.
    pub fn available(&self) -> usize {
        self.limit().saturating_sub(self.in_window())
    }

    /// Time until a permit frees up, zero when one is available now.
    pub fn time_until_available(&self) -> Duration {
        let window = self.config.window();
        let now = self.clock.now();
        let state = self.state.lock();

        if state.history.live_at(now, window) < self.config.limit() {
            return Duration::ZERO;
        }
        state
            .history
            .next_expiry(window)
            .map_or(Duration::MAX, |deadline| deadline.saturating_duration_since(now))
    }
}

/// Marks the current waiter as the timer holder; releasing it wakes the next waiter.
struct TimerHold<'a, C: Clock> {
    limiter: &'a RateLimiter<C>,
}

impl<C: Clock> Drop for TimerHold<'_, C> {
    fn drop(&mut self) {
        self.limiter.state.lock().timer_held = false;
        self.limiter.wakeups.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready};

    fn limiter(limit: usize, window: Duration) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(limit, window).unwrap())
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        assert!(matches!(
            RateLimiter::new(0, Duration::from_secs(1)),
            Err(TollgateError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RateLimiter::new(1, Duration::ZERO),
            Err(TollgateError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_up_to_limit_immediately() {
        let limiter = RateLimiter::per_unit(TimeUnit::Second, 3).unwrap();
        let start = Instant::now();

        for _ in 0..3 {
            let permit = limiter.acquire().await;
            assert_eq!(permit.granted_at(), start);
        }

        assert_eq!(limiter.in_window(), 3);
        assert_eq!(limiter.available(), 0);
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.time_until_available(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_calls_wait_one_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1)).unwrap();
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        let second = limiter.acquire().await;

        assert_eq!(second.granted_at() - start, Duration::from_secs(1));
        assert_eq!(limiter.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_caller_released_when_window_slides() {
        let limiter = limiter(1, Duration::from_secs(1));
        let start = Instant::now();

        // Thread A at t=0
        let a = limiter.acquire().await;
        assert_eq!(a.granted_at(), start);

        // Thread B at t=0.1s
        tokio::time::sleep(Duration::from_millis(100)).await;
        let b = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };

        let waited = b.await.unwrap().granted_at() - start;
        assert!(waited >= Duration::from_secs(1), "released early: {:?}", waited);
        assert!(waited <= Duration::from_millis(1200), "released late: {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_rate() {
        const LIMIT: usize = 3;
        const CALLERS: usize = 25;
        let window = Duration::from_secs(1);
        let limiter = limiter(LIMIT, window);
        let start = Instant::now();

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await.granted_at() })
            })
            .collect();

        let mut granted = Vec::with_capacity(CALLERS);
        for handle in handles {
            granted.push(handle.await.unwrap());
        }
        granted.sort();

        // Any LIMIT + 1 consecutive permits must span at least one full window
        for pair in granted.windows(LIMIT + 1) {
            assert!(pair[LIMIT] - pair[0] >= window);
        }

        // 25 permits in batches of 3 need 8 window slides
        let elapsed = granted[CALLERS - 1] - start;
        assert!(elapsed >= Duration::from_secs(8));
        assert!(elapsed < Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_loop_callers_are_not_starved() {
        let limiter = limiter(2, Duration::from_millis(500));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        limiter.acquire().await;
                    }
                })
            })
            .collect();

        let all = futures::future::join_all(handles);
        let results = tokio::time::timeout(Duration::from_secs(60), all)
            .await
            .expect("closed-loop callers should all finish");
        assert!(results.into_iter().all(|r| r.is_ok()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_leaves_no_trace() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1)).unwrap();
        let start = Instant::now();
        limiter.acquire().await;

        let result = limiter
            .acquire_until(tokio::time::sleep(Duration::from_millis(300)))
            .await;

        assert!(matches!(result, Err(TollgateError::Cancelled)));
        assert_eq!(limiter.in_window(), 1);

        // The timer was released, so the next caller still gets through on time
        let permit = limiter.acquire().await;
        assert_eq!(permit.granted_at() - start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_acquire_records_nothing() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1)).unwrap();
        limiter.acquire().await;

        let mut waiting = tokio_test::task::spawn(limiter.acquire());
        assert_pending!(waiting.poll());
        drop(waiting);

        assert_eq!(limiter.in_window(), 1);
        assert!(!limiter.state.lock().timer_held);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_holder_abort_hands_off_to_parked_waiter() {
        let limiter = limiter(1, Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;

        let holder = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };
        tokio::task::yield_now().await;
        assert!(limiter.state.lock().timer_held);

        let parked = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };
        tokio::task::yield_now().await;

        holder.abort();
        assert!(holder.await.unwrap_err().is_cancelled());

        let permit = parked.await.unwrap();
        assert_eq!(permit.granted_at() - start, Duration::from_secs(1));
        assert_eq!(limiter.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_serves_in_arrival_order() {
        let config = LimitConfig::new(1, Duration::from_secs(1))
            .unwrap()
            .with_fairness(Fairness::Fifo);
        let limiter = Arc::new(RateLimiter::from_config(config));
        limiter.acquire().await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for caller in 0..5 {
            let limiter = limiter.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                tx.send(caller).unwrap();
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(caller) = rx.recv().await {
            order.push(caller);
        }
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_try_acquire_respects_queue() {
        let config = LimitConfig::new(1, Duration::from_secs(1))
            .unwrap()
            .with_fairness(Fairness::Fifo);
        let limiter = RateLimiter::from_config(config);
        limiter.acquire().await;

        let mut queued = tokio_test::task::spawn(limiter.acquire());
        assert_pending!(queued.poll());

        // The window slides, but the queued caller is ahead
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire().is_none());

        assert!(queued.is_woken());
        assert_ready!(queued.poll());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_callers_never_exceed_rate() {
        const LIMIT: usize = 5;
        const CALLERS: usize = 40;
        let window = Duration::from_millis(100);
        let limiter = limiter(LIMIT, window);

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await.granted_at() })
            })
            .collect();

        let results = tokio::time::timeout(
            Duration::from_secs(10),
            futures::future::join_all(handles),
        )
        .await
        .expect("parallel callers should all be served");

        let mut granted: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        granted.sort();
        assert_eq!(granted.len(), CALLERS);

        for pair in granted.windows(LIMIT + 1) {
            assert!(
                pair[LIMIT] - pair[0] >= window,
                "{} permits granted within {:?}",
                LIMIT + 1,
                pair[LIMIT] - pair[0]
            );
        }
        assert!(limiter.in_window() <= LIMIT);
    }

    /// Clock that jumps backwards after its first reading.
    struct BackwardsClock {
        base: Instant,
        first: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Clock for BackwardsClock {
        fn now(&self) -> Instant {
            if self.first.swap(false, Ordering::SeqCst) {
                self.base + Duration::from_millis(100)
            } else {
                self.base
            }
        }

        async fn sleep_until(&self, deadline: Instant) {
            tokio::time::sleep_until(deadline).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_going_backwards_is_absorbed() {
        let base = Instant::now();
        let clock = BackwardsClock {
            base,
            first: AtomicBool::new(true),
        };
        let limiter =
            RateLimiter::with_clock(LimitConfig::new(2, Duration::from_secs(1)).unwrap(), clock);

        let first = limiter.acquire().await;
        let second = limiter.acquire().await;

        assert_eq!(first.granted_at(), base + Duration::from_millis(100));
        assert_eq!(second.granted_at(), first.granted_at());
        assert!(limiter.try_acquire().is_none());
    }
}
