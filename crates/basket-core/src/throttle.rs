//! Per-scraper request throttling and concurrency gating.
//!
//! Every scraper owns exactly one [`RateLimiter`]. It bounds how many
//! requests may be in flight at once and how closely two request starts may
//! follow each other (`1000 / requestsPerSecond` ms). Work that cannot start
//! immediately waits in a FIFO queue and is released one item per completed
//! request.
//!
//! # Example
//!
//! ```rust,no_run
//! use basket_core::config::RateLimitConfig;
//! use basket_core::throttle::RateLimiter;
//!
//! # async fn run() {
//! let limiter = RateLimiter::new("tesco", &RateLimitConfig::new(2.0, 1));
//! let answer = limiter.submit(async { 40 + 2 }).await;
//! assert_eq!(answer, 42);
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Scheduling state of one limiter. Never shared between limiters.
#[derive(Debug)]
struct LimiterState {
    in_flight: usize,
    /// Start time reserved by the most recent request.
    last_start: Option<Instant>,
    /// Waiting tickets, oldest first.
    queue: VecDeque<oneshot::Sender<Slot>>,
}

impl LimiterState {
    /// Earliest permitted start, at least `interval` after the previous one.
    fn next_start(&self, interval: Duration) -> Instant {
        let now = Instant::now();
        match self.last_start {
            Some(last) => std::cmp::max(now, last + interval),
            None => now,
        }
    }

    fn reserve_start(&mut self, interval: Duration) -> Instant {
        let start = self.next_start(interval);
        self.last_start = Some(start);
        start
    }
}

#[derive(Debug)]
struct Shared {
    name: String,
    max_concurrent: usize,
    min_interval: Duration,
    state: Mutex<LimiterState>,
}

impl Shared {
    /// Acquires the state lock, recovering from poison if necessary.
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(scraper = %self.name, "Recovered from poisoned limiter mutex");
            poisoned.into_inner()
        })
    }

    /// Hand the finished request's slot to the oldest live waiter, or free it.
    fn release(self: &Arc<Self>) {
        let mut state = self.lock();
        while let Some(waiter) = state.queue.pop_front() {
            let start_at = state.next_start(self.min_interval);
            let slot = Slot {
                shared: Arc::clone(self),
                start_at,
                armed: true,
            };
            match waiter.send(slot) {
                Ok(()) => {
                    state.last_start = Some(start_at);
                    return;
                }
                // The waiter gave up; try the next one.
                Err(mut slot) => slot.armed = false,
            }
        }
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// An occupied concurrency slot. Dropping it releases the slot.
#[derive(Debug)]
struct Slot {
    shared: Arc<Shared>,
    start_at: Instant,
    armed: bool,
}

impl Slot {
    /// Sleep until this slot's reserved start time.
    async fn wait_turn(&self) {
        let now = Instant::now();
        if self.start_at > now {
            tracing::debug!(
                scraper = %self.shared.name,
                sleep_ms = %(self.start_at - now).as_millis(),
                "Throttling request"
            );
            tokio::time::sleep_until(self.start_at).await;
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release();
        }
    }
}

/// Concurrency gate and request spacer for one scraper instance.
///
/// Not `Clone`: two scrapers never share scheduling state,
/// even when they target the same host.
#[derive(Debug)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: &RateLimitConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                max_concurrent: config.max_concurrent.max(1),
                min_interval: config.min_interval(),
                state: Mutex::new(LimiterState {
                    in_flight: 0,
                    last_start: None,
                    queue: VecDeque::new(),
                }),
            }),
        }
    }

    /// Run `work` once a slot is free and the request spacing allows it.
    ///
    /// Resolves with exactly what `work` produces.
    pub async fn submit<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let slot = self.acquire().await;
        slot.wait_turn().await;
        let output = work.await;
        drop(slot);
        output
    }

    /// Number of requests currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Number of callers still waiting for a slot. Abandoned tickets are not counted.
    pub fn queued(&self) -> usize {
        self.shared
            .lock()
            .queue
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent
    }

    pub fn min_interval(&self) -> Duration {
        self.shared.min_interval
    }

    async fn acquire(&self) -> Slot {
        loop {
            let ticket = {
                let mut state = self.shared.lock();
                if state.in_flight < self.shared.max_concurrent && state.queue.is_empty() {
                    state.in_flight += 1;
                    let start_at = state.reserve_start(self.shared.min_interval);
                    return Slot {
                        shared: Arc::clone(&self.shared),
                        start_at,
                        armed: true,
                    };
                }
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(tx);
                tracing::debug!(
                    scraper = %self.shared.name,
                    in_flight = state.in_flight,
                    queued = state.queue.len(),
                    "Request queued"
                );
                rx
            };

            // A dropped sender without a slot means the ticket was discarded; queue again.
            if let Ok(slot) = ticket.await {
                return slot;
            }
        }
    }
}
