//! Injectable time source driving the dispatcher's tick.
//!
//! [`SystemClock`] ticks on the tokio timer; [`MockClock`] only ticks when a
//! test calls [`MockClock::advance`], so tick timing is deterministic.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// A repeating tick notification.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick and return its scheduled timestamp.
    ///
    /// Returns `None` once the underlying clock is gone.
    async fn tick(&mut self) -> Option<DateTime<Utc>>;
}

/// Time source: current time plus periodic tickers.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Start a ticker firing every `period`, first at `now + period`.
    fn ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

fn to_chrono(period: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(period.as_millis().max(1) as i64)
}

// ── System clock ────────────────────────────────────────────────────

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let period = period.max(Duration::from_millis(1));
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        // Late ticks are still delivered, one per period, so no tick number is lost.
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let period = to_chrono(period);
        Box::new(IntervalTicker {
            interval,
            next: Utc::now() + period,
            period,
        })
    }
}

/// Tick timestamps are derived from the start time and the period, not sampled,
/// so a slow consumer sees the same timestamps as a fast one.
struct IntervalTicker {
    interval: tokio::time::Interval,
    next: DateTime<Utc>,
    period: chrono::Duration,
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.interval.tick().await;
        let at = self.next;
        self.next += self.period;
        Some(at)
    }
}

// ── Mock clock ──────────────────────────────────────────────────────

/// Manually advanced clock for deterministic tests.
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<Mutex<MockState>>,
}

struct MockState {
    now: DateTime<Utc>,
    timers: Vec<MockTimer>,
}

struct MockTimer {
    period: chrono::Duration,
    next: DateTime<Utc>,
    tx: mpsc::UnboundedSender<DateTime<Utc>>,
}

impl MockClock {
    /// Create a clock frozen at the Unix epoch.
    pub fn new() -> Self {
        Self::starting_at(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                now,
                timers: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move time forward, firing every ticker whose deadline passes.
    ///
    /// Returns the new current time.
    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut state = self.state();
        let target = state.now + to_chrono(by);

        for timer in state.timers.iter_mut() {
            while timer.next <= target {
                if timer.tx.send(timer.next).is_err() {
                    break;
                }
                timer.next += timer.period;
            }
        }
        state.timers.retain(|t| !t.tx.is_closed());
        state.now = target;
        target
    }

    /// Number of live tickers attached to this clock.
    pub fn ticker_count(&self) -> usize {
        let mut state = self.state();
        state.timers.retain(|t| !t.tx.is_closed());
        state.timers.len()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.state().now
    }

    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        let period = to_chrono(period);
        let next = state.now + period;
        state.timers.push(MockTimer { period, next, tx });
        Box::new(MockTicker { rx })
    }
}

struct MockTicker {
    rx: mpsc::UnboundedReceiver<DateTime<Utc>>,
}

#[async_trait]
impl Ticker for MockTicker {
    async fn tick(&mut self) -> Option<DateTime<Utc>> {
        self.rx.recv().await
    }
}
