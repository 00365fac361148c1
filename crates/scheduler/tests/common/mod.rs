//! Shared harness: a scheduler on a mock clock over an in-memory store, with
//! both hooks wired to channels.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use cadence_core::{AlertDefinition, NewAlertDefinition, RuleKey};
use cadence_scheduler::{Evaluator, MockClock, Scheduler, SchedulerBuilder, StaticEvaluator};
use cadence_store::{LocalStore, Store};

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const SETTLE: Duration = Duration::from_millis(50);

/// Definition evaluated by [`StaticEvaluator`] as `normal`.
pub fn new_rule(uid: &str, interval_seconds: u64) -> NewAlertDefinition {
    NewAlertDefinition {
        org_id: 1,
        uid: Some(uid.to_string()),
        title: format!("rule {uid}"),
        condition: "A".to_string(),
        data: json!([{"ref_id": "A", "state": "normal"}]),
        interval_seconds: Some(interval_seconds),
    }
}

pub fn key(uid: &str) -> RuleKey {
    RuleKey::new(1, uid)
}

/// Poll `cond` until it holds, failing the test after [`TIMEOUT`].
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let res = timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(res.is_ok(), "timed out waiting for {what}");
}

pub struct Harness {
    pub clock: MockClock,
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<Scheduler>,
    pub evals: mpsc::UnboundedReceiver<(RuleKey, DateTime<Utc>)>,
    pub stops: mpsc::UnboundedReceiver<RuleKey>,
    pub shutdown: CancellationToken,
    pub run: Option<JoinHandle<()>>,
    pub tick: u64,
    pub base: Duration,
}

impl Harness {
    /// Base interval 1s, in-memory store, static evaluator.
    pub async fn start() -> Self {
        Self::start_with(
            Arc::new(LocalStore::in_memory(1)),
            Arc::new(StaticEvaluator),
            Duration::from_secs(1),
            |b| b,
        )
        .await
    }

    pub async fn start_with(
        store: Arc<dyn Store>,
        evaluator: Arc<dyn Evaluator>,
        base: Duration,
        configure: impl FnOnce(SchedulerBuilder) -> SchedulerBuilder,
    ) -> Self {
        let h = Self::build(store, evaluator, base, configure);
        h.await_ticker().await;
        h
    }

    /// Build and spawn without waiting for the ticker.
    pub fn build(
        store: Arc<dyn Store>,
        evaluator: Arc<dyn Evaluator>,
        base: Duration,
        configure: impl FnOnce(SchedulerBuilder) -> SchedulerBuilder,
    ) -> Self {
        let clock = MockClock::new();
        let (eval_tx, evals) = mpsc::unbounded_channel();
        let (stop_tx, stops) = mpsc::unbounded_channel();

        let builder = Scheduler::builder(Arc::clone(&store), evaluator)
            .base_interval(base)
            .clock(Arc::new(clock.clone()))
            .on_eval_applied(move |key, at| {
                let _ = eval_tx.send((key.clone(), at));
            })
            .on_stop_applied(move |key| {
                let _ = stop_tx.send(key.clone());
            });
        let scheduler = Arc::new(configure(builder).build().unwrap());

        let shutdown = CancellationToken::new();
        let run = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let shutdown = shutdown.clone();
            async move { scheduler.run(shutdown).await }
        });

        Self {
            clock,
            store,
            scheduler,
            evals,
            stops,
            shutdown,
            run: Some(run),
            tick: 0,
            base,
        }
    }

    pub async fn await_ticker(&self) {
        let clock = self.clock.clone();
        wait_for("dispatcher ticker", move || clock.ticker_count() == 1).await;
    }

    pub async fn create(&self, uid: &str, interval_seconds: u64) -> AlertDefinition {
        self.store.create(new_rule(uid, interval_seconds)).await.unwrap()
    }

    /// Advance one base interval and wait until the dispatcher processed it.
    pub async fn tick(&mut self) -> DateTime<Utc> {
        self.tick += 1;
        let at = self.clock.advance(self.base);
        let scheduler = Arc::clone(&self.scheduler);
        let n = self.tick;
        wait_for(&format!("tick {n}"), move || scheduler.metrics().ticks == n).await;
        at
    }

    /// Assert exactly `expected` were evaluated, each with timestamp `at`.
    pub async fn expect_evals(&mut self, at: DateTime<Utc>, expected: &[&str]) {
        let mut got = Vec::new();
        for _ in expected {
            let (key, eval_at) = timeout(TIMEOUT, self.evals.recv())
                .await
                .expect("timed out waiting for evaluation")
                .expect("eval hook channel closed");
            assert_eq!(eval_at, at, "rule {key} evaluated with wrong tick timestamp");
            got.push(key);
        }
        tokio::time::sleep(SETTLE).await;
        if let Ok((key, eval_at)) = self.evals.try_recv() {
            panic!("unexpected evaluation of {key} at {eval_at} (tick {})", self.tick);
        }

        got.sort();
        let mut want: Vec<RuleKey> = expected.iter().map(|uid| key(uid)).collect();
        want.sort();
        assert_eq!(got, want, "tick {}", self.tick);
    }

    /// Assert exactly `expected` stop hooks fired since the last check.
    pub async fn expect_stops(&mut self, expected: &[&str]) {
        let mut got = Vec::new();
        for _ in expected {
            let key = timeout(TIMEOUT, self.stops.recv())
                .await
                .expect("timed out waiting for stop hook")
                .expect("stop hook channel closed");
            got.push(key);
        }
        if let Ok(key) = self.stops.try_recv() {
            panic!("unexpected stop of {key} (tick {})", self.tick);
        }

        got.sort();
        let mut want: Vec<RuleKey> = expected.iter().map(|uid| key(uid)).collect();
        want.sort();
        assert_eq!(got, want, "tick {}", self.tick);
    }

    /// Cancel the run and wait for it to return.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        let run = self.run.take().expect("scheduler already shut down");
        timeout(TIMEOUT, run)
            .await
            .expect("scheduler did not stop")
            .expect("scheduler task panicked");
    }
}
