//! Tick sources for monitor jobs.
//!
//! Production jobs tick on a Tokio interval. Tests swap in
//! [`ManualScheduler`] so ticks fire only when the test asks for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use docwatch_core::DocumentId;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

#[async_trait]
/// Recurring tick source owned by a single job loop.
pub trait Ticker: Send {
    /// Waits for the next tick. Returns `false` once no further tick will fire.
    async fn tick(&mut self) -> bool;
}

/// Creates one [`Ticker`] per started job.
pub trait TickScheduler: Send + Sync {
    fn ticker(&self, document_id: &DocumentId, interval: Duration) -> Box<dyn Ticker>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Wall-clock scheduler. The first tick fires immediately to take the baseline.
pub struct IntervalScheduler;

struct IntervalTicker {
    interval: Interval,
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

impl TickScheduler for IntervalScheduler {
    fn ticker(&self, _document_id: &DocumentId, interval: Duration) -> Box<dyn Ticker> {
        let mut interval = tokio::time::interval(interval.max(Duration::from_millis(1)));
        // A slow tick pushes the schedule back instead of bursting to catch up.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Box::new(IntervalTicker { interval })
    }
}

#[derive(Clone, Default)]
/// Test scheduler: a job ticks only when [`ManualScheduler::fire`] is called.
pub struct ManualScheduler {
    triggers: Arc<Mutex<HashMap<DocumentId, mpsc::UnboundedSender<()>>>>,
}

struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires one tick for the most recently started job of `document_id`.
    pub fn fire(&self, document_id: &DocumentId) -> bool {
        let triggers = self
            .triggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        triggers
            .get(document_id)
            .is_some_and(|sender| sender.send(()).is_ok())
    }
}

impl TickScheduler for ManualScheduler {
    fn ticker(&self, document_id: &DocumentId, _interval: Duration) -> Box<dyn Ticker> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Replacing the sender ends the previous job's ticker.
        self.triggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document_id.clone(), tx);
        Box::new(ManualTicker { rx })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use docwatch_core::DocumentId;

    use super::{IntervalScheduler, ManualScheduler, TickScheduler};

    #[tokio::test]
    async fn unit_manual_ticker_fires_on_demand_and_ends_when_replaced() {
        let scheduler = ManualScheduler::new();
        let doc = DocumentId::parse("doc").expect("doc id");
        let mut first = scheduler.ticker(&doc, Duration::from_secs(60));

        assert!(scheduler.fire(&doc));
        assert!(first.tick().await);

        let _second = scheduler.ticker(&doc, Duration::from_secs(60));
        assert!(!first.tick().await);
    }

    #[test]
    fn unit_manual_fire_for_unknown_document_is_rejected() {
        let scheduler = ManualScheduler::new();
        let doc = DocumentId::parse("missing").expect("doc id");
        assert!(!scheduler.fire(&doc));
    }

    #[tokio::test]
    async fn functional_interval_ticker_fires_first_tick_immediately() {
        let doc = DocumentId::parse("doc").expect("doc id");
        let mut ticker = IntervalScheduler.ticker(&doc, Duration::from_secs(3_600));
        let fired = tokio::time::timeout(Duration::from_millis(200), ticker.tick())
            .await
            .expect("first tick should not wait for the interval");
        assert!(fired);
    }
}
