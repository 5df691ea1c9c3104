//! Multi-rate snapshot polling.
//!
//! One task polls the device and fans the result out to consumers that each
//! want their own cadence. The cadences collapse into a single timer: the
//! base tick is the gcd of all intervals, the cycle length is lcm/gcd, and a
//! consumer is due whenever the tick counter hits a multiple of its stride.
//! With intervals of 100 ms and 250 ms that gives a 50 ms base and a cycle
//! of 10 ticks.
//!
//! Delivery uses [`Mailbox::offer`], so a consumer that has not picked up
//! its previous snapshot is skipped, never blocked on. A failed poll is
//! logged and the schedule keeps running.

use async_trait::async_trait;
use mixctl_core::error::{MixerError, Result};
use mixctl_core::{Mailbox, MixerSnapshot};
use mixctl_control::{ControlLink, OscController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Anything that can produce a full device snapshot on demand.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn poll(&self) -> Result<MixerSnapshot>;
}

#[async_trait]
impl<L: ControlLink> SnapshotSource for OscController<L> {
    async fn poll(&self) -> Result<MixerSnapshot> {
        self.snapshot().await
    }
}

// The daemon shares one controller between the scheduler and the web
// handlers.
#[async_trait]
impl<S: SnapshotSource> SnapshotSource for Arc<S> {
    async fn poll(&self) -> Result<MixerSnapshot> {
        (**self).poll().await
    }
}

/// One snapshot consumer: a name for the logs, a cadence, and the mailbox
/// the scheduler delivers into.
pub struct Consumer {
    pub name: String,
    pub interval_ms: u64,
    pub mailbox: Arc<Mailbox<MixerSnapshot>>,
}

impl Consumer {
    pub fn new(name: impl Into<String>, interval_ms: u64) -> Self {
        Self {
            name: name.into(),
            interval_ms,
            mailbox: Arc::new(Mailbox::new()),
        }
    }
}

// ===== Cadence arithmetic =====

/// The collapsed schedule for a set of consumer intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPlan {
    base_ms: u64,
    cycle: u64,
    strides: Vec<u64>,
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u64, b: u64) -> Option<u64> {
    (a / gcd(a, b)).checked_mul(b)
}

impl DeliveryPlan {
    /// Build a plan from per-consumer intervals in milliseconds.
    pub fn new(intervals_ms: &[u64]) -> Result<Self> {
        if intervals_ms.is_empty() {
            return Err(MixerError::Configuration(
                "scheduler needs at least one consumer".into(),
            ));
        }
        if intervals_ms.contains(&0) {
            return Err(MixerError::Configuration(
                "poll intervals must be non-zero".into(),
            ));
        }
        let base_ms = intervals_ms.iter().copied().fold(0, gcd);
        let cycle = intervals_ms
            .iter()
            .copied()
            .try_fold(1u64, lcm)
            .ok_or_else(|| {
                MixerError::Configuration("poll intervals have no representable common cycle".into())
            })?
            / base_ms;
        let strides = intervals_ms.iter().map(|i| i / base_ms).collect();
        Ok(Self {
            base_ms,
            cycle,
            strides,
        })
    }

    /// Interval between device polls.
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    /// Number of ticks before the pattern repeats.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether consumer `index` is due on the given tick.
    pub fn due(&self, tick: u64, index: usize) -> bool {
        tick % self.strides[index] == 0
    }
}

// ===== Scheduler =====

/// The polling loop itself.
pub struct PollScheduler<S> {
    source: S,
    consumers: Vec<Consumer>,
    plan: DeliveryPlan,
    shutdown: watch::Receiver<bool>,
}

impl<S: SnapshotSource> PollScheduler<S> {
    pub fn new(
        source: S,
        consumers: Vec<Consumer>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let intervals: Vec<u64> = consumers.iter().map(|c| c.interval_ms).collect();
        let plan = DeliveryPlan::new(&intervals)?;
        Ok(Self {
            source,
            consumers,
            plan,
            shutdown,
        })
    }

    /// Poll until the shutdown flag flips.
    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.plan.base());
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; consume it so every
        // poll happens a full base interval after start.
        timer.tick().await;

        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = self.shutdown.wait_for(|stop| *stop) => break,
            }

            match self.source.poll().await {
                Ok(snapshot) => {
                    for (index, consumer) in self.consumers.iter().enumerate() {
                        if !self.plan.due(tick, index) {
                            continue;
                        }
                        if !consumer.mailbox.offer(snapshot.clone()) {
                            debug!(
                                target: "sched",
                                consumer = %consumer.name,
                                "previous snapshot unread, delivery skipped"
                            );
                        }
                    }
                }
                Err(error) => {
                    warn!(target: "sched", %error, "snapshot poll failed");
                }
            }

            tick = (tick + 1) % self.plan.cycle();
        }
        debug!(target: "sched", "scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn plan_for_100_and_250_ms() {
        let plan = DeliveryPlan::new(&[100, 250]).unwrap();
        assert_eq!(plan.base(), Duration::from_millis(50));
        assert_eq!(plan.cycle(), 10);
        // Fast consumer fires every 2nd tick, slow one every 5th.
        let fast: Vec<u64> = (0..10).filter(|&t| plan.due(t, 0)).collect();
        let slow: Vec<u64> = (0..10).filter(|&t| plan.due(t, 1)).collect();
        assert_eq!(fast, vec![0, 2, 4, 6, 8]);
        assert_eq!(slow, vec![0, 5]);
    }

    #[test]
    fn plan_for_a_single_consumer_is_the_identity() {
        let plan = DeliveryPlan::new(&[250]).unwrap();
        assert_eq!(plan.base(), Duration::from_millis(250));
        assert_eq!(plan.cycle(), 1);
        assert!(plan.due(0, 0));
    }

    #[test]
    fn plan_rejects_zero_and_empty() {
        assert!(DeliveryPlan::new(&[]).is_err());
        assert!(DeliveryPlan::new(&[100, 0]).is_err());
    }

    #[test]
    fn plan_rejects_intervals_with_an_overflowing_cycle() {
        // Two large coprime intervals whose lcm exceeds u64.
        let err = DeliveryPlan::new(&[u64::MAX, u64::MAX - 1]).unwrap_err();
        assert!(matches!(err, MixerError::Configuration(_)));
    }

    struct CountingSource {
        polls: Arc<AtomicU64>,
    }

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn poll(&self) -> Result<MixerSnapshot> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(MixerSnapshot::empty(
                vec!["IN1".into()],
                vec!["OUT1".into()],
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn consumers_receive_at_their_own_cadence() {
        let polls = Arc::new(AtomicU64::new(0));
        let web = Consumer::new("web", 100);
        let influx = Consumer::new("influx", 250);
        let web_mailbox = Arc::clone(&web.mailbox);
        let influx_mailbox = Arc::clone(&influx.mailbox);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = PollScheduler::new(
            CountingSource {
                polls: Arc::clone(&polls),
            },
            vec![web, influx],
            shutdown_rx,
        )
        .unwrap();
        let task = tokio::spawn(scheduler.run());

        // Drain three deliveries from each mailbox; with the clock paused
        // tokio advances time as soon as everything is idle.
        for _ in 0..3 {
            web_mailbox.recv().await;
        }
        for _ in 0..3 {
            influx_mailbox.recv().await;
        }

        // Three 250 ms deliveries need at least 11 base ticks, and exactly
        // one device poll happens per tick.
        let polled = polls.load(Ordering::SeqCst);
        assert!(polled >= 11, "expected >= 11 polls, saw {polled}");

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumer_is_skipped_not_blocked() {
        let web = Consumer::new("web", 100);
        let web_mailbox = Arc::clone(&web.mailbox);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = PollScheduler::new(
            CountingSource {
                polls: Arc::new(AtomicU64::new(0)),
            },
            vec![web],
            shutdown_rx,
        )
        .unwrap();
        let task = tokio::spawn(scheduler.run());

        // Never consume; the scheduler must keep running regardless.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(web_mailbox.is_unread());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        // Only the first delivery landed; later ones were offered and
        // skipped while the slot stayed unread.
        assert!(web_mailbox.try_recv().is_some());
        assert!(web_mailbox.try_recv().is_none());
    }
}
