//! Per-slot countdown tasks.
//!
//! Every active display (the primary code and one per history entry) gets
//! its own tokio task ticking once per second, aligned to wall-clock second
//! boundaries. A task re-derives its code whenever the window counter
//! differs from the one it last computed, so all slots roll over on the
//! same boundary no matter when they were started, and a delayed tick
//! still catches up. Each task publishes a [`SlotView`] on a `watch`
//! channel and shares nothing else.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::totp::clock::{self, SharedClock, TimeWindow};
use crate::totp::codec::NormalizedSecret;
use crate::totp::core;
use crate::totp::types::*;

/// Shortest tick interval accepted.
const MIN_TICK: Duration = Duration::from_millis(10);

/// What one slot currently shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot: SlotId,
    pub display: SlotDisplay,
    pub remaining_seconds: u32,
    pub progress: f64,
    /// Window the display was computed for.
    pub counter: Option<u64>,
}

impl SlotView {
    pub fn pending(slot: SlotId) -> Self {
        Self {
            slot,
            display: SlotDisplay::Pending,
            remaining_seconds: PERIOD_SECONDS as u32,
            progress: 0.0,
            counter: None,
        }
    }
}

/// Recompute state for one slot.
#[derive(Debug)]
pub(crate) struct SlotTimer {
    slot: SlotId,
    secret: NormalizedSecret,
    last_counter: Option<u64>,
    display: SlotDisplay,
}

impl SlotTimer {
    pub(crate) fn new(slot: SlotId, secret: NormalizedSecret) -> Self {
        Self {
            slot,
            secret,
            last_counter: None,
            display: SlotDisplay::Pending,
        }
    }

    /// Advance to `unix_seconds`, re-deriving on a new window. A failure
    /// marks this slot only and is retried on the next window.
    pub(crate) fn tick(&mut self, unix_seconds: u64) -> SlotView {
        let window = TimeWindow::at(unix_seconds);
        if self.last_counter != Some(window.counter) {
            self.last_counter = Some(window.counter);
            self.display = match core::derive_code_for(&self.secret, unix_seconds) {
                Ok(code) => SlotDisplay::Ready(code),
                Err(e) => {
                    log::warn!("Code derivation failed for slot {}: {}", self.slot, e.message);
                    SlotDisplay::Failed
                }
            };
        }
        SlotView {
            slot: self.slot.clone(),
            display: self.display.clone(),
            remaining_seconds: window.remaining_seconds,
            progress: clock::progress_fraction(unix_seconds),
            counter: self.last_counter,
        }
    }
}

struct TickerTask {
    handle: JoinHandle<()>,
    view: watch::Receiver<SlotView>,
}

/// Owns the countdown tasks. Dropping it aborts all of them.
pub struct CountdownTicker {
    clock: SharedClock,
    tick: Duration,
    tasks: HashMap<SlotId, TickerTask>,
}

impl CountdownTicker {
    pub fn new(clock: SharedClock, tick: Duration) -> Self {
        Self {
            clock,
            tick: tick.max(MIN_TICK),
            tasks: HashMap::new(),
        }
    }

    /// Start (or restart) the task for `slot`. The first view is computed
    /// before returning. Must be called inside a tokio runtime.
    pub fn start(&mut self, slot: SlotId, secret: NormalizedSecret) -> watch::Receiver<SlotView> {
        self.stop(&slot);

        let mut timer = SlotTimer::new(slot.clone(), secret);
        let (tx, rx) = watch::channel(timer.tick(self.clock.now_unix()));

        let clock = self.clock.clone();
        let period = self.tick;
        let first = Instant::now() + self.clock.until_next_second();
        let task_slot = slot.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(timer.tick(clock.now_unix())).is_err() {
                    log::debug!("No listeners left for slot {}, stopping", task_slot);
                    break;
                }
            }
        });

        log::debug!("Started countdown for slot {}", slot);
        self.tasks.insert(
            slot,
            TickerTask {
                handle,
                view: rx.clone(),
            },
        );
        rx
    }

    /// Stop the task for `slot`. Returns `false` if none was running.
    pub fn stop(&mut self, slot: &SlotId) -> bool {
        match self.tasks.remove(slot) {
            Some(task) => {
                task.handle.abort();
                log::debug!("Stopped countdown for slot {}", slot);
                true
            }
            None => false,
        }
    }

    /// Stop every history-entry task, keeping the primary one.
    pub fn stop_entries(&mut self) -> usize {
        self.retain_entries(&HashSet::new())
    }

    /// Stop entry tasks whose id is not in `ids`. Returns how many stopped.
    pub fn retain_entries(&mut self, ids: &HashSet<String>) -> usize {
        let stale: Vec<SlotId> = self
            .tasks
            .keys()
            .filter(|slot| matches!(slot, SlotId::Entry(id) if !ids.contains(id)))
            .cloned()
            .collect();
        for slot in &stale {
            self.stop(slot);
        }
        stale.len()
    }

    /// Stop everything.
    pub fn stop_all(&mut self) {
        for (slot, task) in self.tasks.drain() {
            task.handle.abort();
            log::debug!("Stopped countdown for slot {}", slot);
        }
    }

    pub fn is_running(&self, slot: &SlotId) -> bool {
        self.tasks
            .get(slot)
            .map_or(false, |task| !task.handle.is_finished())
    }

    /// Active slots, primary first then entries by id.
    pub fn active_slots(&self) -> Vec<SlotId> {
        let mut slots: Vec<SlotId> = self.tasks.keys().cloned().collect();
        slots.sort();
        slots
    }

    /// Latest view published by `slot`.
    pub fn view(&self, slot: &SlotId) -> Option<SlotView> {
        self.tasks.get(slot).map(|task| task.view.borrow().clone())
    }

    /// A receiver for `slot`'s updates.
    pub fn subscribe(&self, slot: &SlotId) -> Option<watch::Receiver<SlotView>> {
        self.tasks.get(slot).map(|task| task.view.clone())
    }

    /// Latest view of every active slot, ordered as [`active_slots`](Self::active_slots).
    pub fn snapshot(&self) -> Vec<SlotView> {
        self.active_slots()
            .iter()
            .filter_map(|slot| self.view(slot))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totp::clock::ManualClock;
    use crate::totp::codec;

    const DEMO_SECRET: &str = "JBSWY3DPEHPK3PXP";
    const WAIT: Duration = Duration::from_secs(5);

    fn secret(s: &str) -> NormalizedSecret {
        codec::normalize(s).unwrap()
    }

    fn ticker(clock: &std::sync::Arc<ManualClock>) -> CountdownTicker {
        CountdownTicker::new(clock.clone(), Duration::from_millis(20))
    }

    // ── SlotTimer ────────────────────────────────────────────────

    #[test]
    fn timer_computes_once_per_window() {
        let mut timer = SlotTimer::new(SlotId::Primary, secret(DEMO_SECRET));
        let v = timer.tick(30);
        assert_eq!(v.display, SlotDisplay::Ready("996554".into()));
        assert_eq!(v.remaining_seconds, 30);
        assert_eq!(v.counter, Some(1));

        let v = timer.tick(59);
        assert_eq!(v.display, SlotDisplay::Ready("996554".into()));
        assert_eq!(v.remaining_seconds, 1);

        let v = timer.tick(60);
        assert_eq!(v.display, SlotDisplay::Ready("602287".into()));
        assert_eq!(v.remaining_seconds, 30);
        assert_eq!(v.counter, Some(2));
    }

    #[test]
    fn timer_catches_up_after_skipped_boundary() {
        let mut timer = SlotTimer::new(SlotId::Primary, secret(DEMO_SECRET));
        timer.tick(59);
        // the 30-second tick at t=60 was missed
        let v = timer.tick(91);
        assert_eq!(v.display, SlotDisplay::Ready("143627".into()));
        assert_eq!(v.counter, Some(3));
    }

    #[test]
    fn pending_view() {
        let v = SlotView::pending(SlotId::Primary);
        assert_eq!(v.display.render(false), PENDING_PLACEHOLDER);
        assert_eq!(v.counter, None);
    }

    // ── CountdownTicker ──────────────────────────────────────────

    #[tokio::test]
    async fn start_publishes_first_view_immediately() {
        let clock = ManualClock::new(59);
        let mut t = ticker(&clock);
        let rx = t.start(SlotId::Primary, secret(DEMO_SECRET));
        assert_eq!(rx.borrow().display, SlotDisplay::Ready("996554".into()));
        assert!(t.is_running(&SlotId::Primary));
        assert_eq!(t.view(&SlotId::Primary).unwrap().remaining_seconds, 1);
    }

    #[tokio::test]
    async fn rolls_over_with_the_clock() {
        let clock = ManualClock::new(59);
        let mut t = ticker(&clock);
        let mut rx = t.start(SlotId::Primary, secret(DEMO_SECRET));
        clock.set(60);
        let view = time::timeout(WAIT, rx.wait_for(|v| v.counter == Some(2)))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(view.display, SlotDisplay::Ready("602287".into()));
        assert_eq!(view.remaining_seconds, 30);
    }

    #[tokio::test]
    async fn slots_tick_independently_and_converge() {
        let clock = ManualClock::new(45);
        let mut t = ticker(&clock);
        let mut a = t.start(SlotId::Entry("a".into()), secret(DEMO_SECRET));
        clock.set(52);
        let mut b = t.start(SlotId::Entry("b".into()), secret("JBSWY3DP"));
        clock.set(60);
        let va = time::timeout(WAIT, a.wait_for(|v| v.counter == Some(2)))
            .await
            .unwrap()
            .unwrap()
            .clone();
        let vb = time::timeout(WAIT, b.wait_for(|v| v.counter == Some(2)))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(va.remaining_seconds, vb.remaining_seconds);
        assert_eq!(va.display, SlotDisplay::Ready("602287".into()));
        assert!(vb.display.code().is_some());
    }

    #[tokio::test]
    async fn stop_and_retain() {
        let clock = ManualClock::new(59);
        let mut t = ticker(&clock);
        t.start(SlotId::Primary, secret(DEMO_SECRET));
        t.start(SlotId::Entry("a".into()), secret(DEMO_SECRET));
        t.start(SlotId::Entry("b".into()), secret("MZXW6"));
        assert_eq!(t.len(), 3);
        assert_eq!(
            t.active_slots(),
            vec![
                SlotId::Primary,
                SlotId::Entry("a".into()),
                SlotId::Entry("b".into())
            ]
        );

        let keep: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(t.retain_entries(&keep), 1);
        assert!(!t.is_running(&SlotId::Entry("a".into())));

        assert_eq!(t.stop_entries(), 1);
        assert!(t.is_running(&SlotId::Primary));
        assert!(t.stop(&SlotId::Primary));
        assert!(!t.stop(&SlotId::Primary));
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn restart_replaces_task() {
        let clock = ManualClock::new(59);
        let mut t = ticker(&clock);
        t.start(SlotId::Primary, secret(DEMO_SECRET));
        let rx = t.start(SlotId::Primary, secret("JBSWY3DP"));
        assert_eq!(t.len(), 1);
        assert_eq!(rx.borrow().display, SlotDisplay::Ready("409098".into()));
        assert_eq!(t.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn stopped_task_no_longer_publishes() {
        let clock = ManualClock::new(59);
        let mut t = ticker(&clock);
        let rx = t.start(SlotId::Primary, secret(DEMO_SECRET));
        t.stop_all();
        clock.set(60);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.borrow().counter, Some(1));
    }
}
