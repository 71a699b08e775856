//! Change-Observing Containers
//!
//! An [`Observable`] wraps a small record of integer fields. Writes are diffed
//! against the stored value; only effective writes bump `last_updated` and arm the
//! debounce timer. When the timer settles the `on_change` callback receives a full
//! [`Snapshot`] of the record.
//!
//! ```text
//!            set (changed)             set (changed): re-arm
//!   ┌──────┐ ──────────────► ┌─────────┐ ◄──────┐
//!   │ Idle │                 │ Pending │ ───────┘
//!   └──────┘ ◄────────────── └─────────┘
//!              timer fired: on_change(snapshot)
//! ```
//!
//! A settle delay of zero bypasses the state machine and fires inline.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::scheduler::{Scheduler, TimerAction, TimerKey};

/// Prefix of every settle timer key.
pub const SETTLE_TIMER_PREFIX: &str = "GroupCombatStats_Settle_";

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique container identity, used to route settle timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(u64);

impl ContainerId {
    fn next() -> Self {
        Self(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A record made of independently addressable integer fields.
pub trait Fields: Clone + Default + PartialEq {
    /// Field selector.
    type Key: Copy + fmt::Debug;

    /// Read a field. Never-written fields read as zero.
    fn read(&self, key: Self::Key) -> u64;

    /// Write a field, saturating it into the field's range.
    fn write(&mut self, key: Self::Key, value: i64);
}

/// Owned copy of a container's state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    /// Field values.
    pub values: T,
    /// Time of the last effective write (ms), 0 if never written.
    pub last_updated: u64,
}

/// Callback invoked with the settled snapshot.
pub type OnChange<T> = Box<dyn FnMut(&Snapshot<T>)>;

/// Debounced, equality-suppressed record container.
pub struct Observable<T: Fields> {
    id: ContainerId,
    values: T,
    last_updated: u64,
    settle_delay_ms: u64,
    pending: bool,
    on_change: OnChange<T>,
}

impl<T: Fields> Observable<T> {
    /// Create a container with default (zero) values.
    pub fn new(settle_delay_ms: u64, on_change: impl FnMut(&Snapshot<T>) + 'static) -> Self {
        Self::with_values(T::default(), settle_delay_ms, on_change)
    }

    /// Create a container with initial values. Initial values do not count as a write.
    pub fn with_values(
        values: T,
        settle_delay_ms: u64,
        on_change: impl FnMut(&Snapshot<T>) + 'static,
    ) -> Self {
        Self {
            id: ContainerId::next(),
            values,
            last_updated: 0,
            settle_delay_ms,
            pending: false,
            on_change: Box::new(on_change),
        }
    }

    /// Container identity.
    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// Key of this container's settle timer.
    pub fn timer_key(&self) -> TimerKey {
        TimerKey::new(format!("{}{}", SETTLE_TIMER_PREFIX, self.id.0))
    }

    /// Read one field.
    pub fn get(&self, key: T::Key) -> u64 {
        self.values.read(key)
    }

    /// Borrow the current values.
    pub fn values(&self) -> &T {
        &self.values
    }

    /// Time of the last effective write.
    pub fn last_updated(&self) -> u64 {
        self.last_updated
    }

    /// Whether a settle timer is armed.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Copy out the current state.
    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot { values: self.values.clone(), last_updated: self.last_updated }
    }

    /// Write one field. Returns true if the stored value changed.
    pub fn set(&mut self, key: T::Key, value: i64, sched: &mut dyn Scheduler) -> bool {
        self.update(|values| values.write(key, value), sched)
    }

    /// Apply several writes and diff once. Returns true if anything changed.
    pub fn update(&mut self, apply: impl FnOnce(&mut T), sched: &mut dyn Scheduler) -> bool {
        let mut next = self.values.clone();
        apply(&mut next);
        if next == self.values {
            return false;
        }

        self.values = next;
        self.last_updated = sched.now_ms();
        self.arm(sched);
        true
    }

    fn arm(&mut self, sched: &mut dyn Scheduler) {
        if self.settle_delay_ms == 0 {
            self.fire();
            return;
        }

        let key = self.timer_key();
        if self.pending {
            sched.cancel(&key);
        }
        sched.schedule_once(key, self.settle_delay_ms, TimerAction::Settle(self.id));
        self.pending = true;
    }

    /// Settle timer fired. Returns false if nothing was pending.
    pub fn settle(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.fire();
        true
    }

    /// Drop a pending notification without firing it.
    pub fn cancel_pending(&mut self, sched: &mut dyn Scheduler) {
        if self.pending {
            sched.cancel(&self.timer_key());
            self.pending = false;
        }
    }

    fn fire(&mut self) {
        let snapshot = self.snapshot();
        (self.on_change)(&snapshot);
    }
}

impl<T: Fields + fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.id)
            .field("values", &self.values)
            .field("last_updated", &self.last_updated)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::ManualScheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Pair {
        a: u32,
        b: u32,
    }

    #[derive(Clone, Copy, Debug)]
    enum PairKey {
        A,
        B,
    }

    impl Fields for Pair {
        type Key = PairKey;

        fn read(&self, key: PairKey) -> u64 {
            match key {
                PairKey::A => self.a as u64,
                PairKey::B => self.b as u64,
            }
        }

        fn write(&mut self, key: PairKey, value: i64) {
            let v = value.clamp(0, 100) as u32;
            match key {
                PairKey::A => self.a = v,
                PairKey::B => self.b = v,
            }
        }
    }

    type Log = Rc<RefCell<Vec<Snapshot<Pair>>>>;

    fn observed(delay: u64) -> (Observable<Pair>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let obs = Observable::new(delay, move |snap: &Snapshot<Pair>| {
            sink.borrow_mut().push(snap.clone());
        });
        (obs, log)
    }

    /// Drive the scheduler, routing settle timers back into the container.
    fn run(obs: &mut Observable<Pair>, sched: &mut ManualScheduler, until: u64) {
        while let Some((_, action)) = sched.pop_due(until) {
            if action == TimerAction::Settle(obs.id()) {
                obs.settle();
            }
        }
        sched.set_now(until);
    }

    #[test]
    fn test_unset_reads_zero() {
        let (obs, _) = observed(100);
        assert_eq!(obs.get(PairKey::A), 0);
        assert_eq!(obs.last_updated(), 0);
    }

    #[test]
    fn test_equal_write_suppressed() {
        let mut sched = ManualScheduler::starting_at(50);
        let (mut obs, log) = observed(0);

        assert!(obs.set(PairKey::A, 7, &mut sched));
        assert_eq!(obs.last_updated(), 50);

        sched.set_now(90);
        assert!(!obs.set(PairKey::A, 7, &mut sched));
        assert_eq!(obs.last_updated(), 50);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_clamped_write_compares_after_clamp() {
        let mut sched = ManualScheduler::new();
        let (mut obs, log) = observed(0);

        assert!(obs.set(PairKey::B, 500, &mut sched));
        assert!(!obs.set(PairKey::B, 100, &mut sched));
        assert_eq!(obs.get(PairKey::B), 100);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_zero_delay_fires_inline() {
        let mut sched = ManualScheduler::new();
        let (mut obs, log) = observed(0);

        obs.set(PairKey::A, 1, &mut sched);
        obs.set(PairKey::A, 2, &mut sched);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn test_debounce_coalesces_burst() {
        let mut sched = ManualScheduler::new();
        let (mut obs, log) = observed(100);

        for i in 1..=5 {
            obs.set(PairKey::A, i, &mut sched);
            run(&mut obs, &mut sched, i as u64 * 50);
        }
        obs.set(PairKey::B, 9, &mut sched);
        assert!(log.borrow().is_empty());
        assert!(obs.is_pending());

        run(&mut obs, &mut sched, 1000);
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].values, Pair { a: 5, b: 9 });
        assert!(!obs.is_pending());
    }

    #[test]
    fn test_update_batches_fields() {
        let mut sched = ManualScheduler::new();
        let (mut obs, log) = observed(0);

        let changed = obs.update(
            |p| {
                p.write(PairKey::A, 3);
                p.write(PairKey::B, 4);
            },
            &mut sched,
        );
        assert!(changed);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_two_containers_do_not_cancel_each_other() {
        let mut sched = ManualScheduler::new();
        let (mut first, first_log) = observed(100);
        let (mut second, second_log) = observed(100);
        assert_ne!(first.timer_key(), second.timer_key());

        first.set(PairKey::A, 1, &mut sched);
        second.set(PairKey::A, 1, &mut sched);
        assert_eq!(sched.pending_count(), 2);

        while let Some((_, action)) = sched.pop_due(200) {
            if action == TimerAction::Settle(first.id()) {
                first.settle();
            } else if action == TimerAction::Settle(second.id()) {
                second.settle();
            }
        }
        assert_eq!(first_log.borrow().len(), 1);
        assert_eq!(second_log.borrow().len(), 1);
    }

    #[test]
    fn test_cancel_pending_drops_notification() {
        let mut sched = ManualScheduler::new();
        let (mut obs, log) = observed(100);

        obs.set(PairKey::A, 1, &mut sched);
        obs.cancel_pending(&mut sched);
        assert!(!obs.settle());
        assert_eq!(sched.pending_count(), 0);
        assert!(log.borrow().is_empty());
    }
}
