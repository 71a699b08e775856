//! Host Scheduler Boundary
//!
//! The host owns the event loop and its string-keyed timers. This module defines
//! the narrow interface the stats core needs from it, and a deterministic
//! virtual-clock implementation for tests and offline replay.
//!
//! Timers never carry closures. Each registration holds a [`TimerAction`] that the
//! host hands back to [`crate::context::StatsContext::on_timer`] when it fires.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::observable::ContainerId;
use crate::network::protocol::MessageKind;

/// Opaque timer identifier, namespaced by the caller.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey(String);

impl TimerKey {
    /// Create a key from any string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to do when a timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerAction {
    /// A debounced container has settled.
    Settle(ContainerId),
    /// Periodic broadcast of one message kind.
    Broadcast(MessageKind),
    /// Deferred roster reconciliation.
    Reconcile,
}

/// Delayed and periodic callbacks provided by the host.
///
/// Registering under a key that is already in use replaces the previous
/// registration, so a key is never in flight twice.
pub trait Scheduler {
    /// Current host time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Fire `action` every `interval_ms`, first after one interval.
    fn schedule_repeating(&mut self, key: TimerKey, interval_ms: u64, action: TimerAction);

    /// Fire `action` once after `delay_ms`.
    fn schedule_once(&mut self, key: TimerKey, delay_ms: u64, action: TimerAction);

    /// Drop the registration under `key`. Returns true if one existed.
    fn cancel(&mut self, key: &TimerKey) -> bool;

    /// Whether `key` currently has a registration.
    fn is_scheduled(&self, key: &TimerKey) -> bool;
}

// =============================================================================
// MANUAL SCHEDULER
// =============================================================================

#[derive(Clone, Debug)]
struct Timer {
    due_ms: u64,
    interval_ms: Option<u64>,
    action: TimerAction,
    seq: u64,
}

/// Deterministic scheduler driven by an explicit virtual clock.
#[derive(Clone, Debug, Default)]
pub struct ManualScheduler {
    now_ms: u64,
    timers: BTreeMap<TimerKey, Timer>,
    next_seq: u64,
}

impl ManualScheduler {
    /// Create a scheduler at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scheduler starting at `now_ms`.
    pub fn starting_at(now_ms: u64) -> Self {
        Self { now_ms, ..Self::default() }
    }

    /// Number of live registrations.
    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }

    /// Number of live registrations whose key starts with `prefix`.
    pub fn pending_with_prefix(&self, prefix: &str) -> usize {
        self.timers.keys().filter(|k| k.as_str().starts_with(prefix)).count()
    }

    /// Due time of a registration.
    pub fn due_at(&self, key: &TimerKey) -> Option<u64> {
        self.timers.get(key).map(|t| t.due_ms)
    }

    /// Pop the earliest timer due at or before `until_ms`.
    ///
    /// The clock moves to the timer's due time. Repeating timers are re-armed
    /// one interval later. Returns `None` once nothing else is due.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<(TimerKey, TimerAction)> {
        let key = self
            .timers
            .iter()
            .filter(|(_, t)| t.due_ms <= until_ms)
            .min_by_key(|(_, t)| (t.due_ms, t.seq))
            .map(|(k, _)| k.clone())?;

        let timer = self.timers.remove(&key)?;
        self.now_ms = self.now_ms.max(timer.due_ms);

        if let Some(interval) = timer.interval_ms {
            let seq = self.bump_seq();
            self.timers.insert(
                key.clone(),
                Timer { due_ms: timer.due_ms + interval, seq, ..timer },
            );
        }

        Some((key, timer.action))
    }

    /// Move the clock forward without firing anything.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn insert(
        &mut self,
        key: TimerKey,
        delay_ms: u64,
        interval_ms: Option<u64>,
        action: TimerAction,
    ) {
        let seq = self.bump_seq();
        self.timers.insert(
            key,
            Timer { due_ms: self.now_ms + delay_ms, interval_ms, action, seq },
        );
    }
}

impl Scheduler for ManualScheduler {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn schedule_repeating(&mut self, key: TimerKey, interval_ms: u64, action: TimerAction) {
        // A zero interval would spin forever in pop_due.
        let interval_ms = interval_ms.max(1);
        self.insert(key, interval_ms, Some(interval_ms), action);
    }

    fn schedule_once(&mut self, key: TimerKey, delay_ms: u64, action: TimerAction) {
        self.insert(key, delay_ms, None, action);
    }

    fn cancel(&mut self, key: &TimerKey) -> bool {
        self.timers.remove(key).is_some()
    }

    fn is_scheduled(&self, key: &TimerKey) -> bool {
        self.timers.contains_key(key)
    }
}

// =============================================================================
// TESTS
// =============================================================================
