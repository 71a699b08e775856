//! Broadcast Scheduling
//!
//! Decides when the local member's stats are computed, encoded and sent.
//!
//! ```text
//! ┌──────────┬───────────────────────────────────────────────────┐
//! │ Category │ Triggers                                          │
//! ├──────────┼───────────────────────────────────────────────────┤
//! │ DPS      │ periodic (dps_interval_ms)                        │
//! │ HPS      │ periodic (hps_interval_ms)                        │
//! │ ULT      │ UltValue: periodic (ult_value_interval_ms)        │
//! │          │ UltType:  periodic (ult_type_interval_ms)         │
//! │          │           + loadout change, settled for           │
//! │          │             loadout_settle_ms, which also resets  │
//! │          │             the periodic clock                    │
//! └──────────┴───────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is broadcast for a category until some consumer asks for it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::facade::RegistrationError;
use crate::config::StatsConfig;
use crate::core::observable::{ContainerId, Observable, Snapshot};
use crate::core::scheduler::{Scheduler, TimerAction, TimerKey};
use crate::network::codec::{
    encode_dps_state, encode_hps_state, encode_ult_type_state, encode_ult_value,
};
use crate::network::protocol::{Envelope, MessageKind};
use crate::roster::store::RosterStore;
use crate::stats::compute::{
    compute_dps, compute_hps, compute_ult, compute_ult_value, CombatSource, LoadoutSource,
};
use crate::stats::sets::SetCatalog;
use crate::stats::state::{ChangedAt, LoadoutStamp, UltField};

// =============================================================================
// CATEGORIES
// =============================================================================

/// A broadcastable stat category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatCategory {
    /// Ultimate readiness and loadout.
    Ult,
    /// Damage output.
    Dps,
    /// Healing output.
    Hps,
}

impl StatCategory {
    /// All categories.
    pub const ALL: [StatCategory; 3] = [StatCategory::Ult, StatCategory::Dps, StatCategory::Hps];

    fn bit(self) -> u8 {
        match self {
            StatCategory::Ult => 0b001,
            StatCategory::Dps => 0b010,
            StatCategory::Hps => 0b100,
        }
    }

    /// Message kinds broadcast for this category.
    pub fn message_kinds(self) -> &'static [MessageKind] {
        match self {
            StatCategory::Ult => &[MessageKind::UltValue, MessageKind::UltType],
            StatCategory::Dps => &[MessageKind::Dps],
            StatCategory::Hps => &[MessageKind::Hps],
        }
    }

    /// Category a message kind belongs to.
    pub fn of(kind: MessageKind) -> Self {
        match kind {
            MessageKind::UltType | MessageKind::UltValue => StatCategory::Ult,
            MessageKind::Dps => StatCategory::Dps,
            MessageKind::Hps => StatCategory::Hps,
        }
    }

    /// Upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            StatCategory::Ult => "ULT",
            StatCategory::Dps => "DPS",
            StatCategory::Hps => "HPS",
        }
    }
}

impl fmt::Display for StatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatCategory {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RegistrationError::UnknownCategory(s.to_string()))
    }
}

/// Categories at least one consumer has requested. Bits are never cleared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SharedStatFlags(u8);

impl SharedStatFlags {
    /// No categories.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set a category. Returns true if it was not already set.
    pub fn insert(&mut self, category: StatCategory) -> bool {
        let fresh = !self.contains(category);
        self.0 |= category.bit();
        fresh
    }

    /// Whether a category is set.
    pub fn contains(&self, category: StatCategory) -> bool {
        self.0 & category.bit() != 0
    }

    /// Set categories.
    pub fn iter(&self) -> impl Iterator<Item = StatCategory> + '_ {
        StatCategory::ALL.into_iter().filter(|c| self.contains(*c))
    }

    /// Whether nothing is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// BROADCAST SCHEDULER
// =============================================================================

/// Host collaborators needed to compute local stats.
#[derive(Clone, Copy)]
pub struct LocalInputs<'a> {
    /// Combat counters.
    pub combat: &'a dyn CombatSource,
    /// Ultimate resource and loadout.
    pub loadout: &'a dyn LoadoutSource,
}

/// Outbound envelope channel.
pub type Outbound = mpsc::UnboundedSender<Envelope>;

/// Schedules and performs local broadcasts.
#[derive(Debug)]
pub struct BroadcastScheduler {
    flags: SharedStatFlags,
    prefix: String,
    ult_value_interval_ms: u64,
    ult_type_interval_ms: u64,
    dps_interval_ms: u64,
    hps_interval_ms: u64,
    loadout_cell: Observable<LoadoutStamp>,
    catalog: SetCatalog,
    outbound: Outbound,
}

impl BroadcastScheduler {
    /// Create a scheduler with nothing enabled.
    pub fn new(config: &StatsConfig, catalog: SetCatalog, outbound: Outbound) -> Self {
        let loadout_cell =
            Observable::new(config.loadout_settle_ms, |snapshot: &Snapshot<LoadoutStamp>| {
                debug!("Loadout settled (changed at {} ms)", snapshot.values.changed_at);
            });

        Self {
            flags: SharedStatFlags::empty(),
            prefix: config.timer_prefix.clone(),
            ult_value_interval_ms: config.ult_value_interval_ms,
            ult_type_interval_ms: config.ult_type_interval_ms,
            dps_interval_ms: config.dps_interval_ms,
            hps_interval_ms: config.hps_interval_ms,
            loadout_cell,
            catalog,
            outbound,
        }
    }

    /// Enabled categories.
    pub fn flags(&self) -> SharedStatFlags {
        self.flags
    }

    /// Set catalog used to resolve the activated set.
    pub fn catalog(&self) -> &SetCatalog {
        &self.catalog
    }

    /// Key of a kind's periodic timer.
    pub fn timer_key(&self, kind: MessageKind) -> TimerKey {
        TimerKey::new(format!("{}_Broadcast_{}", self.prefix, kind.as_str()))
    }

    fn interval(&self, kind: MessageKind) -> u64 {
        match kind {
            MessageKind::UltType => self.ult_type_interval_ms,
            MessageKind::UltValue => self.ult_value_interval_ms,
            MessageKind::Dps => self.dps_interval_ms,
            MessageKind::Hps => self.hps_interval_ms,
        }
    }

    fn rearm(&self, kind: MessageKind, sched: &mut dyn Scheduler) {
        let key = self.timer_key(kind);
        sched.cancel(&key);
        sched.schedule_repeating(key, self.interval(kind), TimerAction::Broadcast(kind));
    }

    /// Enable a category and (re)start its timers.
    ///
    /// Returns true the first time a category is enabled.
    pub fn enable(&mut self, category: StatCategory, sched: &mut dyn Scheduler) -> bool {
        let fresh = self.flags.insert(category);
        for kind in category.message_kinds() {
            self.rearm(*kind, sched);
        }
        if fresh {
            info!("Broadcasting {} enabled", category);
        }
        fresh
    }

    /// Whether `kind` is currently broadcast.
    pub fn is_enabled(&self, kind: MessageKind) -> bool {
        self.flags.contains(StatCategory::of(kind))
    }

    /// Compute the local member's stats for `kind`, store them in the local record
    /// and send the encoded envelope. Returns `None` if the category is disabled.
    pub fn broadcast(
        &mut self,
        kind: MessageKind,
        inputs: LocalInputs<'_>,
        roster: &mut RosterStore,
        sched: &mut dyn Scheduler,
    ) -> Option<Envelope> {
        if !self.is_enabled(kind) {
            return None;
        }
        let local = roster.local_mut()?;

        let payload = match kind {
            MessageKind::Dps => {
                let computed = compute_dps(&inputs.combat.totals(), &inputs.combat.units());
                local.dps.update(|state| *state = computed, sched);
                encode_dps_state(local.dps.values())
            }
            MessageKind::Hps => {
                let computed = compute_hps(&inputs.combat.totals());
                local.hps.update(|state| *state = computed, sched);
                encode_hps_state(local.hps.values())
            }
            MessageKind::UltValue => {
                let value = compute_ult_value(inputs.loadout);
                local.ult.set(UltField::UltValue, value as i64, sched);
                encode_ult_value(local.ult.values().ult_value as i64)
            }
            MessageKind::UltType => {
                let computed = compute_ult(inputs.loadout, &self.catalog);
                local.ult.update(|state| *state = computed, sched);
                encode_ult_type_state(local.ult.values())
            }
        };

        let envelope = Envelope::new(kind, payload);
        if self.outbound.send(envelope).is_err() {
            debug!("Outbound channel closed, dropping {}", kind.as_str());
        }
        Some(envelope)
    }

    /// Id of the loadout debounce cell.
    pub fn loadout_cell_id(&self) -> ContainerId {
        self.loadout_cell.id()
    }

    /// Record a loadout change. Ignored while ULT is not enabled.
    pub fn on_loadout_changed(&mut self, sched: &mut dyn Scheduler) -> bool {
        if !self.flags.contains(StatCategory::Ult) {
            return false;
        }
        let now = sched.now_ms();
        self.loadout_cell.set(ChangedAt, now as i64, sched);
        true
    }

    /// The loadout cell settled: broadcast UltType and restart its periodic clock.
    pub fn on_loadout_settled(
        &mut self,
        inputs: LocalInputs<'_>,
        roster: &mut RosterStore,
        sched: &mut dyn Scheduler,
    ) -> Option<Envelope> {
        if !self.loadout_cell.settle() {
            return None;
        }
        let envelope = self.broadcast(MessageKind::UltType, inputs, roster, sched);
        if envelope.is_some() {
            self.rearm(MessageKind::UltType, sched);
        }
        envelope
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::events::event_channel;
    use crate::core::scheduler::ManualScheduler;
    use crate::network::codec::{decode_dps, decode_ult_type};
    use crate::roster::store::GroupUnit;
    use crate::stats::compute::{Bar, CombatTotals, SlottedUltimate, UnitCombat};
    use crate::stats::state::DamageType;

    struct Combat;

    impl CombatSource for Combat {
        fn totals(&self) -> CombatTotals {
            CombatTotals {
                total_damage_out: 600_000,
                total_heal_out: 100_000,
                total_overheal_out: 20_000,
                dps_elapsed_secs: 10.0,
                hps_elapsed_secs: 10.0,
                is_boss_engagement: false,
            }
        }

        fn units(&self) -> Vec<UnitCombat> {
            vec![UnitCombat { total_damage_taken: 600_000, ..Default::default() }]
        }
    }

    struct Loadout;

    impl LoadoutSource for Loadout {
        fn ult_power(&self) -> i64 {
            333
        }

        fn slotted_ultimate(&self, bar: Bar) -> Option<SlottedUltimate> {
            Some(match bar {
                Bar::Primary => SlottedUltimate { ability_id: 100, cost: 200 },
                Bar::Backup => SlottedUltimate { ability_id: 101, cost: 250 },
            })
        }

        fn equipped_pieces(&self, _: u32) -> u32 {
            0
        }
    }

    type Rig =
        (BroadcastScheduler, RosterStore, ManualScheduler, mpsc::UnboundedReceiver<Envelope>);

    fn setup() -> Rig {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, _ev_rx) = event_channel();
        let config = StatsConfig::default();
        let roster = RosterStore::new(&GroupUnit::human("group1", "Ayla", "@ayla"), 0, ev_tx);
        let broadcast = BroadcastScheduler::new(&config, SetCatalog::default(), out_tx);
        (broadcast, roster, ManualScheduler::new(), out_rx)
    }

    fn inputs() -> LocalInputs<'static> {
        LocalInputs { combat: &Combat, loadout: &Loadout }
    }

    #[test]
    fn test_flags_monotonic() {
        let mut flags = SharedStatFlags::empty();
        assert!(flags.insert(StatCategory::Hps));
        assert!(!flags.insert(StatCategory::Hps));
        assert!(flags.contains(StatCategory::Hps));
        assert!(!flags.contains(StatCategory::Dps));
        assert_eq!(flags.iter().collect::<Vec<_>>(), vec![StatCategory::Hps]);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("dps".parse::<StatCategory>(), Ok(StatCategory::Dps));
        assert_eq!(" ULT ".parse::<StatCategory>(), Ok(StatCategory::Ult));
        assert!(matches!(
            "MANA".parse::<StatCategory>(),
            Err(RegistrationError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_disabled_category_not_broadcast() {
        let (mut bs, mut roster, mut sched, mut rx) = setup();
        assert!(bs.broadcast(MessageKind::Dps, inputs(), &mut roster, &mut sched).is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn test_enable_hps_twice_single_timer() {
        let (mut bs, _, mut sched, _) = setup();
        assert!(bs.enable(StatCategory::Hps, &mut sched));
        assert!(!bs.enable(StatCategory::Hps, &mut sched));

        assert_eq!(sched.pending_count(), 1);
        let mut fired = 0;
        while let Some((_, action)) = sched.pop_due(2000) {
            assert_eq!(action, TimerAction::Broadcast(MessageKind::Hps));
            fired += 1;
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_enable_ult_arms_both_kinds() {
        let (mut bs, _, mut sched, _) = setup();
        bs.enable(StatCategory::Ult, &mut sched);
        assert!(sched.is_scheduled(&bs.timer_key(MessageKind::UltValue)));
        assert!(sched.is_scheduled(&bs.timer_key(MessageKind::UltType)));
        assert_eq!(sched.due_at(&bs.timer_key(MessageKind::UltType)), Some(10_000));
    }

    #[test]
    fn test_dps_broadcast_updates_local_record() {
        let (mut bs, mut roster, mut sched, mut rx) = setup();
        bs.enable(StatCategory::Dps, &mut sched);

        let env = bs.broadcast(MessageKind::Dps, inputs(), &mut roster, &mut sched).unwrap();
        assert_eq!(rx.try_recv().unwrap(), env);

        let decoded = decode_dps(env.payload);
        assert_eq!(decoded.damage_type, DamageType::Total);
        assert_eq!(decoded.damage, 60);
        assert_eq!(decoded.dps, 60);
        assert_eq!(*roster.local().unwrap().dps.values(), decoded);
    }

    #[test]
    fn test_ult_value_broadcast_halves() {
        let (mut bs, mut roster, mut sched, _) = setup();
        bs.enable(StatCategory::Ult, &mut sched);

        let env = bs.broadcast(MessageKind::UltValue, inputs(), &mut roster, &mut sched).unwrap();
        assert_eq!(env.payload, 166);
        assert_eq!(roster.local().unwrap().ult.values().ult_value, 333);
    }

    #[test]
    fn test_loadout_ignored_until_ult_enabled() {
        let (mut bs, _, mut sched, _) = setup();
        assert!(!bs.on_loadout_changed(&mut sched));
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn test_loadout_burst_coalesces_and_resets_clock() {
        let (mut bs, mut roster, mut sched, mut rx) = setup();
        bs.enable(StatCategory::Ult, &mut sched);
        let cell = bs.loadout_cell_id();

        let mut sent = Vec::new();
        for t in [100, 600, 1100, 1600] {
            sched.set_now(t);
            bs.on_loadout_changed(&mut sched);
        }

        while let Some((_, action)) = sched.pop_due(4000) {
            match action {
                TimerAction::Settle(id) if id == cell => {
                    sent.extend(bs.on_loadout_settled(inputs(), &mut roster, &mut sched));
                }
                TimerAction::Broadcast(kind) => {
                    bs.broadcast(kind, inputs(), &mut roster, &mut sched);
                }
                _ => {}
            }
        }

        assert_eq!(sent.len(), 1);
        let loadout = decode_ult_type(sent[0].payload);
        assert_eq!((loadout.ult1_id, loadout.ult2_id), (100, 101));
        // settled at 3600, so the coarse refresh restarts from there
        assert_eq!(sched.due_at(&bs.timer_key(MessageKind::UltType)), Some(13_600));

        let ult_type_sent = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind == MessageKind::UltType)
            .count();
        assert_eq!(ult_type_sent, 1);
    }
}
