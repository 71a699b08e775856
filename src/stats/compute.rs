//! Local Stat Computation
//!
//! Turns the raw counters supplied by the host's combat and loadout sources into
//! the clamped figures that get broadcast.

use serde::{Deserialize, Serialize};

use crate::core::bits::clamp;
use crate::stats::sets::SetCatalog;
use crate::stats::state::{
    DamageType, DpsState, HpsState, UltState, MAX_DAMAGE, MAX_DPS, MAX_HPS, MAX_OVERHEAL,
    MAX_ULT_COST, MAX_ULT_ID, MAX_ULT_VALUE,
};

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Aggregated combat counters for the local member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatTotals {
    /// Total damage dealt.
    pub total_damage_out: u64,
    /// Total effective healing done.
    pub total_heal_out: u64,
    /// Total overhealing done.
    pub total_overheal_out: u64,
    /// Seconds over which damage was dealt.
    pub dps_elapsed_secs: f64,
    /// Seconds over which healing was done.
    pub hps_elapsed_secs: f64,
    /// Whether a boss took part in the current engagement.
    pub is_boss_engagement: bool,
}

/// Per-unit combat record from the current engagement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCombat {
    /// Unit is on our side.
    pub is_friendly: bool,
    /// Damage the local member dealt to this unit.
    pub total_damage_taken: u64,
    /// Boss identifier, if the unit is a boss.
    pub boss_id: Option<u32>,
    /// First hit on this unit (ms).
    pub engagement_start_ms: u64,
    /// Last hit on this unit (ms).
    pub engagement_end_ms: u64,
}

/// Pull-based access to aggregated combat data.
pub trait CombatSource {
    /// Local member totals.
    fn totals(&self) -> CombatTotals;

    /// Units engaged in the current fight.
    fn units(&self) -> Vec<UnitCombat>;
}

/// Action bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bar {
    /// Front bar.
    Primary,
    /// Back bar.
    Backup,
}

/// Ultimate slotted on one bar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlottedUltimate {
    /// Ability id.
    pub ability_id: u32,
    /// Resource cost.
    pub cost: u32,
}

/// Pull-based access to the local member's ultimate resource and loadout.
pub trait LoadoutSource {
    /// Current ultimate resource.
    fn ult_power(&self) -> i64;

    /// Ultimate slotted on `bar`, if any.
    fn slotted_ultimate(&self, bar: Bar) -> Option<SlottedUltimate>;

    /// Equipped pieces of an item set.
    fn equipped_pieces(&self, game_set_id: u32) -> u32;
}

// =============================================================================
// DAMAGE
// =============================================================================

fn per_second(total: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        total as f64 / elapsed_secs
    } else {
        0.0
    }
}

fn floor_div(value: f64, divisor: f64) -> i64 {
    (value / divisor).floor() as i64
}

/// Classify and scale local damage output.
///
/// Boss fights report boss damage per second in hundreds, anything else reports
/// total hostile damage in ten-thousands. `dps` is always raw dps in thousands.
pub fn compute_dps(totals: &CombatTotals, units: &[UnitCombat]) -> DpsState {
    if totals.total_damage_out == 0 {
        return DpsState::default();
    }

    let dps = floor_div(per_second(totals.total_damage_out, totals.dps_elapsed_secs), 1000.0);

    let mut boss_damage = 0u64;
    let mut boss_start = u64::MAX;
    let mut boss_end = 0u64;
    for unit in units.iter().filter(|u| u.boss_id.is_some() && u.total_damage_taken > 0) {
        boss_damage = boss_damage.saturating_add(unit.total_damage_taken);
        boss_start = boss_start.min(unit.engagement_start_ms);
        boss_end = boss_end.max(unit.engagement_end_ms);
    }

    let (damage_type, damage) = if totals.is_boss_engagement && boss_damage > 0 {
        // Sub-second engagements count as one second.
        let secs = (boss_end.saturating_sub(boss_start) as f64 / 1000.0).max(1.0);
        (DamageType::Boss, floor_div(boss_damage as f64 / secs, 100.0))
    } else {
        let hostile = units
            .iter()
            .filter(|u| !u.is_friendly)
            .fold(0u64, |acc, u| acc.saturating_add(u.total_damage_taken));
        (DamageType::Total, (hostile / 10_000) as i64)
    };

    DpsState {
        damage_type,
        damage: clamp(damage, MAX_DAMAGE),
        dps: clamp(dps, MAX_DPS),
    }
}

// =============================================================================
// HEALING
// =============================================================================

/// Scale local healing output. Both figures are zero if either raw metric is.
pub fn compute_hps(totals: &CombatTotals) -> HpsState {
    let raw_heal = per_second(totals.total_heal_out, totals.hps_elapsed_secs);
    let raw_overheal = per_second(totals.total_overheal_out, totals.hps_elapsed_secs);
    if raw_heal <= 0.0 || raw_overheal <= 0.0 {
        return HpsState::default();
    }

    HpsState {
        overheal: clamp(floor_div(raw_overheal, 1000.0), MAX_OVERHEAL),
        hps: clamp(floor_div(raw_heal, 1000.0), MAX_HPS),
    }
}

// =============================================================================
// ULTIMATE
// =============================================================================

/// Current ultimate resource, clamped.
pub fn compute_ult_value(loadout: &dyn LoadoutSource) -> u32 {
    clamp(loadout.ult_power(), MAX_ULT_VALUE)
}

/// Full ultimate state: resource, both slotted ultimates and the activated set.
pub fn compute_ult(loadout: &dyn LoadoutSource, catalog: &SetCatalog) -> UltState {
    let primary = loadout.slotted_ultimate(Bar::Primary).unwrap_or_default();
    let backup = loadout.slotted_ultimate(Bar::Backup).unwrap_or_default();

    UltState {
        ult_value: compute_ult_value(loadout),
        ult1_id: primary.ability_id.min(MAX_ULT_ID),
        ult2_id: backup.ability_id.min(MAX_ULT_ID),
        ult1_cost: primary.cost.min(MAX_ULT_COST),
        ult2_cost: backup.cost.min(MAX_ULT_COST),
        activated_set_id: catalog.resolve(|id| loadout.equipped_pieces(id)),
    }
}
