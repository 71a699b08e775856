//! Per-Member Stat Records
//!
//! The three broadcastable stat blocks. Every field saturates into its declared
//! range on write, so stored values are always encodable.

use serde::{Deserialize, Serialize};

use crate::core::bits::clamp;
use crate::core::observable::Fields;

// =============================================================================
// FIELD LIMITS
// =============================================================================

/// Maximum ultimate resource.
pub const MAX_ULT_VALUE: u32 = 500;

/// Maximum ultimate ability id (18 bits).
pub const MAX_ULT_ID: u32 = (1 << 18) - 1;

/// Maximum ultimate cost.
pub const MAX_ULT_COST: u32 = 500;

/// Maximum activated-set id (4 bits).
pub const MAX_SET_ID: u32 = 15;

/// Maximum damage figure.
pub const MAX_DAMAGE: u32 = 9999;

/// Maximum dps figure.
pub const MAX_DPS: u32 = 999;

/// Maximum overheal figure.
pub const MAX_OVERHEAL: u32 = 999;

/// Maximum hps figure.
pub const MAX_HPS: u32 = 999;

// =============================================================================
// ULTIMATE
// =============================================================================

/// Ultimate readiness and loadout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UltState {
    /// Current ultimate resource, 0..=500.
    pub ult_value: u32,
    /// Primary bar ultimate ability id.
    pub ult1_id: u32,
    /// Backup bar ultimate ability id.
    pub ult2_id: u32,
    /// Primary bar ultimate cost, 0..=500.
    pub ult1_cost: u32,
    /// Backup bar ultimate cost, 0..=500.
    pub ult2_cost: u32,
    /// Position of the activated set in the set catalog, 0 for none.
    pub activated_set_id: u32,
}

/// Field selector for [`UltState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UltField {
    /// `ult_value`
    UltValue,
    /// `ult1_id`
    Ult1Id,
    /// `ult2_id`
    Ult2Id,
    /// `ult1_cost`
    Ult1Cost,
    /// `ult2_cost`
    Ult2Cost,
    /// `activated_set_id`
    ActivatedSetId,
}

impl Fields for UltState {
    type Key = UltField;

    fn read(&self, key: UltField) -> u64 {
        let v = match key {
            UltField::UltValue => self.ult_value,
            UltField::Ult1Id => self.ult1_id,
            UltField::Ult2Id => self.ult2_id,
            UltField::Ult1Cost => self.ult1_cost,
            UltField::Ult2Cost => self.ult2_cost,
            UltField::ActivatedSetId => self.activated_set_id,
        };
        v as u64
    }

    fn write(&mut self, key: UltField, value: i64) {
        match key {
            UltField::UltValue => self.ult_value = clamp(value, MAX_ULT_VALUE),
            UltField::Ult1Id => self.ult1_id = clamp(value, MAX_ULT_ID),
            UltField::Ult2Id => self.ult2_id = clamp(value, MAX_ULT_ID),
            UltField::Ult1Cost => self.ult1_cost = clamp(value, MAX_ULT_COST),
            UltField::Ult2Cost => self.ult2_cost = clamp(value, MAX_ULT_COST),
            UltField::ActivatedSetId => self.activated_set_id = clamp(value, MAX_SET_ID),
        }
    }
}

// =============================================================================
// DAMAGE
// =============================================================================

/// How the damage figure was computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DamageType {
    /// No damage recorded.
    #[default]
    Unknown = 0,
    /// Total damage against all hostile units.
    Total = 1,
    /// Boss damage per second.
    Boss = 2,
}

impl DamageType {
    /// Decode a 2-bit field. The reserved value 3 reads as `Unknown`.
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            1 => DamageType::Total,
            2 => DamageType::Boss,
            _ => DamageType::Unknown,
        }
    }
}

/// Damage output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpsState {
    /// Damage classification.
    pub damage_type: DamageType,
    /// Damage figure, 0..=9999.
    pub damage: u32,
    /// Damage per second in thousands, 0..=999.
    pub dps: u32,
}

/// Field selector for [`DpsState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DpsField {
    /// `damage_type`
    DamageType,
    /// `damage`
    Damage,
    /// `dps`
    Dps,
}

impl Fields for DpsState {
    type Key = DpsField;

    fn read(&self, key: DpsField) -> u64 {
        match key {
            DpsField::DamageType => self.damage_type as u64,
            DpsField::Damage => self.damage as u64,
            DpsField::Dps => self.dps as u64,
        }
    }

    fn write(&mut self, key: DpsField, value: i64) {
        match key {
            DpsField::DamageType => {
                self.damage_type = DamageType::from_bits(clamp(value, DamageType::Boss as u32))
            }
            DpsField::Damage => self.damage = clamp(value, MAX_DAMAGE),
            DpsField::Dps => self.dps = clamp(value, MAX_DPS),
        }
    }
}

// =============================================================================
// HEALING
// =============================================================================

/// Healing output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpsState {
    /// Overheal per second in thousands, 0..=999.
    pub overheal: u32,
    /// Healing per second in thousands, 0..=999.
    pub hps: u32,
}

/// Field selector for [`HpsState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HpsField {
    /// `overheal`
    Overheal,
    /// `hps`
    Hps,
}

impl Fields for HpsState {
    type Key = HpsField;

    fn read(&self, key: HpsField) -> u64 {
        match key {
            HpsField::Overheal => self.overheal as u64,
            HpsField::Hps => self.hps as u64,
        }
    }

    fn write(&mut self, key: HpsField, value: i64) {
        match key {
            HpsField::Overheal => self.overheal = clamp(value, MAX_OVERHEAL),
            HpsField::Hps => self.hps = clamp(value, MAX_HPS),
        }
    }
}

// =============================================================================
// LOADOUT CHANGE STAMP
// =============================================================================

/// Single-cell record holding the time of the last loadout change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadoutStamp {
    /// Host time of the change (ms).
    pub changed_at: u64,
}

/// The only field of [`LoadoutStamp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangedAt;

impl Fields for LoadoutStamp {
    type Key = ChangedAt;

    fn read(&self, _: ChangedAt) -> u64 {
        self.changed_at
    }

    fn write(&mut self, _: ChangedAt, value: i64) {
        self.changed_at = value.max(0) as u64;
    }
}
