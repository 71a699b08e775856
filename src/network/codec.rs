//! Stat Payload Codec
//!
//! Field layouts are a wire contract between independently updated peers.
//! Order, widths and limits must never change within a protocol revision.
//!
//! | Kind      | Injection order                                                    | Bits |
//! |-----------|--------------------------------------------------------------------|------|
//! | UltType   | ult1_id(18) → ult2_id(18) → ult1_cost(9) → ult2_cost(9) → set(4)    | 58   |
//! | UltValue  | ult_value / 2 (8)                                                  | 8    |
//! | Dps       | dps(10) → damage(14) → damage_type(2)                              | 26   |
//! | Hps       | overheal(10) → hps(10)                                             | 20   |
//!
//! Encoders saturate every input. Decoders accept any integer and saturate each
//! extracted field to its limit, so out-of-range senders cannot push stored
//! values past the documented ranges.

use serde::{Deserialize, Serialize};

use crate::core::bits::{BitPacker, BitUnpacker, Field};
use crate::core::observable::Fields;
use crate::stats::state::{
    DamageType, DpsState, HpsState, UltField, UltState, MAX_DAMAGE, MAX_DPS, MAX_HPS,
    MAX_OVERHEAL, MAX_SET_ID, MAX_ULT_COST, MAX_ULT_ID, MAX_ULT_VALUE,
};

const ULT_ID: Field = Field::new(18, MAX_ULT_ID);
const ULT_COST: Field = Field::new(9, MAX_ULT_COST);
const SET_ID: Field = Field::new(4, MAX_SET_ID);
const ULT_HALF_VALUE: Field = Field::new(8, MAX_ULT_VALUE / 2);
const DPS: Field = Field::new(10, MAX_DPS);
const DAMAGE: Field = Field::new(14, MAX_DAMAGE);
const DAMAGE_TYPE: Field = Field::new(2, DamageType::Boss as u32);
// Decoded at full width so the reserved value 3 stays distinguishable.
const DAMAGE_TYPE_RAW: Field = Field::full(2);
const OVERHEAL: Field = Field::new(10, MAX_OVERHEAL);
const HPS: Field = Field::new(10, MAX_HPS);

/// Bits used by an UltType payload.
pub const ULT_TYPE_BITS: u32 = 58;
/// Bits used by an UltValue payload.
pub const ULT_VALUE_BITS: u32 = 8;
/// Bits used by a Dps payload.
pub const DPS_BITS: u32 = 26;
/// Bits used by an Hps payload.
pub const HPS_BITS: u32 = 20;

/// Ultimate loadout carried by an UltType message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UltTypePayload {
    /// Primary bar ultimate ability id.
    pub ult1_id: u32,
    /// Backup bar ultimate ability id.
    pub ult2_id: u32,
    /// Primary bar ultimate cost.
    pub ult1_cost: u32,
    /// Backup bar ultimate cost.
    pub ult2_cost: u32,
    /// Activated set position.
    pub activated_set_id: u32,
}

impl UltTypePayload {
    /// Take the loadout half of an [`UltState`].
    pub fn from_state(state: &UltState) -> Self {
        Self {
            ult1_id: state.ult1_id,
            ult2_id: state.ult2_id,
            ult1_cost: state.ult1_cost,
            ult2_cost: state.ult2_cost,
            activated_set_id: state.activated_set_id,
        }
    }

    /// Write the loadout into an [`UltState`], keeping its ult value.
    pub fn apply(&self, state: &mut UltState) {
        state.write(UltField::Ult1Id, self.ult1_id as i64);
        state.write(UltField::Ult2Id, self.ult2_id as i64);
        state.write(UltField::Ult1Cost, self.ult1_cost as i64);
        state.write(UltField::Ult2Cost, self.ult2_cost as i64);
        state.write(UltField::ActivatedSetId, self.activated_set_id as i64);
    }
}

// =============================================================================
// ULTIMATE
// =============================================================================

/// Pack ultimate ids, costs and the activated set.
pub fn encode_ult_type(
    ult1_id: i64,
    ult2_id: i64,
    ult1_cost: i64,
    ult2_cost: i64,
    activated_set_id: i64,
) -> u64 {
    BitPacker::new()
        .inject(ult1_id, ULT_ID)
        .inject(ult2_id, ULT_ID)
        .inject(ult1_cost, ULT_COST)
        .inject(ult2_cost, ULT_COST)
        .inject(activated_set_id, SET_ID)
        .finish()
}

/// Unpack an UltType envelope.
pub fn decode_ult_type(envelope: u64) -> UltTypePayload {
    let mut bits = BitUnpacker::new(envelope, ULT_TYPE_BITS);
    let activated_set_id = bits.extract(SET_ID);
    let ult2_cost = bits.extract(ULT_COST);
    let ult1_cost = bits.extract(ULT_COST);
    let ult2_id = bits.extract(ULT_ID);
    let ult1_id = bits.extract(ULT_ID);
    UltTypePayload { ult1_id, ult2_id, ult1_cost, ult2_cost, activated_set_id }
}

/// Pack the ultimate resource at half resolution.
///
/// The low bit is dropped: 333 and 332 encode identically.
pub fn encode_ult_value(ult_value: i64) -> u64 {
    let clamped = ult_value.clamp(0, MAX_ULT_VALUE as i64);
    BitPacker::new().inject(clamped / 2, ULT_HALF_VALUE).finish()
}

/// Unpack an UltValue envelope. Always even.
pub fn decode_ult_value(envelope: u64) -> u32 {
    let mut bits = BitUnpacker::new(envelope, ULT_VALUE_BITS);
    bits.extract(ULT_HALF_VALUE) * 2
}

// =============================================================================
// DAMAGE / HEALING
// =============================================================================

/// Pack damage output.
pub fn encode_dps(damage_type: i64, damage: i64, dps: i64) -> u64 {
    BitPacker::new()
        .inject(dps, DPS)
        .inject(damage, DAMAGE)
        .inject(damage_type, DAMAGE_TYPE)
        .finish()
}

/// Unpack a Dps envelope.
pub fn decode_dps(envelope: u64) -> DpsState {
    let mut bits = BitUnpacker::new(envelope, DPS_BITS);
    let damage_type = DamageType::from_bits(bits.extract(DAMAGE_TYPE_RAW));
    let damage = bits.extract(DAMAGE);
    let dps = bits.extract(DPS);
    DpsState { damage_type, damage, dps }
}

/// Pack healing output.
pub fn encode_hps(overheal: i64, hps: i64) -> u64 {
    BitPacker::new().inject(overheal, OVERHEAL).inject(hps, HPS).finish()
}

/// Unpack an Hps envelope.
pub fn decode_hps(envelope: u64) -> HpsState {
    let mut bits = BitUnpacker::new(envelope, HPS_BITS);
    let hps = bits.extract(HPS);
    let overheal = bits.extract(OVERHEAL);
    HpsState { overheal, hps }
}

/// Pack a stored [`DpsState`].
pub fn encode_dps_state(state: &DpsState) -> u64 {
    encode_dps(state.damage_type as i64, state.damage as i64, state.dps as i64)
}

/// Pack a stored [`HpsState`].
pub fn encode_hps_state(state: &HpsState) -> u64 {
    encode_hps(state.overheal as i64, state.hps as i64)
}

/// Pack the loadout of a stored [`UltState`].
pub fn encode_ult_type_state(state: &UltState) -> u64 {
    encode_ult_type(
        state.ult1_id as i64,
        state.ult2_id as i64,
        state.ult1_cost as i64,
        state.ult2_cost as i64,
        state.activated_set_id as i64,
    )
}

// =============================================================================
// TESTS
// =============================================================================
