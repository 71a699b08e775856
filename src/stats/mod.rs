//! Stat Records
//!
//! ## Module Structure
//!
//! - `state`: UltState, DpsState, HpsState and their field keys
//! - `sets`: activated-set catalog
//! - `compute`: local stat derivation from host collaborators

pub mod state;
pub mod sets;
pub mod compute;

// Re-export key types
pub use state::{DamageType, DpsField, DpsState, HpsField, HpsState, UltField, UltState};
pub use sets::{SetCatalog, SetDefinition};
pub use compute::{Bar, CombatSource, CombatTotals, LoadoutSource, SlottedUltimate, UnitCombat};
