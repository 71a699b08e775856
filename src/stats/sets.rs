//! Activated Set Catalog
//!
//! Item sets that change how a member's ultimate behaves. The catalog is an
//! ordered list: when several sets are active, the one listed last wins.

use serde::{Deserialize, Serialize};

use crate::stats::state::MAX_SET_ID;

/// One recognized item set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDefinition {
    /// Host game's item-set id.
    pub game_set_id: u32,
    /// Display name.
    pub name: String,
    /// Equipped pieces needed to count as active.
    pub min_pieces: u32,
}

impl SetDefinition {
    /// Create a definition.
    pub fn new(game_set_id: u32, name: impl Into<String>, min_pieces: u32) -> Self {
        Self { game_set_id, name: name.into(), min_pieces }
    }
}

/// Ordered list of at most 15 set definitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCatalog {
    sets: Vec<SetDefinition>,
}

impl SetCatalog {
    /// Build a catalog, keeping only the first 15 entries (the id field is 4 bits).
    pub fn new(mut sets: Vec<SetDefinition>) -> Self {
        sets.truncate(MAX_SET_ID as usize);
        Self { sets }
    }

    /// Definitions in priority order.
    pub fn sets(&self) -> &[SetDefinition] {
        &self.sets
    }

    /// Definition at a 1-based activated-set id.
    pub fn get(&self, id: u32) -> Option<&SetDefinition> {
        id.checked_sub(1).and_then(|i| self.sets.get(i as usize))
    }

    /// Resolve the activated-set id: the 1-based position of the last entry whose
    /// equipped count meets its minimum, or 0.
    pub fn resolve(&self, equipped_pieces: impl Fn(u32) -> u32) -> u32 {
        self.sets
            .iter()
            .enumerate()
            .rev()
            .find(|(_, set)| equipped_pieces(set.game_set_id) >= set.min_pieces)
            .map(|(i, _)| i as u32 + 1)
            .unwrap_or(0)
    }
}

impl Default for SetCatalog {
    fn default() -> Self {
        Self::new(vec![
            SetDefinition::new(215, "Elemental Succession", 5),
            SetDefinition::new(232, "Roar of Alkosh", 5),
            SetDefinition::new(455, "Z'en's Redress", 5),
            SetDefinition::new(627, "Pearlescent Ward", 5),
            SetDefinition::new(693, "Saxhleel Champion", 5),
            SetDefinition::new(746, "Spaulder of Ruin", 1),
        ])
    }
}
