//! Public Read Surface
//!
//! [`StatsView`] borrows the roster immutably and hands out owned snapshots, so
//! nothing a consumer does to a returned value can reach internal state.
//! [`ConsumerRegistry`] records which consumers asked for which categories.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::observable::Snapshot;
use crate::network::broadcast::StatCategory;
use crate::roster::store::{MemberKey, MemberRecord, RosterStore, UnitTag};
use crate::stats::state::{DpsState, HpsState, UltState};

/// Owned copy of one member's record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    /// Stable identity.
    pub key: MemberKey,
    /// Slot at the time of the snapshot.
    pub tag: UnitTag,
    /// Display name.
    pub display_name: String,
    /// Whether this is the local member.
    pub is_player: bool,
    /// Ultimate state.
    pub ult: Snapshot<UltState>,
    /// Damage state.
    pub dps: Snapshot<DpsState>,
    /// Healing state.
    pub hps: Snapshot<HpsState>,
}

impl MemberSnapshot {
    fn of(record: &MemberRecord) -> Self {
        Self {
            key: record.key.clone(),
            tag: record.tag.clone(),
            display_name: record.display_name.clone(),
            is_player: record.is_player,
            ult: record.ult.snapshot(),
            dps: record.dps.snapshot(),
            hps: record.hps.snapshot(),
        }
    }
}

/// Read-only view over the roster.
#[derive(Clone, Copy, Debug)]
pub struct StatsView<'a> {
    roster: &'a RosterStore,
}

impl<'a> StatsView<'a> {
    /// Wrap a roster.
    pub fn new(roster: &'a RosterStore) -> Self {
        Self { roster }
    }

    /// Every member, keyed by identity.
    pub fn all_members(&self) -> HashMap<MemberKey, MemberSnapshot> {
        self.iter_members().collect()
    }

    /// Number of members, local included.
    pub fn member_count(&self) -> usize {
        self.roster.len()
    }

    /// Lazily snapshot members one at a time. Each call starts a fresh pass.
    pub fn iter_members(&self) -> impl Iterator<Item = (MemberKey, MemberSnapshot)> + 'a {
        self.roster.iter().map(|record| (record.key.clone(), MemberSnapshot::of(record)))
    }

    fn record(&self, tag: &UnitTag) -> Option<&'a MemberRecord> {
        let roster = self.roster;
        roster.key_for_tag(tag).and_then(|key| roster.get(key))
    }

    /// Snapshot by volatile tag.
    pub fn member(&self, tag: &UnitTag) -> Option<MemberSnapshot> {
        self.record(tag).map(MemberSnapshot::of)
    }

    /// Damage snapshot by tag.
    pub fn dps(&self, tag: &UnitTag) -> Option<Snapshot<DpsState>> {
        self.record(tag).map(|r| r.dps.snapshot())
    }

    /// Healing snapshot by tag.
    pub fn hps(&self, tag: &UnitTag) -> Option<Snapshot<HpsState>> {
        self.record(tag).map(|r| r.hps.snapshot())
    }

    /// Ultimate snapshot by tag.
    pub fn ult(&self, tag: &UnitTag) -> Option<Snapshot<UltState>> {
        self.record(tag).map(|r| r.ult.snapshot())
    }
}

// =============================================================================
// CONSUMERS
// =============================================================================

/// Handle for a registered consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsumerId(u32);

/// A registered consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Consumer {
    /// Consumer name.
    pub name: String,
    /// Requested categories.
    pub categories: Vec<StatCategory>,
}

/// Consumers keyed by name.
#[derive(Clone, Debug, Default)]
pub struct ConsumerRegistry {
    by_name: BTreeMap<String, ConsumerId>,
    consumers: BTreeMap<ConsumerId, Consumer>,
}

impl ConsumerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record a registration.
    ///
    /// Registering a known name merges its categories into the existing entry.
    pub fn register(
        &mut self,
        name: &str,
        categories: &[StatCategory],
    ) -> Result<ConsumerId, RegistrationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        if categories.is_empty() {
            return Err(RegistrationError::NoCategories(name.to_string()));
        }

        if let Some(id) = self.by_name.get(name).copied() {
            if let Some(consumer) = self.consumers.get_mut(&id) {
                for category in categories {
                    if !consumer.categories.contains(category) {
                        consumer.categories.push(*category);
                    }
                }
            }
            return Ok(id);
        }

        let id = ConsumerId(self.consumers.len() as u32);
        let mut unique = categories.to_vec();
        unique.sort();
        unique.dedup();
        self.by_name.insert(name.to_string(), id);
        self.consumers.insert(id, Consumer { name: name.to_string(), categories: unique });
        Ok(id)
    }

    /// Consumer by id.
    pub fn get(&self, id: ConsumerId) -> Option<&Consumer> {
        self.consumers.get(&id)
    }

    /// Number of registered consumers.
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether nobody has registered.
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Consumer name was blank.
    #[error("consumer name must not be empty")]
    EmptyName,

    /// No categories requested.
    #[error("consumer {0} requested no stat categories")]
    NoCategories(String),

    /// Category name not recognized.
    #[error("unknown stat category: {0}")]
    UnknownCategory(String),
}
