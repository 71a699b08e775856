//! Roster Store
//!
//! Authoritative mapping from member identity to per-member stat containers.
//!
//! A reconciliation pass compares the host's current group enumeration against the
//! stored records. New members are created lazily on first sighting, members no
//! longer observed are dropped, and the local member's record is never removed.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::api::events::{EventName, EventSink, StatEvent, StatPayload};
use crate::core::observable::{ContainerId, Observable, Snapshot};
use crate::core::scheduler::Scheduler;
use crate::stats::state::{DpsState, HpsState, UltState};

// =============================================================================
// IDENTITY
// =============================================================================

/// Stable member identity (character name).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberKey(String);

impl MemberKey {
    /// Create a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Volatile roster slot reference, e.g. `group3`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitTag(String);

impl UnitTag {
    /// Alias that always resolves to the local member.
    pub const LOCAL: &'static str = "player";

    /// Create a tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The local alias tag.
    pub fn local() -> Self {
        Self(Self::LOCAL.to_string())
    }

    /// Whether this is the local alias.
    pub fn is_local_alias(&self) -> bool {
        self.0 == Self::LOCAL
    }

    /// Borrow the raw tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit as reported by the membership provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUnit {
    /// Current slot.
    pub tag: UnitTag,
    /// Stable identity.
    pub key: MemberKey,
    /// Account-level display name.
    pub display_name: String,
    /// Human-controlled (companions and NPC helpers are not).
    pub is_human: bool,
}

impl GroupUnit {
    /// Human-controlled unit.
    pub fn human(
        tag: impl Into<String>,
        key: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            tag: UnitTag::new(tag),
            key: MemberKey::new(key),
            display_name: display_name.into(),
            is_human: true,
        }
    }
}

/// Membership provider.
pub trait GroupSource {
    /// Every unit currently in the group.
    fn members(&self) -> Vec<GroupUnit>;
}

// =============================================================================
// MEMBER RECORD
// =============================================================================

/// Stats and identity of one member. Owned by [`RosterStore`].
#[derive(Debug)]
pub struct MemberRecord {
    /// Stable identity.
    pub key: MemberKey,
    /// Current slot.
    pub tag: UnitTag,
    /// Display name.
    pub display_name: String,
    /// Whether this is the local member.
    pub is_player: bool,
    /// Ultimate state.
    pub ult: Observable<UltState>,
    /// Damage state.
    pub dps: Observable<DpsState>,
    /// Healing state.
    pub hps: Observable<HpsState>,
}

impl MemberRecord {
    fn new(unit: &GroupUnit, is_player: bool, settle_ms: u64, sink: &EventSink) -> Self {
        let (ult_event, dps_event, hps_event) = if is_player {
            (EventName::PlayerUltUpdate, EventName::PlayerDpsUpdate, EventName::PlayerHpsUpdate)
        } else {
            (EventName::GroupUltUpdate, EventName::GroupDpsUpdate, EventName::GroupHpsUpdate)
        };

        Self {
            key: unit.key.clone(),
            tag: unit.tag.clone(),
            display_name: unit.display_name.clone(),
            is_player,
            ult: Observable::new(settle_ms, emitter(sink, ult_event, &unit.key, StatPayload::Ult)),
            dps: Observable::new(settle_ms, emitter(sink, dps_event, &unit.key, StatPayload::Dps)),
            hps: Observable::new(settle_ms, emitter(sink, hps_event, &unit.key, StatPayload::Hps)),
        }
    }

    /// Container ids, for timer routing.
    pub fn container_ids(&self) -> [ContainerId; 3] {
        [self.ult.id(), self.dps.id(), self.hps.id()]
    }

    fn settle(&mut self, id: ContainerId) -> bool {
        if id == self.ult.id() {
            self.ult.settle()
        } else if id == self.dps.id() {
            self.dps.settle()
        } else if id == self.hps.id() {
            self.hps.settle()
        } else {
            false
        }
    }

    fn cancel_pending(&mut self, sched: &mut dyn Scheduler) {
        self.ult.cancel_pending(sched);
        self.dps.cancel_pending(sched);
        self.hps.cancel_pending(sched);
    }
}

/// Build a container callback that forwards snapshots as events.
fn emitter<T: Clone>(
    sink: &EventSink,
    name: EventName,
    key: &MemberKey,
    wrap: fn(Snapshot<T>) -> StatPayload,
) -> impl FnMut(&Snapshot<T>) + 'static
where
    T: 'static,
{
    let sink = sink.clone();
    let key = key.clone();
    move |snapshot: &Snapshot<T>| {
        let event = StatEvent { name, key: key.clone(), payload: wrap(snapshot.clone()) };
        // Receiver lives as long as the context; a closed channel only means shutdown.
        let _ = sink.send(event);
    }
}

// =============================================================================
// ROSTER STORE
// =============================================================================

/// Members joined and left during one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Newly created records.
    pub joined: Vec<MemberKey>,
    /// Removed records.
    pub left: Vec<MemberKey>,
}

impl ReconcileReport {
    /// Whether membership changed.
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Member records keyed by identity.
#[derive(Debug)]
pub struct RosterStore {
    local_key: MemberKey,
    records: HashMap<MemberKey, MemberRecord>,
    settle_ms: u64,
    sink: EventSink,
}

impl RosterStore {
    /// Create a store holding only the local member.
    pub fn new(local: &GroupUnit, settle_ms: u64, sink: EventSink) -> Self {
        let mut records = HashMap::new();
        records.insert(local.key.clone(), MemberRecord::new(local, true, settle_ms, &sink));

        Self { local_key: local.key.clone(), records, settle_ms, sink }
    }

    /// The local member's identity.
    pub fn local_key(&self) -> &MemberKey {
        &self.local_key
    }

    /// Reconcile against the current group enumeration.
    #[instrument(skip_all, fields(observed = units.len()))]
    pub fn reconcile(&mut self, units: &[GroupUnit], sched: &mut dyn Scheduler) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut observed: Vec<&MemberKey> = Vec::with_capacity(units.len());

        for unit in units.iter().filter(|u| u.is_human) {
            observed.push(&unit.key);

            if unit.key != self.local_key && !self.records.contains_key(&unit.key) {
                debug!("Member {} joined as {}", unit.key, unit.tag);
                let record = MemberRecord::new(unit, false, self.settle_ms, &self.sink);
                self.records.insert(unit.key.clone(), record);
                report.joined.push(unit.key.clone());
            }

            if let Some(record) = self.records.get_mut(&unit.key) {
                record.tag = unit.tag.clone();
                record.display_name = unit.display_name.clone();
            }
        }

        let local_key = &self.local_key;
        let gone: Vec<MemberKey> = self
            .records
            .keys()
            .filter(|key| *key != local_key && !observed.contains(key))
            .cloned()
            .collect();

        for key in gone {
            if let Some(mut record) = self.records.remove(&key) {
                record.cancel_pending(sched);
                debug!("Member {} left", key);
                report.left.push(key);
            }
        }

        report
    }

    /// Record by identity.
    pub fn get(&self, key: &MemberKey) -> Option<&MemberRecord> {
        self.records.get(key)
    }

    /// Mutable record by identity.
    pub fn get_mut(&mut self, key: &MemberKey) -> Option<&mut MemberRecord> {
        self.records.get_mut(key)
    }

    /// The local member's record.
    pub fn local(&self) -> Option<&MemberRecord> {
        self.records.get(&self.local_key)
    }

    /// The local member's record, mutably.
    pub fn local_mut(&mut self) -> Option<&mut MemberRecord> {
        self.records.get_mut(&self.local_key)
    }

    /// Resolve a volatile tag to an identity.
    pub fn key_for_tag(&self, tag: &UnitTag) -> Option<&MemberKey> {
        if tag.is_local_alias() {
            return Some(&self.local_key);
        }
        self.records.values().find(|r| &r.tag == tag).map(|r| &r.key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false: the local record is permanent.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &MemberRecord> {
        self.records.values()
    }

    /// Route a settle timer to the container that owns it.
    pub fn settle(&mut self, id: ContainerId) -> bool {
        self.records.values_mut().any(|r| r.settle(id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
