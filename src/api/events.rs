//! Stat Events
//!
//! Settled container snapshots become [`StatEvent`]s. Containers push them into
//! an unbounded channel; the context drains it after each handler and hands every
//! event to the callbacks subscribed to its name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::observable::Snapshot;
use crate::roster::store::MemberKey;
use crate::stats::state::{DpsState, HpsState, UltState};

/// Public event names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventName {
    /// A group member's ultimate changed.
    GroupUltUpdate,
    /// A group member's damage changed.
    GroupDpsUpdate,
    /// A group member's healing changed.
    GroupHpsUpdate,
    /// The local member's ultimate changed.
    PlayerUltUpdate,
    /// The local member's damage changed.
    PlayerDpsUpdate,
    /// The local member's healing changed.
    PlayerHpsUpdate,
}

impl EventName {
    /// All names.
    pub const ALL: [EventName; 6] = [
        EventName::GroupUltUpdate,
        EventName::GroupDpsUpdate,
        EventName::GroupHpsUpdate,
        EventName::PlayerUltUpdate,
        EventName::PlayerDpsUpdate,
        EventName::PlayerHpsUpdate,
    ];

    /// Wire-style name, e.g. `GROUP_DPS_UPDATE`.
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::GroupUltUpdate => "GROUP_ULT_UPDATE",
            EventName::GroupDpsUpdate => "GROUP_DPS_UPDATE",
            EventName::GroupHpsUpdate => "GROUP_HPS_UPDATE",
            EventName::PlayerUltUpdate => "PLAYER_ULT_UPDATE",
            EventName::PlayerDpsUpdate => "PLAYER_DPS_UPDATE",
            EventName::PlayerHpsUpdate => "PLAYER_HPS_UPDATE",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = SubscribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SubscribeError::UnknownEvent(s.to_string()))
    }
}

/// Snapshot carried by an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatPayload {
    /// Ultimate state.
    Ult(Snapshot<UltState>),
    /// Damage state.
    Dps(Snapshot<DpsState>),
    /// Healing state.
    Hps(Snapshot<HpsState>),
}

/// A settled stat change for one member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEvent {
    /// Event name.
    pub name: EventName,
    /// Member the stats belong to.
    pub key: MemberKey,
    /// New stats.
    pub payload: StatPayload,
}

/// Sending half used by container callbacks.
pub type EventSink = mpsc::UnboundedSender<StatEvent>;

/// Receiving half drained by the context.
pub type EventSource = mpsc::UnboundedReceiver<StatEvent>;

/// Create a connected sink/source pair.
pub fn event_channel() -> (EventSink, EventSource) {
    mpsc::unbounded_channel()
}

/// Subscription handle returned by [`EventHub::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber callback.
pub type Callback = Box<dyn FnMut(&StatEvent)>;

struct Subscription {
    name: EventName,
    callback: Callback,
}

/// Callback registry keyed by event name.
#[derive(Default)]
pub struct EventHub {
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_id: u64,
}

impl EventHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `name`.
    pub fn subscribe(
        &mut self,
        name: EventName,
        callback: impl FnMut(&StatEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.insert(id, Subscription { name, callback: Box::new(callback) });
        debug!("Subscribed {:?} to {}", id, name);
        id
    }

    /// Remove a callback. Returns false if the id was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Number of callbacks registered for `name`.
    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.subscriptions.values().filter(|s| s.name == name).count()
    }

    /// Deliver one event to every matching callback, in subscription order.
    pub fn dispatch(&mut self, event: &StatEvent) {
        for sub in self.subscriptions.values_mut().filter(|s| s.name == event.name) {
            (sub.callback)(event);
        }
    }

    /// Drain `source` and dispatch everything in it. Returns the event count.
    pub fn pump(&mut self, source: &mut EventSource) -> usize {
        let mut count = 0;
        while let Ok(event) = source.try_recv() {
            self.dispatch(&event);
            count += 1;
        }
        count
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Subscription errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// Name is not one of [`EventName::ALL`].
    #[error("unknown event name: {0}")]
    UnknownEvent(String),
}
