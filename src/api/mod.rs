//! Consumer-facing surface: event subscriptions and read-only snapshots.

pub mod events;
pub mod facade;

pub use events::{EventHub, EventName, StatEvent, StatPayload, SubscribeError, SubscriptionId};
pub use facade::{ConsumerId, ConsumerRegistry, MemberSnapshot, RegistrationError, StatsView};
