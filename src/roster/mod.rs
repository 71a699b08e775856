//! Group roster.

pub mod store;

pub use store::{
    GroupSource, GroupUnit, MemberKey, MemberRecord, ReconcileReport, RosterStore, UnitTag,
};
