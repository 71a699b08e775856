//! Network Layer
//!
//! Payload layouts, the envelope that carries them, and the schedule that decides
//! when the local member's stats go out. Transport is left to the host.

pub mod codec;
pub mod protocol;
pub mod broadcast;

pub use codec::{UltTypePayload, DPS_BITS, HPS_BITS, ULT_TYPE_BITS, ULT_VALUE_BITS};
pub use protocol::{Envelope, MessageKind, Payload, ProtocolError, PROTOCOL_REVISION};
pub use broadcast::{BroadcastScheduler, LocalInputs, Outbound, SharedStatFlags, StatCategory};
