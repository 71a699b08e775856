//! Protocol Messages
//!
//! Each broadcast carries one [`Envelope`]: a message kind, the sender's protocol
//! revision and a single packed integer. The transport only moves envelopes;
//! JSON is available for diagnostics and bincode for compact framing.

use serde::{Deserialize, Serialize};

use crate::core::bits::max_for_width;
use crate::network::codec::{
    decode_dps, decode_hps, decode_ult_type, decode_ult_value, UltTypePayload, DPS_BITS,
    HPS_BITS, ULT_TYPE_BITS, ULT_VALUE_BITS,
};
use crate::stats::state::{DpsState, HpsState};

/// Revision of the field layouts this build understands.
pub const PROTOCOL_REVISION: u8 = 1;

/// The four broadcast message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageKind {
    /// Ultimate ids, costs and activated set.
    UltType = 0,
    /// Ultimate resource.
    UltValue = 1,
    /// Damage output.
    Dps = 2,
    /// Healing output.
    Hps = 3,
}

impl MessageKind {
    /// All kinds, in wire-id order.
    pub const ALL: [MessageKind; 4] =
        [MessageKind::UltType, MessageKind::UltValue, MessageKind::Dps, MessageKind::Hps];

    /// Stable wire id.
    pub fn wire_id(self) -> u8 {
        self as u8
    }

    /// Parse a wire id.
    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(MessageKind::UltType),
            1 => Some(MessageKind::UltValue),
            2 => Some(MessageKind::Dps),
            3 => Some(MessageKind::Hps),
            _ => None,
        }
    }

    /// Payload width in bits.
    pub fn width(self) -> u32 {
        match self {
            MessageKind::UltType => ULT_TYPE_BITS,
            MessageKind::UltValue => ULT_VALUE_BITS,
            MessageKind::Dps => DPS_BITS,
            MessageKind::Hps => HPS_BITS,
        }
    }

    /// Largest payload a well-behaved encoder produces.
    pub fn max_payload(self) -> u64 {
        max_for_width(self.width())
    }

    /// Name used in timer keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::UltType => "UltType",
            MessageKind::UltValue => "UltValue",
            MessageKind::Dps => "Dps",
            MessageKind::Hps => "Hps",
        }
    }
}

/// One broadcast message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind.
    pub kind: MessageKind,
    /// Sender's protocol revision.
    pub revision: u8,
    /// Packed fields.
    pub payload: u64,
}

/// Decoded message contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Ultimate loadout.
    UltType(UltTypePayload),
    /// Ultimate resource (always even).
    UltValue(u32),
    /// Damage output.
    Dps(DpsState),
    /// Healing output.
    Hps(HpsState),
}

impl Envelope {
    /// Wrap a payload at the local revision.
    pub fn new(kind: MessageKind, payload: u64) -> Self {
        Self { kind, revision: PROTOCOL_REVISION, payload }
    }

    /// Whether this build can decode the envelope.
    pub fn is_supported(&self) -> bool {
        self.revision <= PROTOCOL_REVISION
    }

    /// Decode the payload.
    ///
    /// Envelopes from a newer revision are refused rather than mis-decoded.
    pub fn open(&self) -> Result<Payload, ProtocolError> {
        if !self.is_supported() {
            return Err(ProtocolError::UnsupportedRevision {
                revision: self.revision,
                supported: PROTOCOL_REVISION,
            });
        }

        Ok(match self.kind {
            MessageKind::UltType => Payload::UltType(decode_ult_type(self.payload)),
            MessageKind::UltValue => Payload::UltValue(decode_ult_value(self.payload)),
            MessageKind::Dps => Payload::Dps(decode_dps(self.payload)),
            MessageKind::Hps => Payload::Hps(decode_hps(self.payload)),
        })
    }

    /// Serialize for diagnostics.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a diagnostic JSON envelope.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compact binary framing.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Parse a binary frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Sender runs a newer codec than ours.
    #[error("unsupported protocol revision {revision} (supported up to {supported})")]
    UnsupportedRevision {
        /// Revision tagged on the envelope.
        revision: u8,
        /// Highest revision this build decodes.
        supported: u8,
    },

    /// JSON framing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary framing failed.
    #[error("binary framing error: {0}")]
    Binary(#[from] bincode::Error),
}
