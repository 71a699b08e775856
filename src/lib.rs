//! # Group Combat Stats
//!
//! Shares ultimate readiness, damage and healing between members of a group and
//! exposes everyone's latest numbers to local consumers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GROUP COMBAT STATS                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── bits.rs     - Clamp-and-pack bit fields                 │
//! │  ├── observable.rs - Diffed, debounced stat containers       │
//! │  └── scheduler.rs  - Host timer boundary, manual clock       │
//! │                                                              │
//! │  stats/          - Stat records                              │
//! │  ├── state.rs    - Ult / Dps / Hps records                   │
//! │  ├── sets.rs     - Activated-set catalog                     │
//! │  └── compute.rs  - Local stat derivation                     │
//! │                                                              │
//! │  network/        - Wire side                                 │
//! │  ├── codec.rs    - Payload layouts                           │
//! │  ├── protocol.rs - Envelopes and revision check              │
//! │  └── broadcast.rs- When local stats are sent                 │
//! │                                                              │
//! │  roster/store.rs - Member identity and reconciliation        │
//! │  api/            - Events and read-only snapshots            │
//! │  context.rs      - Owns and drives everything                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Execution Model
//!
//! Everything runs on the host's single thread. Work happens only inside
//! [`StatsContext`] entry points: timer callbacks, host events, received
//! envelopes and consumer calls. There is no locking and no background task.
//!
//! Every encoded field is clamped to its range before packing, so encoding never
//! fails and every same-width integer decodes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod context;
pub mod core;
pub mod network;
pub mod roster;
pub mod stats;

// Re-export commonly used types
pub use api::{EventName, MemberSnapshot, StatEvent, StatPayload, StatsView, SubscriptionId};
pub use config::StatsConfig;
pub use context::{HostEvent, HostServices, StatsContext, StatsError};
pub use crate::core::scheduler::{ManualScheduler, Scheduler, TimerAction};
pub use network::{Envelope, MessageKind, StatCategory, PROTOCOL_REVISION};
pub use roster::{GroupSource, GroupUnit, MemberKey, UnitTag};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
