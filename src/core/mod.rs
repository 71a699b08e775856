//! Core primitives.
//!
//! Bit packing, debounced containers and the host scheduler boundary. Nothing in
//! here knows about group members or message kinds beyond timer routing.

pub mod bits;
pub mod observable;
pub mod scheduler;

// Re-export core types
pub use bits::{clamp, max_for_width, BitPacker, BitUnpacker, Field};
pub use observable::{ContainerId, Fields, Observable, Snapshot};
pub use scheduler::{ManualScheduler, Scheduler, TimerAction, TimerKey};
