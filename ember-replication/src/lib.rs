//! Replication layer: instance identity and offset tracking, the canonical empty
//! snapshot payload, and the replica-side handshake state machine.

pub mod handshake;
pub mod snapshot;
pub mod state;
