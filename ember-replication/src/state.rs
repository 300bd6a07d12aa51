//! Replication identity and offset tracking.

use rand::RngCore;

/// Redis-compatible replication id length in hex characters.
pub const MASTER_REPLID_HEX_LEN: usize = 40;

/// Role one instance advertises to clients and replication peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationRole {
    /// Accepts writes and streams them to attached replicas.
    Master,
    /// Follows one primary and applies its replicated stream.
    Replica,
}

impl ReplicationRole {
    /// Returns the `INFO replication` wire label for this role.
    #[must_use]
    pub const fn as_info_label(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Replica => "slave",
        }
    }
}

/// Mutable replication state for one server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationState {
    /// Role this instance advertises in `INFO replication`.
    pub role: ReplicationRole,
    /// 40-hex replication id generated once at startup.
    pub master_replid: String,
    /// Bytes of write traffic this instance has handed to its replicas.
    pub replication_offset: u64,
    /// Bytes of the primary's command stream this replica has fully processed.
    ///
    /// Stays zero on a primary; independent from `replication_offset`, which is
    /// what `INFO replication` reports on both roles.
    pub processed_stream_bytes: u64,
    /// Replica connections currently attached to this instance.
    pub connected_replicas: usize,
}

impl ReplicationState {
    /// Creates primary-side replication state with a fresh replid.
    #[must_use]
    pub fn new_master() -> Self {
        Self::with_role(ReplicationRole::Master)
    }

    /// Creates replica-side replication state with a fresh replid.
    #[must_use]
    pub fn new_replica() -> Self {
        Self::with_role(ReplicationRole::Replica)
    }

    fn with_role(role: ReplicationRole) -> Self {
        Self {
            role,
            master_replid: generate_master_replid(),
            replication_offset: 0,
            processed_stream_bytes: 0,
            connected_replicas: 0,
        }
    }

    /// Returns `true` when this instance follows a primary.
    #[must_use]
    pub fn is_replica(&self) -> bool {
        self.role == ReplicationRole::Replica
    }

    /// Advances the propagated-write offset after fanning one frame out.
    pub fn note_propagated_bytes(&mut self, byte_count: u64) {
        self.replication_offset = self.replication_offset.saturating_add(byte_count);
    }

    /// Advances the processed-stream cursor by one replicated frame's wire length.
    pub fn note_stream_bytes(&mut self, byte_count: u64) {
        self.processed_stream_bytes = self.processed_stream_bytes.saturating_add(byte_count);
    }

    /// Records one replica connection attaching.
    pub fn note_replica_attached(&mut self) {
        self.connected_replicas = self.connected_replicas.saturating_add(1);
    }

    /// Records one replica connection going away.
    pub fn note_replica_detached(&mut self) {
        self.connected_replicas = self.connected_replicas.saturating_sub(1);
    }
}

fn generate_master_replid() -> String {
    let mut seed = [0_u8; MASTER_REPLID_HEX_LEN / 2];
    rand::thread_rng().fill_bytes(&mut seed);
    hex::encode(seed)
}
