//! Core execution model shared by server and replication layers: canonical command
//! frames and replies, registry-based dispatch, and the TTL keyspace.

pub mod command;
pub mod dispatch;
pub mod keyspace;
