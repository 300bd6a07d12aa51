//! RESP protocol layer: wire codec plus connection-scoped streaming parser state.

pub mod connection;
pub mod resp;
