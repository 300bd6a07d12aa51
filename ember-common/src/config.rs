//! Runtime configuration shared by server bootstrap code.

use crate::error::{EmberError, EmberResult};

/// Default RESP listener port when no `--port` flag is given.
pub const DEFAULT_PORT: u16 = 6379;

/// Address of the primary instance a replica synchronizes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAddr {
    /// Primary hostname or IP literal.
    pub host: String,
    /// Primary RESP port.
    pub port: u16,
}

impl UpstreamAddr {
    /// Parses the `--replicaof "<host> <port>"` flag value.
    ///
    /// # Errors
    ///
    /// Returns `EmberError::InvalidConfig` when the value is not exactly one host
    /// token followed by one valid port token.
    pub fn parse(raw: &str) -> EmberResult<Self> {
        let mut parts = raw.split_whitespace();
        let (Some(host), Some(port_text), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(EmberError::InvalidConfig(
                "replicaof must be one '<host> <port>' pair",
            ));
        };
        let Ok(port) = port_text.parse::<u16>() else {
            return Err(EmberError::InvalidConfig(
                "replicaof port must be an integer in 1..=65535",
            ));
        };
        if port == 0 {
            return Err(EmberError::InvalidConfig(
                "replicaof port must be an integer in 1..=65535",
            ));
        }
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

/// Bootstrap configuration used by `ember-server` during process startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Main RESP listener port.
    pub port: u16,
    /// Primary to replicate from. `None` makes this instance a primary.
    pub replica_of: Option<UpstreamAddr>,
}

impl RuntimeConfig {
    /// Returns whether this process starts in replica mode.
    #[must_use]
    pub fn is_replica(&self) -> bool {
        self.replica_of.is_some()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            replica_of: None,
        }
    }
}
