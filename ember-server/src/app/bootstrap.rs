use std::net::{SocketAddr, ToSocketAddrs};

use super::ServerApp;
use crate::network::{ServerReactor, ServerReactorConfig};
use ember_common::config::{RuntimeConfig, UpstreamAddr};
use ember_common::error::{EmberError, EmberResult};
use tracing::info;

pub(super) fn run_server(config: RuntimeConfig) -> EmberResult<()> {
    let bind_addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let mut reactor = ServerReactor::bind(bind_addr, ServerReactorConfig::default())?;
    let mut app = ServerApp::new(config);

    if let Some(upstream) = app.config.replica_of.clone() {
        let primary_addr = resolve_upstream_addr(&upstream)?;
        reactor.connect_upstream(primary_addr, app.config.port)?;
        info!(primary = %primary_addr, "replicating from primary");
    }

    info!(
        port = app.config.port,
        role = app.replication.role.as_info_label(),
        replid = %app.replication.master_replid,
        "server listening"
    );

    loop {
        let _ = reactor.poll_once(&mut app, None)?;
    }
}

fn resolve_upstream_addr(upstream: &UpstreamAddr) -> EmberResult<SocketAddr> {
    let mut candidates = (upstream.host.as_str(), upstream.port)
        .to_socket_addrs()
        .map_err(|error| EmberError::Io(format!("resolve primary address failed: {error}")))?;
    candidates
        .next()
        .ok_or(EmberError::InvalidConfig("primary host resolved to no addresses"))
}
