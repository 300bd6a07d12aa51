//! Binary entrypoint for `ember-server`.

mod app;
mod ingress;
mod network;

use clap::Parser;
use ember_common::config::{DEFAULT_PORT, RuntimeConfig, UpstreamAddr};
use tracing_subscriber::EnvFilter;

/// RESP-compatible in-memory key-value store with primary/replica replication.
#[derive(Debug, Parser)]
#[command(name = "ember-server", version, about)]
struct ServerArgs {
    /// TCP port the server listens on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Run as a replica of the given primary, written as "<host> <port>".
    #[arg(long, value_name = "HOST PORT")]
    replicaof: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = ServerArgs::parse();
    let replica_of = match args.replicaof.as_deref().map(UpstreamAddr::parse).transpose() {
        Ok(upstream) => upstream,
        Err(error) => {
            eprintln!("invalid --replicaof value: {error}");
            std::process::exit(2);
        }
    };
    let config = RuntimeConfig {
        port: args.port,
        replica_of,
    };

    if let Err(error) = app::run(config) {
        eprintln!("failed to run ember-server: {error}");
        std::process::exit(1);
    }
}
