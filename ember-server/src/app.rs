//! Process composition root for `ember-server`.

mod bootstrap;
mod replication_wire;

use ember_common::config::RuntimeConfig;
use ember_common::error::EmberResult;
use ember_core::command::{CommandFrame, CommandReply};
use ember_core::dispatch::CommandRegistry;
use ember_core::keyspace::Keyspace;
use ember_protocol::connection::ConnectionState;
use ember_replication::state::ReplicationState;
use tracing::debug;

/// Process composition for one server instance.
#[derive(Debug)]
pub(crate) struct ServerApp {
    /// Runtime configuration.
    pub(crate) config: RuntimeConfig,
    /// Command table for data-path commands.
    pub(crate) registry: CommandRegistry,
    /// Key/value state shared by client dispatch and replicated apply.
    pub(crate) keyspace: Keyspace,
    /// Replication identity and offset accounting.
    pub(crate) replication: ReplicationState,
}

/// Logical per-connection state tracked independently from socket ownership.
#[derive(Debug, Default)]
pub(crate) struct ServerConnection {
    /// Streaming protocol parser state.
    pub(crate) parser: ConnectionState,
}

impl ServerConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// Connection-level outcome of executing one client command.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CommandExecution {
    /// Encoded reply buffers to write back on the issuing connection, in order.
    pub(crate) replies: Vec<Vec<u8>>,
    /// The issuing connection asked to become a replica fan-out target.
    pub(crate) register_replica: bool,
    /// The command's original wire bytes must be streamed to registered replicas.
    pub(crate) propagate: bool,
}

impl CommandExecution {
    fn reply(encoded: Vec<u8>) -> Self {
        Self {
            replies: vec![encoded],
            ..Self::default()
        }
    }
}

impl ServerApp {
    /// Creates a process composition from runtime config.
    #[must_use]
    pub(crate) fn new(config: RuntimeConfig) -> Self {
        let replication = if config.is_replica() {
            ReplicationState::new_replica()
        } else {
            ReplicationState::new_master()
        };
        Self {
            config,
            registry: CommandRegistry::with_builtin_commands(),
            keyspace: Keyspace::new(),
            replication,
        }
    }

    /// Executes one client command and reports its connection-level side effects.
    ///
    /// Replication-plane verbs (`REPLCONF`, `PSYNC`, `INFO`) are handled here at
    /// the app layer; data-path verbs go through the command registry. Anything
    /// unrecognized is acknowledged with `+OK` so typos and commands from newer
    /// clients do not drop the connection.
    pub(crate) fn execute_client_command(&mut self, frame: &CommandFrame) -> CommandExecution {
        match frame.name.as_str() {
            "REPLCONF" => self.execute_replconf(frame),
            "PSYNC" => self.execute_psync(frame),
            "INFO" => self.execute_info(frame),
            name if self.registry.contains(name) => self.execute_data_command(frame),
            _ => {
                debug!(command = %frame.name, "acknowledging unrecognized command");
                CommandExecution::reply(CommandReply::SimpleString("OK".to_owned()).to_resp_bytes())
            }
        }
    }

    /// Runs one data-path command. Successful writes are flagged for replica
    /// fan-out on the primary role only; a replica applies direct client writes
    /// locally without advancing its propagated-write offset.
    fn execute_data_command(&mut self, frame: &CommandFrame) -> CommandExecution {
        let reply = self.registry.dispatch(frame, &mut self.keyspace);
        let propagate = self.registry.propagates_writes(&frame.name)
            && !self.replication.is_replica()
            && !matches!(reply, CommandReply::Error(_));
        CommandExecution {
            replies: vec![reply.to_resp_bytes()],
            register_replica: false,
            propagate,
        }
    }

    /// Applies one frame received on the replication stream from the primary.
    ///
    /// The frame's wire length is counted before dispatch, so a `REPLCONF GETACK`
    /// acknowledges an offset that already includes the GETACK frame itself.
    /// Replicated commands are applied silently; only GETACK produces bytes to
    /// send back upstream.
    pub(crate) fn execute_replicated_command(
        &mut self,
        frame: &CommandFrame,
        wire_len: usize,
    ) -> Option<Vec<u8>> {
        self.replication
            .note_stream_bytes(u64::try_from(wire_len).unwrap_or(u64::MAX));

        if frame.name == "REPLCONF" {
            let wants_ack = frame
                .args
                .first()
                .is_some_and(|arg| arg.eq_ignore_ascii_case(b"GETACK"));
            if !wants_ack {
                return None;
            }
            let offset_text = self.replication.processed_stream_bytes.to_string();
            let ack = CommandReply::OutputList(vec![
                b"REPLCONF".to_vec(),
                b"ACK".to_vec(),
                offset_text.into_bytes(),
            ]);
            return Some(ack.to_resp_bytes());
        }

        if self.registry.contains(&frame.name) {
            // Replicas apply the stream without answering; the reply is dropped, not lost.
            let _ = self.registry.dispatch(frame, &mut self.keyspace);
        }
        None
    }
}

/// Builds the app, binds the reactor, and serves until a fatal error.
///
/// # Errors
///
/// Returns setup failures (bind, primary resolution) and fatal replication
/// negotiation errors.
pub(crate) fn run(config: RuntimeConfig) -> EmberResult<()> {
    bootstrap::run_server(config)
}
