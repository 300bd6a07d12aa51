use super::{CommandExecution, ServerApp};
use ember_core::command::{CommandFrame, CommandReply};
use ember_protocol::resp::{encode_simple_string, encode_snapshot_blob};
use ember_replication::snapshot::empty_snapshot_payload;
use tracing::{debug, info};

impl ServerApp {
    /// `REPLCONF listening-port <port>` marks the issuing connection as a replica
    /// fan-out target. Only a primary registers fan-out targets; on a replica the
    /// subcommand is acknowledged without effect, like every other subcommand.
    pub(super) fn execute_replconf(&mut self, frame: &CommandFrame) -> CommandExecution {
        let announces_port = frame
            .args
            .first()
            .is_some_and(|arg| arg.eq_ignore_ascii_case(b"listening-port"));
        if announces_port && !self.replication.is_replica() {
            debug!("replica announced its listening port");
            return CommandExecution {
                replies: vec![encode_simple_string("OK")],
                register_replica: true,
                propagate: false,
            };
        }
        CommandExecution::reply(encode_simple_string("OK"))
    }

    /// `PSYNC ? -1` answers with the full-resync header and the snapshot blob in
    /// one transfer. Any other argument shape is acknowledged like an unknown
    /// command; partial resync is not supported.
    pub(super) fn execute_psync(&mut self, frame: &CommandFrame) -> CommandExecution {
        let initial_sync =
            frame.args.len() == 2 && frame.args[0] == b"?" && frame.args[1] == b"-1";
        if !initial_sync {
            debug!("acknowledging non-initial PSYNC request");
            return CommandExecution::reply(encode_simple_string("OK"));
        }

        let header = format!(
            "FULLRESYNC {} {}",
            self.replication.master_replid, self.replication.replication_offset
        );
        info!("serving full resync to a replica");
        CommandExecution {
            replies: vec![
                encode_simple_string(&header),
                encode_snapshot_blob(empty_snapshot_payload()),
            ],
            register_replica: false,
            propagate: false,
        }
    }

    /// `INFO REPLICATION` renders the replication block, the only section this
    /// server maintains. Any other section, or none, is acknowledged with `+OK`.
    pub(super) fn execute_info(&self, frame: &CommandFrame) -> CommandExecution {
        use std::fmt::Write as _;

        let replication_section = frame
            .args
            .first()
            .is_some_and(|section| section.eq_ignore_ascii_case(b"REPLICATION"));
        if !replication_section {
            return CommandExecution::reply(encode_simple_string("OK"));
        }

        let mut info = String::new();
        write!(
            info,
            "# Replication\r\nrole:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}\r\n",
            self.replication.role.as_info_label(),
            self.replication.master_replid,
            self.replication.replication_offset,
        )
        .expect("writing to String should not fail");
        CommandExecution::reply(CommandReply::BulkString(info.into_bytes()).to_resp_bytes())
    }
}
