//! Shared connection ingress for the reactor loop and integration-style unit tests.

use crate::app::{CommandExecution, ServerApp, ServerConnection};
use ember_common::error::EmberResult;
use ember_core::command::CommandFrame;

/// Everything one ingress pass produced: encoded replies for the issuing
/// connection, original wire frames to stream to registered replicas, and
/// whether the connection asked to become a fan-out target.
#[derive(Debug, Default)]
pub(crate) struct IngressOutcome {
    pub(crate) responses: Vec<Vec<u8>>,
    pub(crate) propagate_frames: Vec<Vec<u8>>,
    pub(crate) register_replica: bool,
}

/// Feeds raw bytes into one logical connection and executes every command that
/// became complete, preserving arrival order.
///
/// Propagated writes carry the exact bytes the client sent, not a re-encoding,
/// so replica-side offset accounting matches the primary's byte for byte.
///
/// # Errors
///
/// Returns a protocol error when buffered bytes violate RESP framing; the
/// caller is expected to fail the connection.
pub(crate) fn ingress_connection_bytes(
    app: &mut ServerApp,
    connection: &mut ServerConnection,
    bytes: &[u8],
) -> EmberResult<IngressOutcome> {
    connection.parser.feed_bytes(bytes);
    let mut outcome = IngressOutcome::default();

    loop {
        let Some((parsed, wire_bytes)) = connection.parser.try_pop_command_with_wire()? else {
            break;
        };
        let frame = CommandFrame::new(parsed.name, parsed.args);
        let CommandExecution {
            replies,
            register_replica,
            propagate,
        } = app.execute_client_command(&frame);

        outcome.responses.extend(replies);
        outcome.register_replica |= register_replica;
        if propagate {
            app.replication
                .note_propagated_bytes(u64::try_from(wire_bytes.len()).unwrap_or(u64::MAX));
            outcome.propagate_frames.push(wire_bytes);
        }
    }

    Ok(outcome)
}
