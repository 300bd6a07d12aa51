//! Replica-side handshake and stream-apply state machine.
//!
//! The machine is transport-free: the network layer feeds it raw bytes read from
//! the primary connection and performs the actions it returns. Negotiation replies
//! must arrive in the expected order; any deviation before streaming starts is
//! fatal for the replication link. Once streaming, malformed bytes are skipped up
//! to the next frame marker so one corrupt frame cannot wedge the link.

use ember_common::error::{EmberError, EmberResult};
use ember_protocol::resp::{
    BlobStatus, LineStatus, ParseStatus, ParsedCommand, encode_command_frame, parse_next_command,
    parse_simple_line, parse_snapshot_blob,
};
use tracing::{debug, warn};

/// Progress stages of the replica-side handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    /// Greeting `PING` sent, waiting for `+PONG`.
    AwaitPong,
    /// `REPLCONF listening-port` sent, waiting for `+OK`.
    AwaitPortAck,
    /// `REPLCONF capa psync2` sent, waiting for `+OK`.
    AwaitCapaAck,
    /// `PSYNC ? -1` sent, waiting for `+FULLRESYNC <replid> <offset>`.
    AwaitFullResync,
    /// Waiting for the snapshot transfer blob.
    AwaitSnapshot,
    /// Snapshot consumed; every further frame is a replicated command.
    Streaming,
}

/// One side effect requested by the handshake machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Bytes to write to the primary connection.
    SendToPrimary(Vec<u8>),
    /// One replicated command to apply locally, with its exact wire length.
    ApplyCommand {
        /// Decoded replicated command.
        frame: ParsedCommand,
        /// Bytes the frame occupied on the replication stream.
        wire_len: usize,
    },
}

/// Replica-side handshake driver for one primary connection.
#[derive(Debug)]
pub struct ReplicaHandshake {
    stage: HandshakeStage,
    listening_port: u16,
    buffer: Vec<u8>,
}

impl ReplicaHandshake {
    /// Creates a handshake machine announcing `listening_port` to the primary.
    #[must_use]
    pub fn new(listening_port: u16) -> Self {
        Self {
            stage: HandshakeStage::AwaitPong,
            listening_port,
            buffer: Vec::new(),
        }
    }

    /// Current negotiation stage.
    #[must_use]
    pub fn stage(&self) -> HandshakeStage {
        self.stage
    }

    /// Returns `true` once negotiation and snapshot transfer have finished.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stage == HandshakeStage::Streaming
    }

    /// The greeting frame the replica writes as soon as the connection opens.
    #[must_use]
    pub fn greeting_frame() -> Vec<u8> {
        encode_command_frame(&[b"PING"])
    }

    /// Feeds bytes read from the primary and returns the resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `EmberError::Handshake` when a negotiation-stage reply is missing,
    /// malformed, or not the expected answer. Streaming-stage input never fails.
    pub fn on_primary_bytes(&mut self, chunk: &[u8]) -> EmberResult<Vec<HandshakeAction>> {
        self.buffer.extend_from_slice(chunk);
        let mut actions = Vec::new();

        loop {
            match self.stage {
                HandshakeStage::AwaitPong => {
                    let Some(line) = self.take_negotiation_line()? else {
                        break;
                    };
                    self.expect_reply(&line, "PONG")?;
                    let port_text = self.listening_port.to_string();
                    actions.push(HandshakeAction::SendToPrimary(encode_command_frame(&[
                        b"REPLCONF",
                        b"listening-port",
                        port_text.as_bytes(),
                    ])));
                    self.stage = HandshakeStage::AwaitPortAck;
                }
                HandshakeStage::AwaitPortAck => {
                    let Some(line) = self.take_negotiation_line()? else {
                        break;
                    };
                    self.expect_reply(&line, "OK")?;
                    actions.push(HandshakeAction::SendToPrimary(encode_command_frame(&[
                        b"REPLCONF",
                        b"capa",
                        b"psync2",
                    ])));
                    self.stage = HandshakeStage::AwaitCapaAck;
                }
                HandshakeStage::AwaitCapaAck => {
                    let Some(line) = self.take_negotiation_line()? else {
                        break;
                    };
                    self.expect_reply(&line, "OK")?;
                    actions.push(HandshakeAction::SendToPrimary(encode_command_frame(&[
                        b"PSYNC",
                        b"?",
                        b"-1",
                    ])));
                    self.stage = HandshakeStage::AwaitFullResync;
                }
                HandshakeStage::AwaitFullResync => {
                    let Some(line) = self.take_negotiation_line()? else {
                        break;
                    };
                    let mut tokens = line.split_whitespace();
                    let (Some("FULLRESYNC"), Some(replid), Some(offset), None) =
                        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
                    else {
                        return Err(EmberError::Handshake(format!(
                            "expected FULLRESYNC reply, primary sent '{line}'"
                        )));
                    };
                    debug!(replid, offset, "full resync granted");
                    self.stage = HandshakeStage::AwaitSnapshot;
                }
                HandshakeStage::AwaitSnapshot => {
                    let status = parse_snapshot_blob(&self.buffer).map_err(|error| {
                        EmberError::Handshake(format!("snapshot transfer failed: {error}"))
                    })?;
                    let BlobStatus::Complete { payload, consumed } = status else {
                        break;
                    };
                    self.buffer.drain(..consumed);
                    debug!(snapshot_bytes = payload.len(), "snapshot received, streaming");
                    self.stage = HandshakeStage::Streaming;
                }
                HandshakeStage::Streaming => match parse_next_command(&self.buffer) {
                    Ok(ParseStatus::Complete { command, consumed }) => {
                        self.buffer.drain(..consumed);
                        actions.push(HandshakeAction::ApplyCommand {
                            frame: command,
                            wire_len: consumed,
                        });
                    }
                    Ok(ParseStatus::Incomplete) => break,
                    Err(error) => {
                        warn!(%error, "skipping malformed bytes on replication stream");
                        self.skip_to_next_frame();
                    }
                },
            }
        }

        Ok(actions)
    }

    fn take_negotiation_line(&mut self) -> EmberResult<Option<String>> {
        let status = parse_simple_line(&self.buffer).map_err(|error| {
            EmberError::Handshake(format!("negotiation reply was malformed: {error}"))
        })?;
        let LineStatus::Complete { line, consumed } = status else {
            return Ok(None);
        };
        self.buffer.drain(..consumed);
        Ok(Some(line))
    }

    fn expect_reply(&self, line: &str, expected: &str) -> EmberResult<()> {
        if line == expected {
            return Ok(());
        }
        Err(EmberError::Handshake(format!(
            "expected {expected} at stage {:?}, primary sent '{line}'",
            self.stage
        )))
    }

    /// Drops buffered bytes up to the next `*` frame marker.
    ///
    /// Skipped bytes never reach dispatch and never count as processed stream
    /// input, so offset accounting stays aligned with applied frames.
    fn skip_to_next_frame(&mut self) {
        match self.buffer.iter().skip(1).position(|&byte| byte == b'*') {
            Some(relative) => {
                self.buffer.drain(..=relative);
            }
            None => self.buffer.clear(),
        }
    }
}
