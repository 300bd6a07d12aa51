//! Connection-scoped streaming parser state.

use ember_common::error::EmberResult;

use crate::resp::{ParseStatus, ParsedCommand, parse_next_command};

/// Per-socket state used while reading client bytes.
///
/// A connection parser keeps unread bytes in a buffer and repeatedly tries to extract
/// complete commands as new network chunks arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// Bytes received but not yet consumed by command parsing.
    read_buffer: Vec<u8>,
}

impl ConnectionState {
    /// Creates a parser state object for one client connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly received network bytes into the connection buffer.
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        self.read_buffer.extend_from_slice(bytes);
    }

    /// Tries to decode one command from buffered bytes.
    ///
    /// Returns `Ok(None)` when more bytes are required.
    ///
    /// # Errors
    ///
    /// Returns `EmberError::Protocol` when buffered bytes violate RESP framing rules.
    pub fn try_pop_command(&mut self) -> EmberResult<Option<ParsedCommand>> {
        Ok(self
            .try_pop_command_with_wire()?
            .map(|(command, _wire)| command))
    }

    /// Tries to decode one command from buffered bytes, also returning the exact wire
    /// bytes the frame occupied.
    ///
    /// Write propagation forwards these original bytes verbatim instead of re-encoding
    /// the parsed command.
    ///
    /// # Errors
    ///
    /// Returns `EmberError::Protocol` when buffered bytes violate RESP framing rules.
    pub fn try_pop_command_with_wire(&mut self) -> EmberResult<Option<(ParsedCommand, Vec<u8>)>> {
        match parse_next_command(&self.read_buffer)? {
            ParseStatus::Incomplete => Ok(None),
            ParseStatus::Complete { command, consumed } => {
                let wire = self.read_buffer.drain(..consumed).collect::<Vec<u8>>();
                Ok(Some((command, wire)))
            }
        }
    }

    /// Returns the number of pending bytes still waiting to be parsed.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.read_buffer.len()
    }
}
