//! Canonical command frame types.

/// Command payload representation used between protocol parsing and dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Command name in uppercase canonical form (e.g. `SET`, `REPLCONF`).
    pub name: String,
    /// Raw byte arguments preserving wire-level payload.
    pub args: Vec<Vec<u8>>,
}

impl CommandFrame {
    /// Creates a command frame from a command name and argument list.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Canonical command reply representation.
///
/// The reply enum is kept wire-neutral. Encoding to RESP happens right before socket
/// writeback, so dispatch logic stays independent from framing details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// `+OK` style replies.
    SimpleString(String),
    /// `$<len> ...` style binary-safe payload.
    BulkString(Vec<u8>),
    /// RESP null bulk string (`$-1`).
    Null,
    /// Inline reply list: one part renders as a simple string, several parts render
    /// as an array of bulk strings (`ECHO` echoes and `REPLCONF ACK` use this).
    OutputList(Vec<Vec<u8>>),
    /// `-ERR ...` style error.
    Error(String),
}

impl CommandReply {
    /// Encodes the reply into RESP bytes for Redis-compatible clients.
    #[must_use]
    pub fn to_resp_bytes(&self) -> Vec<u8> {
        match self {
            Self::SimpleString(value) => {
                let mut output = Vec::with_capacity(value.len() + 3);
                output.extend_from_slice(b"+");
                output.extend_from_slice(value.as_bytes());
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::BulkString(value) => {
                let mut output = format!("${}\r\n", value.len()).into_bytes();
                output.extend_from_slice(value);
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::Null => b"$-1\r\n".to_vec(),
            Self::OutputList(parts) => {
                if let [only] = parts.as_slice() {
                    return Self::SimpleString(String::from_utf8_lossy(only).into_owned())
                        .to_resp_bytes();
                }
                let mut output = format!("*{}\r\n", parts.len()).into_bytes();
                for part in parts {
                    output.extend_from_slice(&Self::BulkString(part.clone()).to_resp_bytes());
                }
                output
            }
            Self::Error(message) => {
                let mut output = Vec::with_capacity(message.len() + 7);
                output.extend_from_slice(b"-ERR ");
                output.extend_from_slice(message.as_bytes());
                output.extend_from_slice(b"\r\n");
                output
            }
        }
    }
}
