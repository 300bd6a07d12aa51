//! RESP wire codec.
//!
//! Decoding is streaming: every parse entry point scans a borrowed buffer and either
//! reports how many bytes one complete frame consumed or reports `Incomplete` without
//! consuming anything, so network ingress can retry after the next socket chunk.

use ember_common::error::{EmberError, EmberResult};

/// Protocol-decoded command representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Command name in canonical uppercase form.
    pub name: String,
    /// Raw argument payload.
    pub args: Vec<Vec<u8>>,
}

/// Streaming decode outcome for one client command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are required before one full frame can be decoded.
    Incomplete,
    /// One full command frame was decoded from the buffer head.
    Complete {
        /// Decoded command.
        command: ParsedCommand,
        /// Exact number of buffer bytes the frame occupied.
        consumed: usize,
    },
}

/// Streaming decode outcome for one `+...\r\n` simple-string reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineStatus {
    /// The terminator has not arrived yet.
    Incomplete,
    /// One full simple-string line was decoded from the buffer head.
    Complete {
        /// Line content without the leading `+` and trailing CRLF.
        line: String,
        /// Exact number of buffer bytes the line occupied.
        consumed: usize,
    },
}

/// Streaming decode outcome for one `$<len>\r\n<raw>` snapshot transfer blob.
///
/// Snapshot transfer framing deliberately has no trailing CRLF after the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobStatus {
    /// Header or payload bytes are still missing.
    Incomplete,
    /// One full blob was decoded from the buffer head.
    Complete {
        /// Raw payload bytes.
        payload: Vec<u8>,
        /// Exact number of buffer bytes header + payload occupied.
        consumed: usize,
    },
}

/// Tries to decode one command frame (`*<n>` array of bulk strings) from the buffer head.
///
/// Returns `ParseStatus::Incomplete` when the buffer ends before a declared length or
/// terminator is satisfied; in that case no bytes are considered consumed.
///
/// # Errors
///
/// Returns `EmberError::Protocol` when buffered bytes violate RESP command framing:
/// a non-array first byte, a malformed element count, a non-bulk element, or a bulk
/// payload not terminated by CRLF.
pub fn parse_next_command(buffer: &[u8]) -> EmberResult<ParseStatus> {
    if buffer.is_empty() {
        return Ok(ParseStatus::Incomplete);
    }
    if buffer[0] != b'*' {
        return Err(EmberError::Protocol(format!(
            "expected array frame marker '*', got byte 0x{:02x}",
            buffer[0]
        )));
    }
    let Some(count_line_end) = find_crlf(buffer, 1) else {
        return Ok(ParseStatus::Incomplete);
    };
    let element_count = parse_frame_number(&buffer[1..count_line_end], "array element count")?;

    let mut cursor = count_line_end + 2;
    // Allocation is bounded by bytes actually buffered, never by the declared count
    // alone; the smallest element wire form `$0\r\n\r\n` is six bytes.
    let buffered_element_bound = buffer.len().saturating_sub(cursor) / 6;
    let mut elements = Vec::with_capacity(element_count.min(buffered_element_bound));
    for _ in 0..element_count {
        if cursor >= buffer.len() {
            return Ok(ParseStatus::Incomplete);
        }
        if buffer[cursor] != b'$' {
            return Err(EmberError::Protocol(format!(
                "expected bulk string marker '$', got byte 0x{:02x}",
                buffer[cursor]
            )));
        }
        let Some(length_line_end) = find_crlf(buffer, cursor + 1) else {
            return Ok(ParseStatus::Incomplete);
        };
        let payload_len =
            parse_frame_number(&buffer[cursor + 1..length_line_end], "bulk string length")?;
        let payload_start = length_line_end + 2;
        let payload_end = payload_start.saturating_add(payload_len);
        if buffer.len() < payload_end.saturating_add(2) {
            return Ok(ParseStatus::Incomplete);
        }
        if buffer[payload_end..payload_end + 2] != *b"\r\n" {
            return Err(EmberError::Protocol(
                "bulk string payload must be terminated by CRLF".to_owned(),
            ));
        }
        elements.push(buffer[payload_start..payload_end].to_vec());
        cursor = payload_end + 2;
    }

    let mut elements = elements.into_iter();
    let Some(name_raw) = elements.next() else {
        return Err(EmberError::Protocol(
            "command array must carry at least one element".to_owned(),
        ));
    };
    let name = String::from_utf8_lossy(&name_raw).to_ascii_uppercase();
    Ok(ParseStatus::Complete {
        command: ParsedCommand {
            name,
            args: elements.collect(),
        },
        consumed: cursor,
    })
}

/// Tries to decode one simple-string reply from the buffer head.
///
/// # Errors
///
/// Returns `EmberError::Protocol` when the first buffered byte is not `+`. Error
/// replies (`-...`) from a peer therefore surface as protocol errors here, which is
/// exactly what replication negotiation needs.
pub fn parse_simple_line(buffer: &[u8]) -> EmberResult<LineStatus> {
    if buffer.is_empty() {
        return Ok(LineStatus::Incomplete);
    }
    if buffer[0] != b'+' {
        return Err(EmberError::Protocol(format!(
            "expected simple string marker '+', got byte 0x{:02x}",
            buffer[0]
        )));
    }
    let Some(line_end) = find_crlf(buffer, 1) else {
        return Ok(LineStatus::Incomplete);
    };
    Ok(LineStatus::Complete {
        line: String::from_utf8_lossy(&buffer[1..line_end]).into_owned(),
        consumed: line_end + 2,
    })
}

/// Tries to decode one snapshot transfer blob from the buffer head.
///
/// # Errors
///
/// Returns `EmberError::Protocol` when the first buffered byte is not `$` or the
/// declared length is malformed.
pub fn parse_snapshot_blob(buffer: &[u8]) -> EmberResult<BlobStatus> {
    if buffer.is_empty() {
        return Ok(BlobStatus::Incomplete);
    }
    if buffer[0] != b'$' {
        return Err(EmberError::Protocol(format!(
            "expected snapshot length marker '$', got byte 0x{:02x}",
            buffer[0]
        )));
    }
    let Some(length_line_end) = find_crlf(buffer, 1) else {
        return Ok(BlobStatus::Incomplete);
    };
    let payload_len = parse_frame_number(&buffer[1..length_line_end], "snapshot length")?;
    let payload_start = length_line_end + 2;
    let payload_end = payload_start.saturating_add(payload_len);
    if buffer.len() < payload_end {
        return Ok(BlobStatus::Incomplete);
    }
    Ok(BlobStatus::Complete {
        payload: buffer[payload_start..payload_end].to_vec(),
        consumed: payload_end,
    })
}

/// Encodes `+text\r\n`.
#[must_use]
pub fn encode_simple_string(text: &str) -> Vec<u8> {
    let mut output = Vec::with_capacity(text.len() + 3);
    output.push(b'+');
    output.extend_from_slice(text.as_bytes());
    output.extend_from_slice(b"\r\n");
    output
}

/// Encodes `$<len>\r\n<bytes>\r\n`, or the nil bulk string `$-1\r\n` for `None`.
#[must_use]
pub fn encode_bulk_string(payload: Option<&[u8]>) -> Vec<u8> {
    let Some(payload) = payload else {
        return b"$-1\r\n".to_vec();
    };
    let mut output = format!("${}\r\n", payload.len()).into_bytes();
    output.extend_from_slice(payload);
    output.extend_from_slice(b"\r\n");
    output
}

/// Encodes an outbound command frame: a RESP array of bulk strings.
#[must_use]
pub fn encode_command_frame(parts: &[&[u8]]) -> Vec<u8> {
    let mut output = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        output.extend_from_slice(&encode_bulk_string(Some(part)));
    }
    output
}

/// Encodes a RESP array of bulk strings from owned parts.
#[must_use]
pub fn encode_array(parts: &[Vec<u8>]) -> Vec<u8> {
    let borrowed = parts.iter().map(Vec::as_slice).collect::<Vec<_>>();
    encode_command_frame(&borrowed)
}

/// Encodes an inline reply list: one part renders as a simple string, any other
/// count renders as an array of bulk strings.
///
/// This asymmetry is how inline command echoes (for example `REPLCONF ACK <n>`)
/// are rendered on the wire.
#[must_use]
pub fn encode_output_list(parts: &[Vec<u8>]) -> Vec<u8> {
    if let [only] = parts {
        return encode_simple_string(&String::from_utf8_lossy(only));
    }
    encode_array(parts)
}

/// Encodes the snapshot transfer framing `$<len>\r\n<payload>` without trailing CRLF.
#[must_use]
pub fn encode_snapshot_blob(payload: &[u8]) -> Vec<u8> {
    let mut output = format!("${}\r\n", payload.len()).into_bytes();
    output.extend_from_slice(payload);
    output
}

fn find_crlf(buffer: &[u8], from: usize) -> Option<usize> {
    if from >= buffer.len() {
        return None;
    }
    buffer[from..]
        .windows(2)
        .position(|window| window == b"\r\n")
        .map(|relative| from + relative)
}

fn parse_frame_number(digits: &[u8], what: &str) -> EmberResult<usize> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(EmberError::Protocol(format!(
            "{what} must be a non-negative integer"
        )));
    }
    let text = std::str::from_utf8(digits)
        .map_err(|_| EmberError::Protocol(format!("{what} must be ASCII digits")))?;
    text.parse::<usize>()
        .map_err(|_| EmberError::Protocol(format!("{what} is out of range")))
}
