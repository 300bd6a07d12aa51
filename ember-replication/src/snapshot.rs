//! Canonical empty snapshot payload served during full resync.

use once_cell::sync::Lazy;

/// Hex encoding of an empty RDB-format snapshot, byte-for-byte the payload a fresh
/// primary transfers after `FULLRESYNC`.
const EMPTY_SNAPSHOT_HEX: &str = "524544495330303131fa0972656469732d76657205372e322e30fa0a72656469732d62697473c040fa056374696d65c26d08bc65fa08757365642d6d656dc2b0c41000fa08616f662d62617365c000fff06e3bfec0ff5aa2";

static EMPTY_SNAPSHOT_PAYLOAD: Lazy<Vec<u8>> =
    Lazy::new(|| hex::decode(EMPTY_SNAPSHOT_HEX).expect("snapshot hex literal should decode"));

/// Returns the canonical empty snapshot payload.
#[must_use]
pub fn empty_snapshot_payload() -> &'static [u8] {
    &EMPTY_SNAPSHOT_PAYLOAD
}

#[cfg(test)]
mod tests {
    use super::empty_snapshot_payload;
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn payload_is_the_88_byte_rdb_preamble() {
        let payload = empty_snapshot_payload();

        assert_that!(payload.len(), eq(88));
        assert_that!(&payload[..9], eq(b"REDIS0011"));
    }
}
