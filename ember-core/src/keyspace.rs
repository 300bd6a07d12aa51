//! Mutable key/value state with millisecond expiry.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;

/// One stored value plus its optional absolute expiry deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredEntry {
    value: Vec<u8>,
    expire_at_unix_millis: Option<u64>,
}

/// In-memory keyspace shared by client dispatch and replicated command apply.
///
/// Expiry is lazy: a key past its deadline stays in the map until the next read
/// observes the deadline and removes it.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HashMap<Vec<u8>, StoredEntry>,
}

impl Keyspace {
    /// Creates an empty keyspace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// With `ttl` set, the entry expires `ttl` after now; a zero `ttl` produces an
    /// entry that is already expired for every subsequent read.
    pub fn upsert(&mut self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) {
        let expire_at_unix_millis = ttl.map(|ttl| {
            let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            Self::now_unix_millis().saturating_add(ttl_millis)
        });
        self.entries.insert(
            key,
            StoredEntry {
                value,
                expire_at_unix_millis,
            },
        );
    }

    /// Returns the live value for `key`, removing the entry first when its
    /// deadline has passed.
    pub fn fetch(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let entry = self.entries.get(key)?;
        if let Some(deadline) = entry.expire_at_unix_millis {
            if Self::now_unix_millis() >= deadline {
                self.entries.remove(key);
                return None;
            }
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Number of entries currently held, including not-yet-collected expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Milliseconds since the Unix epoch for expiry deadline arithmetic.
    #[must_use]
    pub fn now_unix_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::Keyspace;
    use googletest::prelude::*;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn fetch_returns_stored_value_without_ttl() {
        let mut keyspace = Keyspace::new();
        keyspace.upsert(b"fruit".to_vec(), b"mango".to_vec(), None);

        assert_that!(keyspace.fetch(b"fruit"), some(eq(&b"mango"[..])));
        assert_that!(keyspace.fetch(b"missing"), none());
    }

    #[rstest]
    fn upsert_replaces_previous_value_and_ttl() {
        let mut keyspace = Keyspace::new();
        keyspace.upsert(b"fruit".to_vec(), b"mango".to_vec(), Some(Duration::ZERO));
        keyspace.upsert(b"fruit".to_vec(), b"papaya".to_vec(), None);

        assert_that!(keyspace.fetch(b"fruit"), some(eq(&b"papaya"[..])));
    }

    #[rstest]
    fn zero_ttl_entry_is_expired_for_the_next_read() {
        let mut keyspace = Keyspace::new();
        keyspace.upsert(b"token".to_vec(), b"abc".to_vec(), Some(Duration::ZERO));

        assert_that!(keyspace.len(), eq(1));
        assert_that!(keyspace.fetch(b"token"), none());
        assert_that!(keyspace.len(), eq(0));
    }

    #[rstest]
    fn generous_ttl_keeps_entry_readable() {
        let mut keyspace = Keyspace::new();
        keyspace.upsert(
            b"session".to_vec(),
            b"open".to_vec(),
            Some(Duration::from_secs(3600)),
        );

        assert_that!(keyspace.fetch(b"session"), some(eq(&b"open"[..])));
        assert_that!(keyspace.is_empty(), eq(false));
    }
}
