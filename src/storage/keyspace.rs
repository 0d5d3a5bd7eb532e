use std::collections::HashMap;

use parking_lot::RwLock;

use super::glob::glob_match;
use crate::CommandError;

/// In-memory keyspace. Reads share the lock, writes take it exclusively,
/// and every operation holds it only for the map access itself.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        key: &[u8],
    ) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(
        &self,
        key: &[u8],
        value: &[u8],
    ) {
        self.entries.write().insert(key.to_vec(), value.to_vec());
    }

    /// Removes each key, returning how many existed.
    pub fn delete<K: AsRef<[u8]>>(
        &self,
        keys: &[K],
    ) -> usize {
        let mut entries = self.entries.write();
        keys.iter().filter(|k| entries.remove(k.as_ref()).is_some()).count()
    }

    /// Adds `delta` to the integer stored at `key`. An absent key counts as 0.
    ///
    /// # Errors
    /// `CommandError::NotAnInteger` if the current value is not a base-10
    /// integer or the result overflows; the value is left unchanged.
    pub fn incr_by(
        &self,
        key: &[u8],
        delta: i64,
    ) -> Result<i64, CommandError> {
        let mut entries = self.entries.write();
        let current = match entries.get(key) {
            Some(value) => std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(CommandError::NotAnInteger)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(CommandError::NotAnInteger)?;
        entries.insert(key.to_vec(), next.to_string().into_bytes());
        Ok(next)
    }

    /// All keys matching a glob pattern, in no particular order.
    pub fn keys(
        &self,
        pattern: &[u8],
    ) -> Vec<Vec<u8>> {
        self.entries
            .read()
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect()
    }

    /// Cursor-based iteration over the keys in sorted order.
    ///
    /// Examines up to `count` keys starting at position `cursor` and returns
    /// those matching `pattern`, plus the cursor to resume from (0 once the
    /// end is reached).
    pub fn scan(
        &self,
        cursor: usize,
        pattern: &[u8],
        count: usize,
    ) -> (usize, Vec<Vec<u8>>) {
        let mut all: Vec<Vec<u8>> = self.entries.read().keys().cloned().collect();
        all.sort_unstable();

        let start = cursor.min(all.len());
        let end = start.saturating_add(count.max(1)).min(all.len());
        let matched = all[start..end]
            .iter()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        let next = if end >= all.len() { 0 } else { end };
        (next, matched)
    }

    pub fn flush(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
