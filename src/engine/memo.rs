use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufReader, BufWriter};

use camino::Utf8Path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::Hash32;
use crate::engine::Outputs;
use crate::error::PersistError;

/// Outputs of pure tasks, keyed by the content hash of their inputs.
///
/// The memo outlives a single resolver run, so a cached task that sees the
/// same inputs again (in the next stage, or in the next process when the memo
/// is persisted) is replayed instead of invoked.
///
/// Entries read or written since the memo was loaded count as used;
/// [`Memo::prune`] drops the rest before the memo is saved again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memo<K, V> {
    entries: HashMap<Hash32, Vec<(K, V)>>,
    #[serde(skip)]
    used: HashSet<Hash32>,
}

impl<K, V> Memo<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            used: HashSet::new(),
        }
    }

    /// Drops every entry that was neither replayed nor stored since the memo
    /// was created or loaded. Returns the number of dropped entries.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|hash, _| self.used.contains(hash));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Memo<K, V>
where
    K: Clone + PartialEq,
    V: Clone,
{
    /// Looks up the outputs for `hash`, marking the entry as used.
    pub fn get(&mut self, hash: &Hash32) -> Option<Outputs<K, V>> {
        let outputs = self.entries.get(hash)?;
        self.used.insert(*hash);
        Some(outputs.iter().cloned().collect())
    }

    /// Remembers the outputs for `hash`. Deferrals are never remembered.
    pub fn insert(&mut self, hash: Hash32, outputs: &Outputs<K, V>) {
        if outputs.is_empty() {
            return;
        }
        self.used.insert(hash);
        self.entries
            .insert(hash, outputs.iter().cloned().collect());
    }
}

impl<K, V> Memo<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Loads a memo from disk; a missing file yields an empty memo.
    pub fn load(path: &Utf8Path) -> Result<Self, PersistError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let reader = BufReader::new(fs::File::open(path)?);
        Ok(ciborium::from_reader(reader)?)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), PersistError> {
        if let Some(dir) = path.parent()
            && !dir.as_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let writer = BufWriter::new(fs::File::create(path)?);
        ciborium::into_writer(self, writer)?;
        Ok(())
    }
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deferrals_are_not_remembered() {
        let mut memo: Memo<String, i32> = Memo::new();
        memo.insert(Hash32::hash("a"), &Outputs::deferred());
        assert!(memo.is_empty());

        memo.insert(Hash32::hash("b"), &Outputs::one("B".to_string(), 2));
        assert_eq!(
            memo.get(&Hash32::hash("b")),
            Some(Outputs::one("B".to_string(), 2))
        );
    }

    #[test]
    fn test_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("memo.cbor");

        let mut memo: Memo<String, i32> = Memo::new();
        memo.insert(Hash32::hash("c"), &Outputs::one("C".to_string(), 4));
        memo.save(&path).unwrap();

        let mut loaded: Memo<String, i32> = Memo::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded.get(&Hash32::hash("c")),
            Some(Outputs::one("C".to_string(), 4))
        );
    }

    #[test]
    fn test_prune_keeps_used_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("memo.cbor");

        let mut memo: Memo<String, i32> = Memo::new();
        memo.insert(Hash32::hash("old"), &Outputs::one("O".to_string(), 1));
        memo.insert(Hash32::hash("kept"), &Outputs::one("K".to_string(), 2));
        memo.save(&path).unwrap();

        let mut loaded: Memo<String, i32> = Memo::load(&path).unwrap();
        assert!(loaded.get(&Hash32::hash("kept")).is_some());
        assert!(loaded.get(&Hash32::hash("missing")).is_none());
        loaded.insert(Hash32::hash("new"), &Outputs::one("N".to_string(), 3));

        assert_eq!(loaded.prune(), 1);
        assert_eq!(loaded.len(), 2);
        assert!(loaded.get(&Hash32::hash("old")).is_none());
        assert!(loaded.get(&Hash32::hash("new")).is_some());
    }
}
