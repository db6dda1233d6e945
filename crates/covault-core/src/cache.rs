//! Derivation cache
//!
//! Derived leaf public keys per path plus the issued-address counters for
//! both subchains. Snapshots to a JSON string the caller can stash in
//! whatever store it has; restoring picks the counters up exactly where
//! they left off.
//!
//! Only public keys are ever cached. Signing call sites re-derive private
//! leaves from the private master, so snapshots are safe to persist.

use std::collections::HashMap;

use bitcoin::bip32::Xpub;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hdpath::{HdPath, Subchain};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// One cached leaf key, stored in its serialized (hwif) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedKey {
    #[serde(with = "xpub_serde")]
    pub hwif: Xpub,
}

/// Issued-address counters per subchain, keyed `"0"`/`"1"` on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCounters {
    #[serde(rename = "0")]
    pub receive: u32,
    #[serde(rename = "1")]
    pub change: u32,
}

/// Cache of derived leaf keys and issued-address counters.
///
/// Each path maps to one key per account participant, in participant
/// order. Single-key accounts store one-element lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationCache {
    keys: HashMap<HdPath, Vec<CachedKey>>,
    issued: IssuedCounters,
}

impl DerivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached leaf keys for `path`, one per participant.
    pub fn get(&self, path: &HdPath) -> Option<Vec<Xpub>> {
        self.keys
            .get(path)
            .map(|entry| entry.iter().map(|key| key.hwif).collect())
    }

    pub fn insert(&mut self, path: HdPath, keys: Vec<Xpub>) {
        self.keys
            .insert(path, keys.into_iter().map(|hwif| CachedKey { hwif }).collect());
    }

    /// Cached keys for `path`, deriving and caching on a miss. Entries
    /// are never evicted within a session.
    pub fn get_or_derive<E>(
        &mut self,
        path: &HdPath,
        derive: impl FnOnce() -> Result<Vec<Xpub>, E>,
    ) -> Result<Vec<Xpub>, E> {
        if let Some(keys) = self.get(path) {
            return Ok(keys);
        }
        log::debug!("cache miss, deriving {path}");
        let keys = derive()?;
        self.insert(path.clone(), keys.clone());
        Ok(keys)
    }

    /// How many addresses the subchain has issued so far.
    pub fn issued(&self, subchain: Subchain) -> u32 {
        match subchain {
            Subchain::Receive => self.issued.receive,
            Subchain::Change => self.issued.change,
        }
    }

    /// Issue the next address index on `subchain`. Indices are handed out
    /// once and never reused, including across snapshot and restore.
    pub fn issue_next(&mut self, subchain: Subchain) -> u32 {
        let counter = match subchain {
            Subchain::Receive => &mut self.issued.receive,
            Subchain::Change => &mut self.issued.change,
        };
        let index = *counter;
        *counter += 1;
        index
    }

    pub fn counters(&self) -> IssuedCounters {
        self.issued
    }

    /// JSON snapshot of the cached keys and counters.
    pub fn snapshot(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuild a cache from a snapshot, counters included.
    pub fn restore(snapshot: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(snapshot)?)
    }
}

mod xpub_serde {
    use bitcoin::bip32::Xpub;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Xpub, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Xpub, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::MasterKey;
    use bitcoin::Network;
    use std::io::Write;

    fn leaf_xpub(path: &str) -> Xpub {
        let master = MasterKey::from_seed(b"cache test", Network::Bitcoin).unwrap();
        master
            .node()
            .derive(&path.parse().unwrap())
            .unwrap()
            .public()
    }

    #[test]
    fn fresh_cache_has_no_issued_addresses() {
        let cache = DerivationCache::new();
        assert_eq!(cache.issued(Subchain::Receive), 0);
        assert_eq!(cache.issued(Subchain::Change), 0);
    }

    #[test]
    fn issue_next_is_monotonic_per_subchain() {
        let mut cache = DerivationCache::new();
        assert_eq!(cache.issue_next(Subchain::Receive), 0);
        assert_eq!(cache.issue_next(Subchain::Receive), 1);
        assert_eq!(cache.issue_next(Subchain::Change), 0);
        assert_eq!(cache.issue_next(Subchain::Receive), 2);
        assert_eq!(cache.issued(Subchain::Receive), 3);
        assert_eq!(cache.issued(Subchain::Change), 1);
    }

    #[test]
    fn get_or_derive_only_derives_once() {
        let mut cache = DerivationCache::new();
        let path: HdPath = "0/1".parse().unwrap();
        let key = leaf_xpub("0/1");
        let mut calls = 0;
        for _ in 0..3 {
            let got = cache
                .get_or_derive::<()>(&path, || {
                    calls += 1;
                    Ok(vec![key])
                })
                .unwrap();
            assert_eq!(got, vec![key]);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn snapshot_wire_shape() {
        let mut cache = DerivationCache::new();
        let key = leaf_xpub("0/0/1");
        cache.insert("0/0/1".parse().unwrap(), vec![key]);
        cache.issue_next(Subchain::Receive);
        cache.issue_next(Subchain::Receive);
        cache.issue_next(Subchain::Change);

        let snapshot = cache.snapshot().unwrap();
        let value: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(value["issued"]["0"], 2);
        assert_eq!(value["issued"]["1"], 1);
        assert_eq!(value["keys"]["0/0/1"][0]["hwif"], key.to_string());
    }

    #[test]
    fn restore_continues_counters_exactly() {
        let mut cache = DerivationCache::new();
        cache.issue_next(Subchain::Receive);
        cache.issue_next(Subchain::Receive);
        let snapshot = cache.snapshot().unwrap();

        let mut restored = DerivationCache::restore(&snapshot).unwrap();
        assert_eq!(restored, cache);
        assert_eq!(restored.issue_next(Subchain::Receive), 2);
        assert_eq!(restored.issue_next(Subchain::Change), 0);
    }

    #[test]
    fn snapshot_survives_a_file_round_trip() {
        let mut cache = DerivationCache::new();
        cache.insert("1/3".parse().unwrap(), vec![leaf_xpub("1/3")]);
        cache.issue_next(Subchain::Change);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(cache.snapshot().unwrap().as_bytes()).unwrap();
        let stored = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(DerivationCache::restore(&stored).unwrap(), cache);
    }

    #[test]
    fn rejects_garbage_snapshots() {
        assert!(DerivationCache::restore("{").is_err());
        let bad_key =
            r#"{"keys": {"0/1": [{"hwif": "not-a-key"}]}, "issued": {"0": 0, "1": 0}}"#;
        assert!(DerivationCache::restore(bad_key).is_err());
    }
}
