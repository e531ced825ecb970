//! The authoritative manifest: latest blob pointer per gameweek.
//!
//! The in-memory [`ManifestStore`] is the source of truth for live traffic.
//! A JSON copy is pushed to the blob store as a best-effort backup after
//! every change and read back once at startup; backup failures are logged
//! and never affect the in-memory state.
//!
//! Readers get a full snapshot copy; writers swap the entire object under
//! one lock. No reader ever observes a manifest with entries from two
//! different update cycles.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Latest known location and fingerprint for one gameweek.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Public URL of the versioned blob.
    pub url: String,
    /// Full hex digest of the blob content.
    pub hash: String,
    /// Unix timestamp of the update that produced this entry.
    pub timestamp: i64,
    /// ISO-8601 form of the same instant.
    pub updated: String,
}

/// The whole pointer table, replaced atomically on every change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Manifest {
    #[serde(default)]
    pub gameweeks: HashMap<String, ManifestEntry>,
    /// Monotonically non-decreasing change token (stringified unix timestamp).
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub updated: String,
}

impl Manifest {
    /// Build the successor manifest: this manifest plus one replaced entry.
    /// The manifest-level version token and timestamps are taken from the
    /// entry, so a published `manifest_version` always matches the entry
    /// that caused it. Entries are never deleted.
    pub fn with_entry(&self, gameweek: u32, entry: ManifestEntry) -> Manifest {
        let version = entry.timestamp.to_string();
        let timestamp = entry.timestamp;
        let updated = entry.updated.clone();
        let mut gameweeks = self.gameweeks.clone();
        gameweeks.insert(gameweek.to_string(), entry);
        Manifest {
            gameweeks,
            version,
            timestamp,
            updated,
        }
    }
}

/// Current ISO-8601 instant, shared by manifest entries and update events.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Lock-guarded holder of the single authoritative [`Manifest`].
#[derive(Default)]
pub struct ManifestStore {
    inner: RwLock<Manifest>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot copy; safe to use without any lock after return.
    pub fn get(&self) -> Manifest {
        self.inner.read().expect("manifest lock poisoned").clone()
    }

    /// Atomically swap in a fully built manifest.
    pub fn replace(&self, manifest: Manifest) {
        *self.inner.write().expect("manifest lock poisoned") = manifest;
    }

    /// Pointer entry for one gameweek key, if present.
    pub fn entry(&self, key: &str) -> Option<ManifestEntry> {
        self.inner
            .read()
            .expect("manifest lock poisoned")
            .gameweeks
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(hash: &str) -> ManifestEntry {
        ManifestEntry {
            url: format!("https://blobs.example.com/gw5-{}.csv", hash),
            hash: hash.to_string(),
            timestamp: 1_700_000_000,
            updated: "2023-11-14T22:13:20Z".to_string(),
        }
    }

    #[test]
    fn test_replace_then_get_round_trip() {
        let store = ManifestStore::new();
        let next = store.get().with_entry(5, entry("abc"));
        store.replace(next);

        let seen = store.get();
        assert_eq!(seen.gameweeks.len(), 1);
        assert_eq!(seen.gameweeks["5"].hash, "abc");
        assert_eq!(seen.version, seen.timestamp.to_string());
    }

    #[test]
    fn test_with_entry_preserves_other_keys() {
        let m = Manifest::default()
            .with_entry(1, entry("h1"))
            .with_entry(2, entry("h2"));
        assert_eq!(m.gameweeks.len(), 2);

        let m = m.with_entry(1, entry("h1b"));
        assert_eq!(m.gameweeks.len(), 2);
        assert_eq!(m.gameweeks["1"].hash, "h1b");
        assert_eq!(m.gameweeks["2"].hash, "h2");
    }

    #[test]
    fn test_backup_json_field_names() {
        let m = Manifest::default().with_entry(5, entry("abc"));
        let json = serde_json::to_value(&m).unwrap();
        let e = &json["gameweeks"]["5"];
        assert!(e["url"].is_string());
        assert!(e["hash"].is_string());
        assert!(e["timestamp"].is_i64());
        assert!(e["updated"].is_string());
        assert!(json["version"].is_string());
    }

    #[test]
    fn test_deserialize_tolerates_missing_fields() {
        let m: Manifest = serde_json::from_str("{}").unwrap();
        assert!(m.gameweeks.is_empty());
        assert_eq!(m.version, "");
    }

    /// Concurrent readers racing a writer must always see a complete
    /// manifest: every entry's hash matches the manifest's own version tag.
    #[test]
    fn test_snapshot_is_never_torn() {
        let store = Arc::new(ManifestStore::new());
        let mut writer_manifests = Vec::new();
        for round in 0..64 {
            let mut m = Manifest::default();
            for gw in 1..=10u32 {
                m.gameweeks
                    .insert(gw.to_string(), entry(&format!("round{}", round)));
            }
            m.version = format!("round{}", round);
            writer_manifests.push(m);
        }

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for m in writer_manifests {
                    store.replace(m);
                }
            })
        };

        for _ in 0..500 {
            let snap = store.get();
            for e in snap.gameweeks.values() {
                assert_eq!(e.hash, snap.version, "mixed-cycle snapshot observed");
            }
        }
        writer.join().unwrap();
    }
}
