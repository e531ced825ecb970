//! Content digests and blob naming.
//!
//! Every scraped snapshot is fingerprinted with SHA-256 before upload. The
//! digest is only ever compared for equality — it is never decoded — and a
//! 10-character prefix of its hex form goes into the versioned blob name.
//!
//! Two names are derived per gameweek:
//! - the **legacy** name (`fpl_rosters_points_gw{gw}.csv`), overwritten on
//!   every change so old consumers keep working, and
//! - the **versioned** name (`fpl_rosters_points_gw{gw}-{digest[:10]}.csv`),
//!   written once per distinct digest. Its content never changes after the
//!   first write, so downstream consumers may cache it indefinitely.

use sha2::{Digest, Sha256};

/// Length of the digest prefix embedded in versioned blob names.
const VERSION_PREFIX_LEN: usize = 10;

/// Hex-encoded SHA-256 fingerprint of a snapshot's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the digest of raw snapshot bytes.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Full hex form, as recorded in manifest entries.
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Short prefix used in versioned blob names.
    pub fn short(&self) -> &str {
        &self.0[..VERSION_PREFIX_LEN]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable name for a gameweek snapshot, overwritten in place on each change.
pub fn legacy_name(gameweek: u32) -> String {
    format!("fpl_rosters_points_gw{}.csv", gameweek)
}

/// Immutable content-addressed name for a gameweek snapshot.
pub fn versioned_name(gameweek: u32, digest: &ContentDigest) -> String {
    format!("fpl_rosters_points_gw{}-{}.csv", gameweek, digest.short())
}
