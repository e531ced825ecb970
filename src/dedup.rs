//! Duplicate-upload suppression.
//!
//! The refresh worker hashes every snapshot it produces and asks the
//! [`DedupIndex`] whether that content is novel for its blob name. The index
//! only learns a digest *after* the caller reports a successful upload, so a
//! failed upload never suppresses the retry on the next cycle.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::digest::ContentDigest;

/// Process-wide map of blob name → last successfully uploaded digest.
#[derive(Default)]
pub struct DedupIndex {
    last: Mutex<HashMap<String, ContentDigest>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute a digest for `data` and report whether it differs from the
    /// last digest recorded for `name`. Unknown names are always novel.
    pub fn check(&self, name: &str, data: &[u8]) -> (ContentDigest, bool) {
        let digest = ContentDigest::of(data);
        let novel = self
            .last
            .lock()
            .expect("dedup index lock poisoned")
            .get(name)
            .map_or(true, |prev| *prev != digest);
        (digest, novel)
    }

    /// Record a digest after the corresponding upload succeeded.
    ///
    /// Callers must not record on upload failure; the stale entry is what
    /// makes the next cycle retry the same content.
    pub fn record(&self, name: &str, digest: ContentDigest) {
        self.last
            .lock()
            .expect("dedup index lock poisoned")
            .insert(name.to_string(), digest);
    }
}
