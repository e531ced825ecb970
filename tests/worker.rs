//! Refresh-cycle behavior against stub collaborators: dedup idempotence,
//! novelty, sentinel substitution, retry after upload failure, and the
//! manifest backup round trip.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use fplsync::blob::{BlobStore, MANIFEST_NAME};
use fplsync::config::ScraperConfig;
use fplsync::digest::ContentDigest;
use fplsync::manifest::ManifestStore;
use fplsync::notify::{EventKind, UpdatePublisher};
use fplsync::scrape::SnapshotScraper;
use fplsync::worker::{RefreshWorker, SyncOutcome};

/// Serves canned bytes per gameweek; unknown gameweeks fail like an
/// unavailable origin.
struct StubScraper {
    payloads: Mutex<HashMap<u32, Vec<u8>>>,
    calls: AtomicUsize,
}

impl StubScraper {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn set(&self, gw: u32, data: &[u8]) {
        self.payloads.lock().unwrap().insert(gw, data.to_vec());
    }

    fn clear(&self, gw: u32) {
        self.payloads.lock().unwrap().remove(&gw);
    }
}

#[async_trait]
impl SnapshotScraper for StubScraper {
    async fn scrape(&self, gameweek: u32) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .lock()
            .unwrap()
            .get(&gameweek)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("gameweek {} not available", gameweek))
    }
}

/// In-memory blob store that records every acknowledged upload and can be
/// told to reject specific names.
struct StubBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
    fail_names: Mutex<HashSet<String>>,
}

impl StubBlobStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            blobs: Mutex::new(HashMap::new()),
            uploads: Mutex::new(Vec::new()),
            fail_names: Mutex::new(HashSet::new()),
        })
    }

    fn fail_on(&self, name: &str) {
        self.fail_names.lock().unwrap().insert(name.to_string());
    }

    fn heal(&self, name: &str) {
        self.fail_names.lock().unwrap().remove(name);
    }

    fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    fn uploaded_names(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for StubBlobStore {
    async fn upload(&self, name: &str, data: &[u8], _content_type: &str) -> Result<()> {
        if self.fail_names.lock().unwrap().contains(name) {
            anyhow::bail!("store rejected {}", name);
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        self.uploads.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let name = url
            .trim_start_matches("https://blob.test/")
            .split('?')
            .next()
            .unwrap()
            .to_string();
        self.blobs
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("blob {} not found", name))
    }

    fn public_url(&self, name: &str) -> String {
        format!("https://blob.test/{}", name)
    }
}

fn scraper_config(max_gameweek: u32) -> ScraperConfig {
    ScraperConfig {
        active: true,
        max_gameweek,
        gameday_interval_secs: 120,
        non_gameday_interval_secs: 600,
        static_interval_secs: 0,
        entries: vec![394273],
    }
}

struct Harness {
    scraper: Arc<StubScraper>,
    blobs: Arc<StubBlobStore>,
    manifest: Arc<ManifestStore>,
    publisher: Arc<UpdatePublisher>,
    worker: RefreshWorker,
    _stop_tx: watch::Sender<bool>,
}

fn harness(max_gameweek: u32) -> Harness {
    let scraper = StubScraper::new();
    let blobs = StubBlobStore::new();
    let manifest = Arc::new(ManifestStore::new());
    let publisher = Arc::new(UpdatePublisher::new());
    let (stop_tx, stop_rx) = watch::channel(false);
    let worker = RefreshWorker::new(
        scraper.clone(),
        blobs.clone(),
        manifest.clone(),
        publisher.clone(),
        scraper_config(max_gameweek),
        stop_rx,
    );
    Harness {
        scraper,
        blobs,
        manifest,
        publisher,
        worker,
        _stop_tx: stop_tx,
    }
}

#[tokio::test]
async fn test_novel_content_uploads_and_publishes() {
    let h = harness(1);
    h.scraper.set(1, b"gw1 rows v1");
    let mut events = h.publisher.subscribe();

    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.failed, 0);

    // Legacy and versioned names both written.
    let digest = ContentDigest::of(b"gw1 rows v1");
    let names = h.blobs.uploaded_names();
    assert!(names.contains(&"fpl_rosters_points_gw1.csv".to_string()));
    let versioned = format!("fpl_rosters_points_gw1-{}.csv", digest.short());
    assert!(names.contains(&versioned));

    // Manifest entry points at the versioned blob with the full digest.
    let manifest = h.manifest.get();
    let entry = &manifest.gameweeks["1"];
    assert_eq!(entry.hash, digest.as_hex());
    assert_eq!(entry.url, format!("https://blob.test/{}", versioned));
    assert_eq!(manifest.version, manifest.timestamp.to_string());

    // The publish describes the replace that just happened.
    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::GameweekUpdated);
    assert_eq!(event.data["gameweek"], 1);
    assert_eq!(event.data["manifest_version"], manifest.version);
}

#[tokio::test]
async fn test_identical_bytes_are_a_complete_noop() {
    let h = harness(1);
    h.scraper.set(1, b"gw1 rows");

    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.updated, 1);
    let uploads_after_first = h.blobs.upload_count();
    let version_after_first = h.manifest.get().version.clone();

    let mut events = h.publisher.subscribe();
    let stats = h.worker.run_cycle().await;

    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(h.blobs.upload_count(), uploads_after_first, "no re-upload");
    assert_eq!(h.manifest.get().version, version_after_first);
    assert!(events.try_recv().is_err(), "no publish for unchanged bytes");
}

#[tokio::test]
async fn test_changed_bytes_produce_one_new_version() {
    let h = harness(1);
    h.scraper.set(1, b"rows v1");
    h.worker.run_cycle().await;
    let first_hash = h.manifest.get().gameweeks["1"].hash.clone();

    let mut events = h.publisher.subscribe();
    h.scraper.set(1, b"rows v2");
    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.updated, 1);

    let manifest = h.manifest.get();
    let entry = &manifest.gameweeks["1"];
    assert_ne!(entry.hash, first_hash);
    assert_eq!(entry.hash, ContentDigest::of(b"rows v2").as_hex());

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::GameweekUpdated);
    assert!(events.try_recv().is_err(), "exactly one publish per digest");
}

#[tokio::test]
async fn test_failed_upload_retries_next_cycle() {
    let h = harness(1);
    h.scraper.set(1, b"rows");
    h.blobs.fail_on("fpl_rosters_points_gw1.csv");

    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.failed, 1);
    assert!(h.manifest.get().gameweeks.is_empty(), "no manifest change");

    // Store recovers; the same content must be retried, not suppressed.
    h.blobs.heal("fpl_rosters_points_gw1.csv");
    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.updated, 1);
    assert_eq!(
        h.manifest.get().gameweeks["1"].hash,
        ContentDigest::of(b"rows").as_hex()
    );
}

#[tokio::test]
async fn test_scrape_failure_uploads_sentinel() {
    let h = harness(1);
    // Gameweek 1 was seen once, then the origin breaks.
    h.scraper.set(1, b"rows");
    h.worker.run_cycle().await;
    h.scraper.clear(1);

    let mut events = h.publisher.subscribe();
    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.failed, 1);

    let legacy = h
        .blobs
        .fetch("https://blob.test/fpl_rosters_points_gw1.csv")
        .await
        .unwrap();
    assert_eq!(legacy, b"The game is being updated.");
    // Sentinel substitution is not a content update: no publish.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_detects_new_gameweeks_and_never_shrinks() {
    let h = harness(3);
    h.scraper.set(1, b"gw1");
    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.attempted, 1);

    h.scraper.set(2, b"gw2");
    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.attempted, 2);
    assert!(h.manifest.get().gameweeks.contains_key("2"));

    // Gameweek 2 disappearing upstream does not shrink the cycle range;
    // it surfaces as a per-key failure instead.
    h.scraper.clear(2);
    let stats = h.worker.run_cycle().await;
    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_manifest_backup_round_trip() {
    let h = harness(1);
    h.scraper.set(1, b"rows");
    h.worker.run_cycle().await;

    let backup = h
        .blobs
        .fetch(&format!("https://blob.test/{}", MANIFEST_NAME))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&backup).unwrap();
    assert!(parsed["gameweeks"]["1"]["url"].is_string());
    assert!(parsed["gameweeks"]["1"]["hash"].is_string());

    // A fresh worker seeds its empty manifest from the backup.
    let (stop_tx, stop_rx) = watch::channel(false);
    let manifest2 = Arc::new(ManifestStore::new());
    let worker2 = RefreshWorker::new(
        StubScraper::new(),
        h.blobs.clone(),
        manifest2.clone(),
        Arc::new(UpdatePublisher::new()),
        scraper_config(1),
        stop_rx,
    );
    worker2.load_backup_manifest().await;
    drop(stop_tx);

    assert_eq!(
        manifest2.get().gameweeks["1"].hash,
        h.manifest.get().gameweeks["1"].hash
    );
}

#[tokio::test]
async fn test_backup_failure_is_not_fatal() {
    let h = harness(1);
    h.scraper.set(1, b"rows");
    h.blobs.fail_on(MANIFEST_NAME);
    let mut events = h.publisher.subscribe();

    let stats = h.worker.run_cycle().await;

    // The in-memory manifest is authoritative: the cycle still succeeds
    // and the publish still goes out.
    assert_eq!(stats.updated, 1);
    assert!(!h.manifest.get().gameweeks.is_empty());
    assert_eq!(events.recv().await.unwrap().kind, EventKind::GameweekUpdated);
}

#[tokio::test]
async fn test_sync_outcome_distinguishes_noop_from_update() {
    let h = harness(1);
    h.scraper.set(1, b"rows");
    assert_eq!(h.worker.sync_gameweek(1).await.unwrap(), SyncOutcome::Updated);
    assert_eq!(
        h.worker.sync_gameweek(1).await.unwrap(),
        SyncOutcome::Unchanged
    );
}
