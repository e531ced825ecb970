//! Background refresh worker.
//!
//! One cycle runs serially: detect the latest available gameweek, then for
//! each gameweek scrape → dedup-gated upload → manifest replace → publish,
//! in that order per key. A new cycle never starts before the previous one
//! finishes. The stop signal is honored between keys and between sleep
//! ticks, never mid-upload.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::blob::{BlobStore, MANIFEST_NAME};
use crate::config::ScraperConfig;
use crate::dedup::DedupIndex;
use crate::digest::{legacy_name, versioned_name, ContentDigest};
use crate::gameday;
use crate::manifest::{now_iso, Manifest, ManifestEntry, ManifestStore};
use crate::notify::{UpdateEvent, UpdatePublisher};
use crate::scrape::SnapshotScraper;

/// Placeholder uploaded to the legacy name when a scrape fails, so
/// consumers see a defined state instead of missing data.
const SENTINEL: &[u8] = b"The game is being updated.";

/// How a gameweek sync ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// New content uploaded, manifest replaced, event published.
    Updated,
    /// Byte-identical content; nothing uploaded, changed, or published.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadOutcome {
    Uploaded,
    Unchanged,
}

/// Counters for one completed refresh cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    pub attempted: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub failed: u32,
}

pub struct RefreshWorker {
    scraper: Arc<dyn SnapshotScraper>,
    store: Arc<dyn BlobStore>,
    dedup: DedupIndex,
    manifest: Arc<ManifestStore>,
    publisher: Arc<UpdatePublisher>,
    config: ScraperConfig,
    stop: watch::Receiver<bool>,
    last_known_gameweek: AtomicU32,
    running: AtomicBool,
}

impl RefreshWorker {
    pub fn new(
        scraper: Arc<dyn SnapshotScraper>,
        store: Arc<dyn BlobStore>,
        manifest: Arc<ManifestStore>,
        publisher: Arc<UpdatePublisher>,
        config: ScraperConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scraper,
            store,
            dedup: DedupIndex::new(),
            manifest,
            publisher,
            config,
            stop,
            last_known_gameweek: AtomicU32::new(1),
            running: AtomicBool::new(false),
        }
    }

    /// Whether the background loop is currently alive. Reported by `/health`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Seed the in-memory manifest from the blob-store backup. Best-effort:
    /// any failure leaves the (empty) in-memory manifest authoritative.
    pub async fn load_backup_manifest(&self) {
        // Cache-busting query param: CDNs must not serve a stale backup.
        let url = format!(
            "{}?v={}",
            self.store.public_url(MANIFEST_NAME),
            Utc::now().timestamp()
        );
        match self.store.fetch(&url).await {
            Ok(bytes) => match serde_json::from_slice::<Manifest>(&bytes) {
                Ok(manifest) => {
                    log::info!(
                        "loaded manifest backup ({} gameweeks, version {:?})",
                        manifest.gameweeks.len(),
                        manifest.version
                    );
                    self.manifest.replace(manifest);
                }
                Err(e) => log::warn!("manifest backup unreadable, starting empty: {}", e),
            },
            Err(e) => log::info!("no manifest backup available, starting empty: {}", e),
        }
    }

    /// Run refresh cycles until the stop signal flips, sleeping a dynamic
    /// interval between cycles in 1-second cancellable ticks.
    pub async fn run(&self) {
        self.running.store(true, Ordering::Relaxed);
        log::info!("refresh worker started");

        while !self.stop_requested() {
            let cycle_start = Instant::now();
            if !self.config.active {
                log::info!("inactive (scraper.active = false)");
            } else {
                let stats = self.run_cycle().await;
                log::info!(
                    "cycle complete: {}/{} gameweeks updated, {} unchanged, {} failed",
                    stats.updated,
                    stats.attempted,
                    stats.unchanged,
                    stats.failed
                );
            }

            let interval = gameday::refresh_interval(&self.config);
            let sleep_for = interval.saturating_sub(cycle_start.elapsed());
            if sleep_for > Duration::ZERO {
                log::info!("sleeping {:.0?} until next cycle", sleep_for);
            }
            let deadline = Instant::now() + sleep_for;
            while Instant::now() < deadline && !self.stop_requested() {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        self.running.store(false, Ordering::Relaxed);
        log::info!("refresh worker stopped");
    }

    /// One full serial pass over gameweeks 1..=latest.
    pub async fn run_cycle(&self) -> CycleStats {
        let latest = self.detect_current_gameweek().await;
        let mut stats = CycleStats::default();

        for gw in 1..=latest {
            if self.stop_requested() {
                log::info!("stop requested, cycle abandoned at GW{}", gw);
                break;
            }
            stats.attempted += 1;
            match self.sync_gameweek(gw).await {
                Ok(SyncOutcome::Updated) => stats.updated += 1,
                Ok(SyncOutcome::Unchanged) => stats.unchanged += 1,
                Err(e) => {
                    stats.failed += 1;
                    log::error!("GW{} sync failed: {:#}", gw, e);
                }
            }
        }
        stats
    }

    /// Probe forward from the last known gameweek until the scraper fails;
    /// the last success bounds this cycle. Probes never go backward, so a
    /// transient failure cannot shrink the range.
    async fn detect_current_gameweek(&self) -> u32 {
        let mut latest = self.last_known_gameweek.load(Ordering::Relaxed);
        for gw in (latest + 1)..=self.config.max_gameweek {
            if self.stop_requested() {
                break;
            }
            match self.scraper.scrape(gw).await {
                Ok(_) => latest = gw,
                Err(_) => break,
            }
        }
        self.last_known_gameweek.store(latest, Ordering::Relaxed);
        log::debug!("latest available gameweek: GW{}", latest);
        latest
    }

    /// Scrape one gameweek and, when its content is novel, upload both blob
    /// names, replace the manifest, and publish the change — strictly in
    /// that order. Scrape failure substitutes the sentinel payload.
    pub async fn sync_gameweek(&self, gameweek: u32) -> Result<SyncOutcome> {
        let data = match self.scraper.scrape(gameweek).await {
            Ok(data) => data,
            Err(e) => {
                // Defined degraded state for consumers; dedup-gated so
                // repeated failures upload it once.
                let name = legacy_name(gameweek);
                if let Err(upload_err) = self.upload_if_novel(&name, SENTINEL, "text/csv").await {
                    log::error!("GW{} sentinel upload failed: {:#}", gameweek, upload_err);
                }
                return Err(e).with_context(|| format!("GW{} scrape failed", gameweek));
            }
        };

        // Legacy name: always overwritten on change for old consumers.
        self.upload_if_novel(&legacy_name(gameweek), &data, "text/csv")
            .await?;

        // Versioned name: its digest suffix makes the dedup check a pure
        // "have I written this exact content before" gate.
        let digest = ContentDigest::of(&data);
        let name = versioned_name(gameweek, &digest);
        match self.upload_if_novel(&name, &data, "text/csv").await? {
            UploadOutcome::Unchanged => {
                log::debug!("GW{} content unchanged, no updates needed", gameweek);
                return Ok(SyncOutcome::Unchanged);
            }
            UploadOutcome::Uploaded => {}
        }

        let entry = ManifestEntry {
            url: self.store.public_url(&name),
            hash: digest.as_hex().to_string(),
            timestamp: Utc::now().timestamp(),
            updated: now_iso(),
        };
        let next = self.manifest.get().with_entry(gameweek, entry);
        let version = next.version.clone();
        let updated_at = next.updated.clone();

        // In-memory replace first: it is authoritative for live traffic.
        self.manifest.replace(next);

        // Backup write is best-effort; failure is logged, never fatal.
        if let Err(e) = self.backup_manifest().await {
            log::warn!("manifest backup write failed (non-fatal): {:#}", e);
        }

        // Publish only after the replace it describes.
        self.publisher
            .publish(UpdateEvent::gameweek_updated(gameweek, &version, &updated_at));

        Ok(SyncOutcome::Updated)
    }

    async fn upload_if_novel(
        &self,
        name: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<UploadOutcome> {
        let (digest, novel) = self.dedup.check(name, data);
        if !novel {
            return Ok(UploadOutcome::Unchanged);
        }
        // On failure the index stays untouched, so the next cycle retries.
        self.store.upload(name, data, content_type).await?;
        self.dedup.record(name, digest);
        log::info!("uploaded {} ({} bytes)", name, data.len());
        Ok(UploadOutcome::Uploaded)
    }

    async fn backup_manifest(&self) -> Result<()> {
        let snapshot = self.manifest.get();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        self.store
            .upload(MANIFEST_NAME, &bytes, "application/json")
            .await
    }
}
