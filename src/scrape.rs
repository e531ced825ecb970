//! Snapshot scraper collaborator.
//!
//! The refresh worker only cares about "give me the CSV bytes for gameweek
//! N"; that contract lives in [`SnapshotScraper`] so the worker can be
//! tested against canned bytes. The shipped [`RosterScraper`] builds the
//! roster-points CSV from the origin API: one row per picked player per
//! configured league entry, closed by a TOTAL row per entry.
//!
//! Scrape output is byte-compared upstream for dedup, so row ordering is
//! deterministic: entries in configured order, picks by lineup position.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::fpl::FplClient;

#[async_trait]
pub trait SnapshotScraper: Send + Sync {
    /// Produce the raw CSV snapshot for one gameweek.
    ///
    /// An error means the snapshot could not be produced this cycle; the
    /// caller decides whether to retry or substitute a sentinel.
    async fn scrape(&self, gameweek: u32) -> Result<Vec<u8>>;
}

const CSV_HEADER: &str = "entry_id,entry_team_name,manager_name,gameweek,element_id,player,club,lineup_position,multiplier,is_captain,is_vice_captain,points_gw,points_applied,minutes";

pub struct RosterScraper {
    client: Arc<FplClient>,
    entries: Vec<u64>,
}

impl RosterScraper {
    pub fn new(client: Arc<FplClient>, entries: Vec<u64>) -> Self {
        Self { client, entries }
    }
}

#[async_trait]
impl SnapshotScraper for RosterScraper {
    async fn scrape(&self, gameweek: u32) -> Result<Vec<u8>> {
        let bootstrap = self.client.bootstrap().await.context("bootstrap fetch")?;
        let live = self.client.live(gameweek).await.context("live fetch")?;

        let team_names: HashMap<u32, &str> = bootstrap
            .teams
            .iter()
            .map(|t| (t.id, t.short_name.as_str()))
            .collect();
        let players: HashMap<u64, &crate::fpl::Element> =
            bootstrap.elements.iter().map(|e| (e.id, e)).collect();
        let live_stats: HashMap<u64, &crate::fpl::LiveStats> =
            live.elements.iter().map(|e| (e.id, &e.stats)).collect();

        let mut out = String::from(CSV_HEADER);
        out.push('\n');

        for &entry_id in &self.entries {
            let info = self
                .client
                .entry(entry_id)
                .await
                .with_context(|| format!("entry {} fetch", entry_id))?;
            let picks = self
                .client
                .entry_picks(entry_id, gameweek)
                .await
                .with_context(|| format!("entry {} picks fetch", entry_id))?;

            let manager = format!("{} {}", info.player_first_name, info.player_last_name);
            let mut applied_total: i64 = 0;

            let mut rows = picks.picks.clone();
            rows.sort_by_key(|p| p.position);

            for pick in &rows {
                let player = players.get(&pick.element);
                let name = player.map_or("unknown", |p| p.web_name.as_str());
                let club = player
                    .and_then(|p| team_names.get(&p.team).copied())
                    .unwrap_or("");
                let stats = live_stats.get(&pick.element);
                let points = stats.map_or(0, |s| s.total_points);
                let minutes = stats.map_or(0, |s| s.minutes);
                let applied = points * pick.multiplier;
                applied_total += applied;

                out.push_str(&format!(
                    "{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                    entry_id,
                    csv_field(&info.name),
                    csv_field(&manager),
                    gameweek,
                    pick.element,
                    csv_field(name),
                    club,
                    pick.position,
                    pick.multiplier,
                    pick.is_captain,
                    pick.is_vice_captain,
                    points,
                    applied,
                    minutes,
                ));
            }

            out.push_str(&format!(
                "{},{},{},{},,TOTAL,,,,,,,{},\n",
                entry_id,
                csv_field(&info.name),
                csv_field(&manager),
                gameweek,
                applied_total,
            ));
        }

        Ok(out.into_bytes())
    }
}

/// Quote a field when it would break the row.
fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
