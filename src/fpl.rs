//! Typed client for the FPL origin API.
//!
//! Every endpoint the server proxies or scrapes is decoded once, at this
//! boundary, into an explicit record type; nothing downstream handles
//! untyped JSON maps. Unknown upstream fields are dropped on decode.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::OriginConfig;

// ============ Records ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bootstrap {
    pub events: Vec<Event>,
    pub teams: Vec<Team>,
    pub elements: Vec<Element>,
    #[serde(default)]
    pub total_players: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u32,
    pub name: String,
    pub finished: bool,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub is_next: bool,
    #[serde(default)]
    pub deadline_time: Option<String>,
    #[serde(default)]
    pub average_entry_score: Option<i64>,
    #[serde(default)]
    pub highest_score: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub short_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: u64,
    pub web_name: String,
    pub first_name: String,
    pub second_name: String,
    pub team: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: u64,
    #[serde(default)]
    pub event: Option<u32>,
    pub team_h: u32,
    pub team_a: u32,
    #[serde(default)]
    pub team_h_score: Option<i64>,
    #[serde(default)]
    pub team_a_score: Option<i64>,
    #[serde(default)]
    pub kickoff_time: Option<String>,
    #[serde(default)]
    pub started: Option<bool>,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSummary {
    pub history: Vec<ElementGwStat>,
    #[serde(default)]
    pub history_past: Vec<PastSeason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementGwStat {
    pub round: u32,
    pub total_points: i64,
    pub minutes: i64,
    #[serde(default)]
    pub goals_scored: i64,
    #[serde(default)]
    pub assists: i64,
    #[serde(default)]
    pub bonus: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PastSeason {
    pub season_name: String,
    pub total_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPicks {
    #[serde(default)]
    pub active_chip: Option<String>,
    pub entry_history: PicksHistory,
    pub picks: Vec<Pick>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicksHistory {
    pub event: u32,
    pub points: i64,
    pub total_points: i64,
    #[serde(default)]
    pub points_on_bench: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub element: u64,
    pub position: u32,
    pub multiplier: i64,
    pub is_captain: bool,
    pub is_vice_captain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInfo {
    pub id: u64,
    pub player_first_name: String,
    pub player_last_name: String,
    /// Team name chosen by the manager.
    pub name: String,
    #[serde(default)]
    pub summary_overall_points: Option<i64>,
    #[serde(default)]
    pub summary_overall_rank: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryHistory {
    pub current: Vec<HistoryRow>,
    #[serde(default)]
    pub chips: Vec<ChipPlay>,
    #[serde(default)]
    pub past: Vec<PastSeason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    pub event: u32,
    pub points: i64,
    pub total_points: i64,
    #[serde(default)]
    pub overall_rank: Option<i64>,
    #[serde(default)]
    pub points_on_bench: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipPlay {
    pub name: String,
    pub event: u32,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStatus {
    pub status: Vec<EventDayStatus>,
    #[serde(default)]
    pub leagues: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDayStatus {
    pub event: u32,
    pub date: String,
    pub bonus_added: bool,
    pub points: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEvent {
    pub elements: Vec<LiveElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveElement {
    pub id: u64,
    pub stats: LiveStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStats {
    pub minutes: i64,
    pub total_points: i64,
}

// ============ Derived views ============

/// Payload for `GET /api/fixtures`: raw fixtures plus the lookup maps the
/// dashboard joins its CSV rows against.
#[derive(Debug, Clone, Serialize)]
pub struct FixturesView {
    pub fixtures: Vec<Fixture>,
    #[serde(rename = "teamMap")]
    pub team_map: HashMap<String, String>,
    #[serde(rename = "playerTeamMap")]
    pub player_team_map: HashMap<String, String>,
}

/// Build the fixtures payload. The player map carries three name forms per
/// player (web name, full name, surname) because the scraped CSV is not
/// consistent about which one it stores.
pub fn fixtures_view(bootstrap: &Bootstrap, fixtures: Vec<Fixture>) -> FixturesView {
    let team_map: HashMap<String, String> = bootstrap
        .teams
        .iter()
        .map(|t| (t.id.to_string(), t.short_name.clone()))
        .collect();

    let mut player_team_map = HashMap::new();
    for player in &bootstrap.elements {
        let Some(team_name) = team_map.get(&player.team.to_string()) else {
            continue;
        };
        player_team_map.insert(player.web_name.clone(), team_name.clone());
        player_team_map.insert(
            format!("{} {}", player.first_name, player.second_name),
            team_name.clone(),
        );
        player_team_map.insert(player.second_name.clone(), team_name.clone());
    }

    FixturesView {
        fixtures,
        team_map,
        player_team_map,
    }
}

impl Bootstrap {
    /// The event marked current, falling back to the last finished one.
    pub fn current_event(&self) -> Option<u32> {
        self.events
            .iter()
            .find(|e| e.is_current)
            .or_else(|| self.events.iter().rev().find(|e| e.finished))
            .map(|e| e.id)
    }
}

// ============ Client ============

/// HTTP client for the origin API. One instance is shared by the server
/// handlers and the scraper.
pub struct FplClient {
    http: reqwest::Client,
    base_url: String,
}

impl FplClient {
    pub fn new(config: &OriginConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("origin returned error status for {}", url))?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode response from {}", url))
    }

    pub async fn bootstrap(&self) -> Result<Bootstrap> {
        self.get_json("bootstrap-static/").await
    }

    pub async fn fixtures(&self) -> Result<Vec<Fixture>> {
        self.get_json("fixtures/").await
    }

    pub async fn element_summary(&self, player_id: u64) -> Result<ElementSummary> {
        self.get_json(&format!("element-summary/{}/", player_id))
            .await
    }

    pub async fn entry(&self, entry_id: u64) -> Result<EntryInfo> {
        self.get_json(&format!("entry/{}/", entry_id)).await
    }

    pub async fn entry_picks(&self, entry_id: u64, gameweek: u32) -> Result<EntryPicks> {
        self.get_json(&format!("entry/{}/event/{}/picks/", entry_id, gameweek))
            .await
    }

    pub async fn entry_history(&self, entry_id: u64) -> Result<EntryHistory> {
        self.get_json(&format!("entry/{}/history/", entry_id)).await
    }

    pub async fn event_status(&self) -> Result<EventStatus> {
        self.get_json("event-status/").await
    }

    pub async fn live(&self, gameweek: u32) -> Result<LiveEvent> {
        self.get_json(&format!("event/{}/live/", gameweek)).await
    }
}
