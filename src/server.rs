//! HTTP/SSE server.
//!
//! Serves the live update stream, the manifest, the data proxy, and the
//! TTL-cached read endpoints backed by the FPL origin API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Service info |
//! | `GET` | `/health` | Worker and notification-channel status |
//! | `GET` | `/sse/fpl-updates` | Live event stream (`text/event-stream`) |
//! | `GET` | `/api/manifest` | Current manifest snapshot, no-cache |
//! | `GET` | `/api/data/{key}` | Versioned snapshot bytes for a gameweek |
//! | `GET` | `/api/fixtures` | Fixtures + team/player maps (TTL 300 s) |
//! | `GET` | `/api/player/{id}` | Per-player stats (TTL 300 s) |
//! | `GET` | `/api/squad/{entry}` | Current-event squad (TTL 60 s) |
//! | `GET` | `/api/history/{entry}` | Manager season history (TTL 600 s) |
//! | `GET` | `/api/gameweek-status` | Event status (TTL 60 s) |
//! | `GET` | `/api/historical` | Finished-events aggregate (TTL 3600 s) |
//! | `GET` | `/api/chips` | Chip usage across league entries (TTL 300 s) |
//!
//! # Error Contract
//!
//! Error responses are `{"error": {"code": ..., "message": ...}}` with
//! codes `bad_request` (400), `not_found` (404), `upstream` (502), and
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the dashboard is a
//! browser client served from another origin.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

use crate::blob::BlobStore;
use crate::cache::TtlCache;
use crate::config::ScraperConfig;
use crate::fpl::{
    fixtures_view, ChipPlay, ElementSummary, EntryHistory, EntryPicks, EventStatus, FixturesView,
    FplClient,
};
use crate::manifest::ManifestStore;
use crate::notify::UpdatePublisher;
use crate::stream::spawn_session;
use crate::worker::RefreshWorker;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate, max-age=0";

/// One independent TTL cache per read endpoint.
pub struct Caches {
    fixtures: TtlCache<(), FixturesView>,
    player: TtlCache<u64, ElementSummary>,
    squad: TtlCache<u64, SquadView>,
    history: TtlCache<u64, EntryHistory>,
    status: TtlCache<(), EventStatus>,
    historical: TtlCache<(), HistoricalView>,
    chips: TtlCache<(), Vec<EntryChips>>,
}

impl Default for Caches {
    fn default() -> Self {
        Self {
            fixtures: TtlCache::new("fixtures", Duration::from_secs(300)),
            player: TtlCache::new("player", Duration::from_secs(300)),
            squad: TtlCache::new("squad", Duration::from_secs(60)),
            history: TtlCache::new("history", Duration::from_secs(600)),
            status: TtlCache::new("gameweek-status", Duration::from_secs(60)),
            historical: TtlCache::new("historical", Duration::from_secs(3600)),
            chips: TtlCache::new("chips", Duration::from_secs(300)),
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub manifest: Arc<ManifestStore>,
    pub publisher: Arc<UpdatePublisher>,
    pub worker: Arc<RefreshWorker>,
    pub blobs: Arc<dyn BlobStore>,
    pub fpl: Arc<FplClient>,
    pub caches: Arc<Caches>,
    /// League entry ids, for the chips aggregate.
    pub entries: Arc<Vec<u64>>,
}

impl AppState {
    pub fn new(
        manifest: Arc<ManifestStore>,
        publisher: Arc<UpdatePublisher>,
        worker: Arc<RefreshWorker>,
        blobs: Arc<dyn BlobStore>,
        fpl: Arc<FplClient>,
        config: &ScraperConfig,
    ) -> Self {
        Self {
            manifest,
            publisher,
            worker,
            blobs,
            fpl,
            caches: Arc::new(Caches::default()),
            entries: Arc::new(config.entries.clone()),
        }
    }
}

/// Build the full router. Split out from [`run_server`] so tests can drive
/// the app on an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/sse/fpl-updates", get(handle_sse))
        .route("/api/manifest", get(handle_manifest))
        .route("/api/data/{key}", get(handle_data))
        .route("/api/fixtures", get(handle_fixtures))
        .route("/api/player/{id}", get(handle_player))
        .route("/api/squad/{entry}", get(handle_squad))
        .route("/api/history/{entry}", get(handle_history))
        .route("/api/gameweek-status", get(handle_gameweek_status))
        .route("/api/historical", get(handle_historical))
        .route("/api/chips", get(handle_chips))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` resolves.
pub async fn run_server(
    bind: &str,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);
    log::info!("server listening on http://{}", bind);
    log::info!("SSE endpoint: http://{}/sse/fpl-updates", bind);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// 502 for origin/blob-store failures behind a read endpoint: the request
/// was fine, the upstream was not.
fn upstream_error(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream".to_string(),
        message: format!("{:#}", err),
    }
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "FPL Dashboard Backend",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "sse": "/sse/fpl-updates",
            "manifest": "/api/manifest",
            "health": "/health",
        },
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    scraper: String,
    sse_subscribers: usize,
    timestamp: i64,
}

async fn handle_health(State(state): State<AppState>) -> Response {
    let worker_running = state.worker.is_running();
    let body = HealthResponse {
        status: if worker_running { "healthy" } else { "degraded" }.to_string(),
        scraper: if worker_running { "running" } else { "stopped" }.to_string(),
        sse_subscribers: state.publisher.subscriber_count(),
        timestamp: chrono::Utc::now().timestamp(),
    };
    let code = if worker_running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

// ============ GET /sse/fpl-updates ============

async fn handle_sse(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let frames = spawn_session(state.publisher.clone());
    let stream = ReceiverStream::new(frames).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(json))
    });
    // Heartbeats come from the session itself, not from a keep-alive layer.
    Sse::new(stream)
}

// ============ GET /api/manifest ============

async fn handle_manifest(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, NO_CACHE)],
        Json(state.manifest.get()),
    )
}

// ============ GET /api/data/{key} ============

/// Proxies the current versioned snapshot bytes for a gameweek through to
/// the caller, bypassing any CDN or browser cache in between.
async fn handle_data(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let entry = state
        .manifest
        .entry(&key)
        .ok_or_else(|| not_found(format!("no manifest entry for gameweek {}", key)))?;

    let bytes = state.blobs.fetch(&entry.url).await.map_err(upstream_error)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CACHE_CONTROL, NO_CACHE),
        ],
        bytes,
    )
        .into_response())
}

// ============ Cached read endpoints ============

async fn handle_fixtures(State(state): State<AppState>) -> Result<Json<FixturesView>, AppError> {
    let fpl = state.fpl.clone();
    let view = state
        .caches
        .fixtures
        .get_or_fetch((), || async move {
            let bootstrap = fpl.bootstrap().await?;
            let fixtures = fpl.fixtures().await?;
            Ok(fixtures_view(&bootstrap, fixtures))
        })
        .await
        .map_err(upstream_error)?;
    Ok(Json(view))
}

async fn handle_player(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ElementSummary>, AppError> {
    let fpl = state.fpl.clone();
    let summary = state
        .caches
        .player
        .get_or_fetch(id, || async move { fpl.element_summary(id).await })
        .await
        .map_err(upstream_error)?;
    Ok(Json(summary))
}

/// An entry's squad for the current event.
#[derive(Debug, Clone, Serialize)]
struct SquadView {
    entry_id: u64,
    team_name: String,
    manager_name: String,
    event: u32,
    picks: EntryPicks,
}

async fn handle_squad(
    State(state): State<AppState>,
    Path(entry): Path<u64>,
) -> Result<Json<SquadView>, AppError> {
    let fpl = state.fpl.clone();
    let view = state
        .caches
        .squad
        .get_or_fetch(entry, || async move {
            let bootstrap = fpl.bootstrap().await?;
            let event = bootstrap
                .current_event()
                .ok_or_else(|| anyhow::anyhow!("no current event"))?;
            let info = fpl.entry(entry).await?;
            let picks = fpl.entry_picks(entry, event).await?;
            Ok(SquadView {
                entry_id: entry,
                team_name: info.name,
                manager_name: format!("{} {}", info.player_first_name, info.player_last_name),
                event,
                picks,
            })
        })
        .await
        .map_err(upstream_error)?;
    Ok(Json(view))
}

async fn handle_history(
    State(state): State<AppState>,
    Path(entry): Path<u64>,
) -> Result<Json<EntryHistory>, AppError> {
    let fpl = state.fpl.clone();
    let history = state
        .caches
        .history
        .get_or_fetch(entry, || async move { fpl.entry_history(entry).await })
        .await
        .map_err(upstream_error)?;
    Ok(Json(history))
}

async fn handle_gameweek_status(
    State(state): State<AppState>,
) -> Result<Json<EventStatus>, AppError> {
    let fpl = state.fpl.clone();
    let status = state
        .caches
        .status
        .get_or_fetch((), || async move { fpl.event_status().await })
        .await
        .map_err(upstream_error)?;
    Ok(Json(status))
}

/// Season-to-date aggregate of finished gameweeks.
#[derive(Debug, Clone, Serialize)]
struct HistoricalView {
    events: Vec<HistoricalEvent>,
    total_players: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
struct HistoricalEvent {
    event: u32,
    name: String,
    average_entry_score: Option<i64>,
    highest_score: Option<i64>,
}

async fn handle_historical(
    State(state): State<AppState>,
) -> Result<Json<HistoricalView>, AppError> {
    let fpl = state.fpl.clone();
    let view = state
        .caches
        .historical
        .get_or_fetch((), || async move {
            let bootstrap = fpl.bootstrap().await?;
            let events = bootstrap
                .events
                .iter()
                .filter(|e| e.finished)
                .map(|e| HistoricalEvent {
                    event: e.id,
                    name: e.name.clone(),
                    average_entry_score: e.average_entry_score,
                    highest_score: e.highest_score,
                })
                .collect();
            Ok(HistoricalView {
                events,
                total_players: bootstrap.total_players,
            })
        })
        .await
        .map_err(upstream_error)?;
    Ok(Json(view))
}

/// Chip usage for one league entry.
#[derive(Debug, Clone, Serialize)]
struct EntryChips {
    entry_id: u64,
    team_name: String,
    manager_name: String,
    chips: Vec<ChipPlay>,
}

async fn handle_chips(State(state): State<AppState>) -> Result<Json<Vec<EntryChips>>, AppError> {
    let fpl = state.fpl.clone();
    let entries = state.entries.clone();
    let list = state
        .caches
        .chips
        .get_or_fetch((), || async move {
            let mut out = Vec::with_capacity(entries.len());
            for &entry_id in entries.iter() {
                let info = fpl.entry(entry_id).await?;
                let history = fpl.entry_history(entry_id).await?;
                out.push(EntryChips {
                    entry_id,
                    team_name: info.name,
                    manager_name: format!(
                        "{} {}",
                        info.player_first_name, info.player_last_name
                    ),
                    chips: history.chips,
                });
            }
            Ok(out)
        })
        .await
        .map_err(upstream_error)?;
    Ok(Json(list))
}
