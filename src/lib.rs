//! # fplsync
//!
//! A content-addressed sync server for Fantasy Premier League dashboards.
//!
//! A background worker periodically scrapes per-gameweek roster snapshots,
//! deduplicates them by content digest, uploads novel versions to a blob
//! store under immutable names, and maintains an in-memory manifest that
//! points every gameweek at its latest version. Manifest changes fan out
//! to connected dashboards over SSE; a set of TTL-cached read endpoints
//! proxies the FPL origin API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌────────┐   ┌──────────┐   ┌──────────┐   ┌───────┐
//! │ Scraper  │──▶│ Dedup  │──▶│   Blob   │──▶│ Manifest │──▶│  SSE  │
//! │ (origin) │   │ (hash) │   │  upload  │   │  replace │   │ fanout│
//! └─────────┘   └────────┘   └──────────┘   └──────────┘   └───────┘
//!                                                │
//!                              HTTP reads ◀──────┘  + TTL caches ◀── origin
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`digest`] | Content digests and blob naming |
//! | [`dedup`] | Duplicate-upload suppression |
//! | [`manifest`] | Authoritative manifest store |
//! | [`cache`] | Generic TTL cache |
//! | [`notify`] | Update-event fanout |
//! | [`stream`] | Per-client SSE session state machine |
//! | [`fpl`] | Typed FPL origin client |
//! | [`blob`] | Blob-store collaborator |
//! | [`scrape`] | Snapshot scraper collaborator |
//! | [`gameday`] | Refresh-interval heuristic |
//! | [`worker`] | Background refresh cycle |
//! | [`server`] | HTTP/SSE server |

pub mod blob;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod digest;
pub mod fpl;
pub mod gameday;
pub mod manifest;
pub mod notify;
pub mod scrape;
pub mod server;
pub mod stream;
pub mod worker;
