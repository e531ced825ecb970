//! Per-client live-update session.
//!
//! One session runs per SSE connection and moves through
//! `CONNECTING → STREAMING → (RETRYING | TERMINATED)`:
//!
//! - **CONNECTING** — subscribe to the notification channel and emit a
//!   `connected` event to the client.
//! - **STREAMING** — forward every published event verbatim. When nothing
//!   real has been forwarded for [`HEARTBEAT_INTERVAL`], synthesize a
//!   `heartbeat` frame; heartbeats do not reset the staleness clock. When
//!   no real event has arrived for [`STALE_AFTER`], the subscription is
//!   considered dead.
//! - **RETRYING** — drop the subscription, back off `2^retry` seconds, and
//!   reconnect, up to [`MAX_RETRIES`] attempts.
//! - **TERMINATED** — after exhausting retries, emit a terminal `error`
//!   frame and stop.
//!
//! A client disconnect shows up as a failed send on the outbound channel
//! and ends the session immediately, in any state, releasing the
//! subscription handle.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::notify::{UpdateEvent, UpdatePublisher};

/// Idle time before a synthetic heartbeat frame is sent.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Time without a real forwarded event before the subscription is presumed dead.
pub const STALE_AFTER: Duration = Duration::from_secs(300);
/// Reconnection attempts before the session gives up.
pub const MAX_RETRIES: u32 = 3;

/// Outbound frame buffer per client.
const CLIENT_BUFFER: usize = 32;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away (outbound send failed).
    Disconnected,
    /// All reconnect attempts were used up; a terminal error frame was sent.
    RetriesExhausted,
}

/// Why one streaming phase stopped.
enum StreamExit {
    Disconnected,
    /// No real event within [`STALE_AFTER`].
    Stale,
    /// The broadcast channel lagged or closed under us.
    ChannelError,
}

/// Spawn a session task for one client and return the frame receiver to
/// hand to the SSE response body. Dropping the receiver disconnects the
/// session.
pub fn spawn_session(publisher: std::sync::Arc<UpdatePublisher>) -> mpsc::Receiver<UpdateEvent> {
    let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
    tokio::spawn(async move {
        let end = run_session(&publisher, tx).await;
        log::debug!("[sse] session ended: {:?}", end);
    });
    rx
}

/// Drive one client session to completion.
pub async fn run_session(
    publisher: &UpdatePublisher,
    client: mpsc::Sender<UpdateEvent>,
) -> SessionEnd {
    let mut retry_count = 0u32;

    while retry_count < MAX_RETRIES {
        // CONNECTING
        let mut events = publisher.subscribe();
        if client.send(UpdateEvent::connected()).await.is_err() {
            return SessionEnd::Disconnected;
        }

        // STREAMING
        match stream_events(&mut events, &client).await {
            StreamExit::Disconnected => return SessionEnd::Disconnected,
            StreamExit::Stale => {
                log::warn!("[sse] connection appears stale, reconnecting");
            }
            StreamExit::ChannelError => {
                log::warn!("[sse] notification channel error, reconnecting");
            }
        }
        drop(events);

        // RETRYING
        retry_count += 1;
        if retry_count < MAX_RETRIES {
            tokio::time::sleep(Duration::from_secs(1 << retry_count)).await;
        }
    }

    // TERMINATED
    let _ = client.send(UpdateEvent::error("Connection lost")).await;
    SessionEnd::RetriesExhausted
}

async fn stream_events(
    events: &mut broadcast::Receiver<UpdateEvent>,
    client: &mpsc::Sender<UpdateEvent>,
) -> StreamExit {
    let mut last_message = Instant::now();
    let mut last_heartbeat = Instant::now();

    loop {
        tokio::select! {
            biased;

            received = events.recv() => match received {
                Ok(event) => {
                    if client.send(event).await.is_err() {
                        return StreamExit::Disconnected;
                    }
                    let now = Instant::now();
                    last_message = now;
                    last_heartbeat = now;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("[sse] subscriber lagged, {} event(s) lost", skipped);
                    return StreamExit::ChannelError;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return StreamExit::ChannelError;
                }
            },

            _ = tokio::time::sleep_until(last_message + STALE_AFTER) => {
                return StreamExit::Stale;
            }

            _ = tokio::time::sleep_until(last_heartbeat + HEARTBEAT_INTERVAL) => {
                if client.send(UpdateEvent::heartbeat()).await.is_err() {
                    return StreamExit::Disconnected;
                }
                // Heartbeats keep the client informed but do not count as
                // activity: last_message stays put.
                last_heartbeat = Instant::now();
            }
        }
    }
}
