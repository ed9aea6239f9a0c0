//! The per-connection session loop.
//!
//! One task per socket: the inbound half is read here, the outbound half is
//! owned by a spawned writer that drains the session channel and drives the
//! ping/pong liveness cycle. Teardown always unregisters the session, so a
//! crashed reader can never leave a ghost recipient in the registry.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use gridcast_core::{Meta, ResponseEnvelope};
use metrics::{counter, gauge, histogram};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::server::AppState;
use super::connection::SessionHandle;
use super::dispatch::{DispatchContext, dispatch};

/// Outbound queue depth per session. A client that falls this far behind
/// starts losing broadcasts rather than stalling the senders.
const OUTBOUND_BUFFER: usize = 1024;

/// Text sentinel a client sends to request a graceful close.
const CLOSE_SENTINEL: &str = "close";

/// How long teardown waits for the writer to flush and close the socket.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drive one accepted WebSocket until the client leaves, the transport
/// dies, or the server shuts down.
pub async fn run_session(socket: WebSocket, uid: String, color: String, state: Arc<AppState>) {
    let (ws_tx, ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel::<Arc<String>>(OUTBOUND_BUFFER);
    let session = Arc::new(SessionHandle::new(uid, color, tx));

    state.registry.add(Arc::clone(&session)).await;
    counter!(crate::metrics::WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(crate::metrics::WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(
        session_id = %session.id,
        uid = %session.uid,
        connections = state.registry.connection_count(),
        "session opened"
    );

    // The color assignment must be the first thing the client sees.
    let greeting = ResponseEnvelope::data(
        json!({ "color": session.color }),
        Meta::event("userColor"),
    );
    let _ = session.send_envelope(&greeting);

    let close_signal = CancellationToken::new();
    let writer = tokio::spawn(write_loop(
        ws_tx,
        rx,
        Arc::clone(&session),
        Duration::from_secs(state.config.ping_interval_secs),
        Duration::from_secs(state.config.pong_timeout_secs),
        Arc::clone(&state),
        close_signal.clone(),
    ));

    read_loop(ws_rx, &session, &state).await;

    // Teardown. Unregister first so no new broadcasts enter the queue,
    // then let the writer flush what is queued and complete the closing
    // handshake.
    state.registry.remove(&session.id).await;
    close_signal.cancel();
    let writer_abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!(session_id = %session.id, "writer did not drain in time, aborting");
        writer_abort.abort();
    }
    counter!(crate::metrics::WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(crate::metrics::WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(crate::metrics::WS_CONNECTION_DURATION_SECONDS)
        .record(session.age().as_secs_f64());
    info!(
        session_id = %session.id,
        uid = %session.uid,
        duration_secs = session.age().as_secs(),
        dropped = session.drop_count(),
        "session closed"
    );
}

/// Inbound half: sentinel check, rate limiting, decode, dispatch.
async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    session: &Arc<SessionHandle>,
    state: &Arc<AppState>,
) {
    let ctx = DispatchContext {
        store: Arc::clone(&state.store),
        registry: Arc::clone(&state.registry),
        broadcaster: Arc::clone(&state.broadcaster),
    };

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                session.mark_alive();

                // The close sentinel is honored even for a limited client.
                if text.as_str() == CLOSE_SENTINEL {
                    debug!(session_id = %session.id, "client requested close");
                    break;
                }

                if !state.limiter.allow(&session.uid) {
                    counter!(crate::metrics::WS_RATE_LIMITED_TOTAL).increment(1);
                    warn!(session_id = %session.id, uid = %session.uid, "rate limited");
                    let _ = session
                        .send_envelope(&ResponseEnvelope::warning(state.limiter.warning_message()));
                    continue;
                }

                match serde_json::from_str::<Value>(text.as_str()) {
                    Ok(raw) => dispatch(&raw, session, &ctx).await,
                    Err(e) => {
                        // Undecodable frames are dropped without a reply.
                        debug!(session_id = %session.id, error = %e, "ignoring non-JSON frame");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(session_id = %session.id, "ignoring binary frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => session.mark_alive(),
            Ok(Message::Close(_)) => {
                debug!(session_id = %session.id, "client closed connection");
                break;
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "websocket transport error");
                break;
            }
        }
    }
}

/// Outbound half: drains the session channel, pings on an interval, and
/// closes the socket when the client stops answering or the server stops.
///
/// When `close_signal` fires the remaining queue is flushed and a Close
/// frame completes the handshake before the task exits.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<String>>,
    session: Arc<SessionHandle>,
    ping_interval: Duration,
    pong_timeout: Duration,
    state: Arc<AppState>,
    close_signal: CancellationToken,
) {
    let cancel = state.shutdown.token();
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval fires immediately; skip that tick so the first ping waits.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(text) => {
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        debug!(session_id = %session.id, "send failed, socket gone");
                        break;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !session.check_alive() && session.last_pong_elapsed() >= pong_timeout {
                    warn!(
                        session_id = %session.id,
                        elapsed_secs = session.last_pong_elapsed().as_secs(),
                        "no pong within timeout, closing"
                    );
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            () = close_signal.cancelled() => {
                // Flush replies queued before the session ended, then
                // complete the closing handshake.
                while let Ok(text) = rx.try_recv() {
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            () = cancel.cancelled() => {
                debug!(session_id = %session.id, "server shutting down, closing session");
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
