//! Protocol dispatch — validates inbound envelopes and routes them to the
//! range / update handlers.

use std::sync::Arc;
use std::time::Instant;

use gridcast_core::{Meta, RequestEnvelope, ResponseEnvelope, Voxel};
use gridcast_store::validate::validate_payload;
use gridcast_store::GridStore;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use super::broadcast::Broadcaster;
use super::connection::SessionHandle;
use super::registry::SessionRegistry;

/// Shared collaborators every handler needs.
pub struct DispatchContext {
    /// The external grid store.
    pub store: Arc<dyn GridStore>,
    /// Live session set (color lookup for owner stamping).
    pub registry: Arc<SessionRegistry>,
    /// Fan-out engine for accepted updates.
    pub broadcaster: Arc<Broadcaster>,
}

/// Route one decoded message for `session`.
///
/// Responses (success or error) are queued on the session's own channel;
/// an accepted update additionally goes to the broadcaster. Every response
/// carries `meta = {id, type}` echoed from the request — the caller's only
/// ordering guarantee.
#[instrument(skip_all, fields(session_id = %session.id, method))]
pub async fn dispatch(raw: &Value, session: &Arc<SessionHandle>, ctx: &DispatchContext) {
    let request = match RequestEnvelope::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            // Best-effort correlation for a message we could not accept.
            let meta = Meta {
                id: raw.get("id").cloned(),
                kind: raw
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_lowercase),
            };
            let _ = session.send_envelope(&ResponseEnvelope::error(e.to_string(), meta));
            return;
        }
    };

    let _ = tracing::Span::current().record("method", request.kind.as_str());
    debug!(method = request.kind, "dispatching request");

    let method_label = match request.kind.as_str() {
        known @ ("range" | "update") => known.to_owned(),
        _ => "unknown".to_owned(),
    };
    counter!(crate::metrics::GRID_REQUESTS_TOTAL, "method" => method_label.clone()).increment(1);
    let start = Instant::now();

    match request.kind.as_str() {
        "range" => retrieve(&request, session, ctx).await,
        "update" => place(&request, session, ctx).await,
        other => {
            warn!(method = other, "unknown method");
            let _ = session.send_envelope(&ResponseEnvelope::error(
                "Unknown method or no method specified",
                request.meta(),
            ));
        }
    }

    histogram!(crate::metrics::GRID_REQUEST_DURATION_SECONDS, "method" => method_label)
        .record(start.elapsed().as_secs_f64());
}

/// Range query: read-only box lookup around `(x, y)`.
async fn retrieve(request: &RequestEnvelope, session: &Arc<SessionHandle>, ctx: &DispatchContext) {
    let x = request.args.get("x").and_then(Value::as_i64).unwrap_or(0);
    let y = request.args.get("y").and_then(Value::as_i64).unwrap_or(0);
    let range = request
        .args
        .get("range")
        .and_then(Value::as_i64)
        .unwrap_or(25);

    let envelope = match ctx.store.query_cells(x, y, range).await {
        Ok(cells) => match serde_json::to_value(&cells) {
            Ok(data) => ResponseEnvelope::data(data, request.meta()),
            Err(e) => {
                error!(error = %e, "failed to serialize range result");
                ResponseEnvelope::error("Internal server error", request.meta())
            }
        },
        Err(e) => {
            warn!(x, y, range, error = %e, "range query failed");
            ResponseEnvelope::error_value(e.client_message(), request.meta())
        }
    };
    let _ = session.send_envelope(&envelope);
}

/// Update: validate, stamp ownership, persist, broadcast.
async fn place(request: &RequestEnvelope, session: &Arc<SessionHandle>, ctx: &DispatchContext) {
    // `name` is untrusted client input; drop it before validation.
    let mut args = request.args.clone();
    if let Some(obj) = args.as_object_mut() {
        let _ = obj.remove("name");
    }

    if !validate_payload(&args) {
        let _ = session.send_envelope(&ResponseEnvelope::error("Invalid payload", request.meta()));
        return;
    }

    // Identity resolution precedes message handling, so a missing color
    // means the registry and the session loop disagree about liveness.
    let Some(color) = ctx.registry.color_of(&session.id).await else {
        error!(session_id = %session.id, "no color registered for live session");
        let _ = session.send_envelope(&ResponseEnvelope::error(
            "Internal server error",
            request.meta(),
        ));
        return;
    };

    let x = args.get("x").and_then(Value::as_i64).unwrap_or(0);
    let y = args.get("y").and_then(Value::as_i64).unwrap_or(0);

    match ctx.store.upsert_cell(Voxel::new(x, y, color)).await {
        Ok(stored) => {
            debug!(x, y, owner = %stored.owner, "stored update, broadcasting");
            ctx.broadcaster.broadcast(&stored, request.meta()).await;
        }
        Err(e) => {
            warn!(x, y, error = %e, "update rejected by store");
            let _ = session
                .send_envelope(&ResponseEnvelope::error_value(e.client_message(), request.meta()));
        }
    }
}
