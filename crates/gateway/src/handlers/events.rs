//! Session event handlers
//!
//! Agent runs append progress events to a per-session log; clients read
//! it back by position, either one poll at a time or as an SSE stream.
//! Logs are keyed by organization so sessions never leak across tenants.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use crate::AppState;
use ragforge_common::{
    auth::TenantContext,
    errors::Result,
    events::{event_stream, scoped_session_id, NewEvent, SessionEvent},
};

#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    /// Return events with a position greater than this
    #[serde(default)]
    pub after: Option<u64>,
}

#[derive(Serialize)]
pub struct AppendResponse {
    pub position: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub session_id: String,
    pub events: Vec<SessionEvent>,
    /// Position to pass as `after` on the next poll
    pub last_position: u64,
}

/// Append an event to a session log
pub async fn append_event(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(session_id): Path<String>,
    Json(event): Json<NewEvent>,
) -> Result<(StatusCode, Json<AppendResponse>)> {
    event.validate()?;

    let key = scoped_session_id(&tenant.organization_id, &session_id)?;
    let position = state.events.append(&key, event).await?;

    Ok((StatusCode::CREATED, Json(AppendResponse { position })))
}

/// One poll: every event after `after`
pub async fn read_events(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(session_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ReadResponse>> {
    let after = query.after.unwrap_or(0);
    let key = scoped_session_id(&tenant.organization_id, &session_id)?;
    let events = state.events.read_since(&key, after).await?;
    let last_position = events.last().map(|e| e.position).unwrap_or(after);

    Ok(Json(ReadResponse {
        session_id,
        events,
        last_position,
    }))
}

/// Resume point: `?after=N`, else the `Last-Event-ID` header, else the start
fn resume_position(query: &ReadQuery, headers: &HeaderMap) -> u64 {
    query
        .after
        .or_else(|| {
            headers
                .get("last-event-id")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
        .unwrap_or(0)
}

/// Server-sent event stream of a session log.
///
/// Each event is one `data:` frame carrying its JSON, with the position as
/// the frame id. Heartbeat comments keep idle connections open. The stream
/// closes after a `done` or `error` event, or when the client goes away.
pub async fn stream_events(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(session_id): Path<String>,
    Query(query): Query<ReadQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let after = resume_position(&query, &headers);
    let key = scoped_session_id(&tenant.organization_id, &session_id)?;

    tracing::debug!(session = %key, after, "SSE stream opened");

    let poll_interval = state.config.events.poll_interval();
    let heartbeat = state.config.events.heartbeat();

    let stream = event_stream(state.events.clone(), key, after, poll_interval).map(|item| {
        let frame = match item {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Event::default().id(event.position.to_string()).data(json),
                Err(e) => Event::default().event("error").data(e.to_string()),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Event stream read failed");
                Event::default().event("error").data(e.to_string())
            }
        };
        Ok(frame)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_resume_position_prefers_query() {
        let mut headers = HeaderMap::new();
        headers.insert("last-event-id", HeaderValue::from_static("7"));

        assert_eq!(resume_position(&ReadQuery { after: Some(3) }, &headers), 3);
        assert_eq!(resume_position(&ReadQuery { after: None }, &headers), 7);
        assert_eq!(resume_position(&ReadQuery { after: None }, &HeaderMap::new()), 0);
    }
}
