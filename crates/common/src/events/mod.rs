//! Session event relay
//!
//! An append-only, per-session ordered log used to surface agent progress:
//! - `append` assigns the next position atomically per session (first is 1)
//! - `read_since(session, n)` returns every event with position > n
//! - `event_stream` turns the log into a stream that replays from a position
//!
//! Backends:
//! - `RedisEventRelay` for multi-process deployments (polled)
//! - `InMemoryEventRelay` for a single process, with a wake-up subscription
//!
//! Positions are the only source of ordering. A subscription is a doorbell
//! that says "read again", never a delivery channel.

mod memory;
mod redis_relay;
mod stream;

pub use memory::InMemoryEventRelay;
pub use redis_relay::RedisEventRelay;
pub use stream::event_stream;

use crate::config::{EventsConfig, RedisConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event types that end a stream
pub const TERMINAL_EVENT_TYPES: &[&str] = &["done", "error"];

/// An event as submitted by a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_type.trim().is_empty() {
            return Err(AppError::validation("type", "event type must not be empty"));
        }
        Ok(())
    }
}

/// A stored event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub position: u64,

    #[serde(rename = "type")]
    pub event_type: String,

    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        TERMINAL_EVENT_TYPES.contains(&self.event_type.as_str())
    }
}

/// Append-only per-session event log
#[async_trait]
pub trait EventRelay: Send + Sync {
    /// Append an event and return its position
    async fn append(&self, session_id: &str, event: NewEvent) -> Result<u64>;

    /// Every event with position strictly greater than `after`, in order
    async fn read_since(&self, session_id: &str, after: u64) -> Result<Vec<SessionEvent>>;

    /// Wake-up notifications for a session, when the backend can push.
    /// Each message is the position of a newly appended event.
    async fn subscribe(&self, _session_id: &str) -> Option<broadcast::Receiver<u64>> {
        None
    }

    /// Backend name for logs and metrics
    fn backend(&self) -> &'static str;
}

/// Joins organization and session in a log key; allowed in neither part
const SESSION_KEY_SEPARATOR: char = '/';

/// Session log key for a tenant-owned session.
///
/// Both parts must be non-empty and free of the separator, otherwise two
/// different (organization, session) pairs could map to one log.
pub fn scoped_session_id(organization_id: &str, session_id: &str) -> Result<String> {
    for (field, value) in [("organizationId", organization_id), ("sessionId", session_id)] {
        if value.trim().is_empty() {
            return Err(AppError::validation(field, format!("{} must not be empty", field)));
        }
        if value.contains(SESSION_KEY_SEPARATOR) {
            return Err(AppError::validation(
                field,
                format!("{} must not contain '{}'", field, SESSION_KEY_SEPARATOR),
            ));
        }
    }
    Ok(format!("{}{}{}", organization_id, SESSION_KEY_SEPARATOR, session_id))
}

/// Create an event relay based on configuration
pub async fn create_event_relay(
    events: &EventsConfig,
    redis: &RedisConfig,
) -> Result<Arc<dyn EventRelay>> {
    match events.backend.as_str() {
        "redis" => Ok(Arc::new(RedisEventRelay::connect(redis, events).await?)),
        "memory" => Ok(Arc::new(InMemoryEventRelay::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown event relay backend: {}", other),
        }),
    }
}
