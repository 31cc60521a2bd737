//! Redis-backed event relay
//!
//! Each session owns two keys:
//! - `{prefix}:events:{session}:seq` a counter handing out positions
//! - `{prefix}:events:{session}:log` a sorted set scored by position
//!
//! Position assignment and the log write happen in one Lua script, so
//! concurrent appends to a session never collide or skip a position.

use super::{EventRelay, NewEvent, SessionEvent};
use crate::config::{EventsConfig, RedisConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const APPEND_SCRIPT: &str = r#"
local pos = redis.call('INCR', KEYS[1])
redis.call('ZADD', KEYS[2], pos, pos .. '|' .. ARGV[1])
local ttl = tonumber(ARGV[2])
if ttl > 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
  redis.call('EXPIRE', KEYS[2], ttl)
end
return pos
"#;

/// What is stored after the `{position}|` prefix of each log member
#[derive(Serialize, Deserialize)]
struct StoredEvent {
    #[serde(rename = "t")]
    event_type: String,
    #[serde(rename = "p")]
    payload: serde_json::Value,
    #[serde(rename = "c")]
    created_at: DateTime<Utc>,
}

pub struct RedisEventRelay {
    connection: ConnectionManager,
    append_script: Script,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisEventRelay {
    /// Connect to Redis
    pub async fn connect(redis: &RedisConfig, events: &EventsConfig) -> Result<Self> {
        let client = Client::open(redis.url.as_str()).map_err(|e| AppError::Configuration {
            message: format!("Invalid Redis URL: {}", e),
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::EventRelay {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection,
            append_script: Script::new(APPEND_SCRIPT),
            key_prefix: events.key_prefix.clone(),
            ttl_secs: events.ttl_secs,
        })
    }

    fn seq_key(&self, session_id: &str) -> String {
        format!("{}:events:{}:seq", self.key_prefix, session_id)
    }

    fn log_key(&self, session_id: &str) -> String {
        format!("{}:events:{}:log", self.key_prefix, session_id)
    }
}

/// Split a `{position}|{json}` member back into an event
fn decode_member(member: &str) -> Result<SessionEvent> {
    let (position, body) = member.split_once('|').ok_or_else(|| AppError::EventRelay {
        message: "Malformed event log entry".to_string(),
    })?;

    let position: u64 = position.parse().map_err(|_| AppError::EventRelay {
        message: format!("Malformed event position: {}", position),
    })?;
    let stored: StoredEvent = serde_json::from_str(body)?;

    Ok(SessionEvent {
        position,
        event_type: stored.event_type,
        payload: stored.payload,
        created_at: stored.created_at,
    })
}

#[async_trait]
impl EventRelay for RedisEventRelay {
    async fn append(&self, session_id: &str, event: NewEvent) -> Result<u64> {
        event.validate()?;

        let body = serde_json::to_string(&StoredEvent {
            event_type: event.event_type,
            payload: event.payload,
            created_at: Utc::now(),
        })?;

        let mut conn = self.connection.clone();
        let position: u64 = self
            .append_script
            .key(self.seq_key(session_id))
            .key(self.log_key(session_id))
            .arg(body)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        debug!(session_id = %session_id, position, "Appended session event");
        crate::metrics::record_event_append(self.backend());

        Ok(position)
    }

    async fn read_since(&self, session_id: &str, after: u64) -> Result<Vec<SessionEvent>> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn
            .zrangebyscore(self.log_key(session_id), format!("({}", after), "+inf")
            .await?;

        let mut events = Vec::with_capacity(members.len());
        for member in &members {
            match decode_member(member) {
                Ok(event) => events.push(event),
                Err(e) => {
                    // Surface rather than skip: a hole would break replay
                    warn!(session_id = %session_id, error = %e, "Unreadable event log entry");
                    return Err(e);
                }
            }
        }

        Ok(events)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
