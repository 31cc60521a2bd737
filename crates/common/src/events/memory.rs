//! In-process event relay with wake-up subscriptions

use super::{EventRelay, NewEvent, SessionEvent};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

const DOORBELL_CAPACITY: usize = 64;

struct SessionLog {
    events: Vec<SessionEvent>,
    doorbell: broadcast::Sender<u64>,
}

impl SessionLog {
    fn new() -> Self {
        let (doorbell, _) = broadcast::channel(DOORBELL_CAPACITY);
        Self {
            events: Vec::new(),
            doorbell,
        }
    }
}

/// Per-session logs behind their own locks, so appends to different
/// sessions never contend
#[derive(Default)]
pub struct InMemoryEventRelay {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionLog>>>>,
}

impl InMemoryEventRelay {
    pub fn new() -> Self {
        Self::default()
    }

    async fn session(&self, session_id: &str) -> Arc<Mutex<SessionLog>> {
        if let Some(log) = self.sessions.read().await.get(session_id) {
            return log.clone();
        }

        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionLog::new())))
            .clone()
    }
}

#[async_trait]
impl EventRelay for InMemoryEventRelay {
    async fn append(&self, session_id: &str, event: NewEvent) -> Result<u64> {
        event.validate()?;

        let log = self.session(session_id).await;
        let mut log = log.lock().await;

        let position = log.events.len() as u64 + 1;
        log.events.push(SessionEvent {
            position,
            event_type: event.event_type,
            payload: event.payload,
            created_at: Utc::now(),
        });

        // No subscribers is fine
        let _ = log.doorbell.send(position);
        crate::metrics::record_event_append(self.backend());

        Ok(position)
    }

    async fn read_since(&self, session_id: &str, after: u64) -> Result<Vec<SessionEvent>> {
        let log = match self.sessions.read().await.get(session_id) {
            Some(log) => log.clone(),
            None => return Ok(Vec::new()),
        };
        let log = log.lock().await;

        // Positions are dense from 1, so position p lives at index p - 1
        let start = usize::try_from(after).unwrap_or(usize::MAX);
        Ok(log.events.get(start..).map(<[_]>::to_vec).unwrap_or_default())
    }

    async fn subscribe(&self, session_id: &str) -> Option<broadcast::Receiver<u64>> {
        let log = self.session(session_id).await;
        let receiver = log.lock().await.doorbell.subscribe();
        Some(receiver)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: &str) -> NewEvent {
        NewEvent::new(kind, json!({}))
    }

    #[tokio::test]
    async fn test_positions_start_at_one_without_gaps() {
        let relay = InMemoryEventRelay::new();
        assert_eq!(relay.append("s1", event("a")).await.unwrap(), 1);
        assert_eq!(relay.append("s1", event("b")).await.unwrap(), 2);
        assert_eq!(relay.append("s2", event("c")).await.unwrap(), 1);

        let events = relay.read_since("s1", 0).await.unwrap();
        let positions: Vec<u64> = events.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(events[1].event_type, "b");
    }

    #[tokio::test]
    async fn test_read_since_is_repeatable() {
        let relay = InMemoryEventRelay::new();
        for kind in ["a", "b", "c"] {
            relay.append("s", event(kind)).await.unwrap();
        }

        let first = relay.read_since("s", 1).await.unwrap();
        let second = relay.read_since("s", 1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(relay.read_since("s", 3).await.unwrap().is_empty());
        assert!(relay.read_since("s", 99).await.unwrap().is_empty());
        assert!(relay.read_since("unknown", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_dense() {
        let relay = Arc::new(InMemoryEventRelay::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let relay = relay.clone();
            handles.push(tokio::spawn(async move {
                relay.append("s", event(&format!("e{}", i))).await.unwrap()
            }));
        }

        let mut positions = Vec::new();
        for handle in handles {
            positions.push(handle.await.unwrap());
        }
        positions.sort_unstable();
        assert_eq!(positions, (1..=50).collect::<Vec<u64>>());

        let events = relay.read_since("s", 0).await.unwrap();
        assert!(events.windows(2).all(|w| w[1].position == w[0].position + 1));
    }

    #[tokio::test]
    async fn test_subscription_rings_on_append() {
        let relay = InMemoryEventRelay::new();
        let mut doorbell = relay.subscribe("s").await.unwrap();
        relay.append("s", event("a")).await.unwrap();
        assert_eq!(doorbell.recv().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_type_rejected() {
        let relay = InMemoryEventRelay::new();
        assert!(relay.append("s", event("")).await.is_err());
        assert!(relay.read_since("s", 0).await.unwrap().is_empty());
    }
}
