//! Replay-from-N event streams
//!
//! A stream remembers the last position it yielded and keeps calling
//! `read_since` with it. Between reads it waits for either the relay's
//! doorbell (when the backend has one) or the poll interval. Dropping the
//! stream cancels it at the next await point.

use super::{EventRelay, SessionEvent};
use crate::errors::Result;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

struct StreamState {
    relay: Arc<dyn EventRelay>,
    session_id: String,
    last_position: u64,
    pending: VecDeque<SessionEvent>,
    doorbell: Option<broadcast::Receiver<u64>>,
    subscribed: bool,
    ticker: Interval,
    finished: bool,
}

impl StreamState {
    async fn wait(&mut self) {
        match self.doorbell.as_mut() {
            Some(doorbell) => {
                tokio::select! {
                    rung = doorbell.recv() => {
                        if let Err(RecvError::Closed) = rung {
                            self.doorbell = None;
                        }
                    }
                    _ = self.ticker.tick() => {}
                }
            }
            None => {
                self.ticker.tick().await;
            }
        }
    }
}

/// Stream every event after `after`, ending after a terminal event
pub fn event_stream(
    relay: Arc<dyn EventRelay>,
    session_id: impl Into<String>,
    after: u64,
    poll_interval: Duration,
) -> impl Stream<Item = Result<SessionEvent>> + Send {
    let poll_interval = poll_interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = StreamState {
        relay,
        session_id: session_id.into(),
        last_position: after,
        pending: VecDeque::new(),
        doorbell: None,
        subscribed: false,
        ticker,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                state.last_position = event.position;
                if event.is_terminal() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((Ok(event), state));
            }

            if state.finished {
                return None;
            }

            // Subscribe before the first read so no append slips between them
            if !state.subscribed {
                state.doorbell = state.relay.subscribe(&state.session_id).await;
                state.subscribed = true;
            }

            match state
                .relay
                .read_since(&state.session_id, state.last_position)
                .await
            {
                Ok(events) if !events.is_empty() => {
                    state.pending.extend(events);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            }

            state.wait().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InMemoryEventRelay, NewEvent};
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_stream_replays_and_stops_at_done() {
        let relay = Arc::new(InMemoryEventRelay::new());
        for kind in ["start", "progress", "done", "late"] {
            relay.append("s", NewEvent::new(kind, json!({}))).await.unwrap();
        }

        let events: Vec<SessionEvent> = event_stream(relay, "s", 0, Duration::from_millis(10))
            .map(|e| e.unwrap())
            .collect()
            .await;

        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["start", "progress", "done"]);
    }

    #[tokio::test]
    async fn test_stream_resumes_after_position() {
        let relay = Arc::new(InMemoryEventRelay::new());
        for kind in ["a", "b", "error"] {
            relay.append("s", NewEvent::new(kind, json!({}))).await.unwrap();
        }

        let positions: Vec<u64> = event_stream(relay, "s", 1, Duration::from_millis(10))
            .map(|e| e.unwrap().position)
            .collect()
            .await;
        assert_eq!(positions, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_doorbell_wakes_stream_before_poll_interval() {
        let relay = Arc::new(InMemoryEventRelay::new());
        let producer = relay.clone();

        let stream = event_stream(relay, "s", 0, Duration::from_secs(3600));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.append("s", NewEvent::new("done", json!({}))).await.unwrap();
        });

        let events = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
            .await
            .expect("stream should be woken by the append");
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_it() {
        let relay = Arc::new(InMemoryEventRelay::new());
        let mut stream = Box::pin(event_stream(relay, "idle", 0, Duration::from_millis(5)));

        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err());
        drop(stream);
    }
}
