use chrono::{DateTime, Utc};
use common::Color;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An accepted placement as pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "pixel")]
pub struct PlacementEvent {
    pub version: u64,
    pub x: i32,
    pub y: i32,
    pub color: Color,
    pub last_update: DateTime<Utc>,
}

/// Recent placements, oldest first, for WebSocket catch-up.
#[derive(Clone)]
pub struct Journal {
    events: Arc<RwLock<VecDeque<PlacementEvent>>>,
    capacity: usize,
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(4096)))),
            capacity,
        }
    }

    pub async fn push(&self, event: PlacementEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut events = self.events.write().await;
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Events with a version greater than `version`.
    pub async fn since(&self, version: u64) -> Vec<PlacementEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.version > version)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(version: u64) -> PlacementEvent {
        PlacementEvent {
            version,
            x: 1,
            y: 2,
            color: Color::LAND,
            last_update: Utc::now(),
        }
    }

    #[tokio::test]
    async fn keeps_only_the_newest() {
        let journal = Journal::new(3);
        for v in 1..=5 {
            journal.push(event(v)).await;
        }
        assert_eq!(journal.len().await, 3);
        let versions: Vec<u64> = journal.since(0).await.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![3, 4, 5]);
        assert_eq!(journal.since(4).await.len(), 1);
        assert!(journal.since(5).await.is_empty());
    }

    #[test]
    fn event_json_is_tagged() {
        let json = serde_json::to_value(event(7)).unwrap();
        assert_eq!(json["type"], "pixel");
        assert_eq!(json["color"], "#6abe30");
        assert_eq!(json["version"], 7);
    }
}
