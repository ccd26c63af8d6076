//! Door hub
//!
//! Keeps every configured door keyed by entity id and aggregates their
//! events onto one broadcast channel.

use crate::config::DoorConfig;
use crate::door::{DoorError, DoorEvent, DoorSnapshot, PetDoor};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Registry of live doors
pub struct DoorHub {
    doors: DashMap<String, Arc<PetDoor>>,
    event_tx: broadcast::Sender<DoorEvent>,
}

impl Default for DoorHub {
    fn default() -> Self {
        Self::new()
    }
}

impl DoorHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            doors: DashMap::new(),
            event_tx,
        }
    }

    /// Start a door from its config and register it
    ///
    /// A door with the same entity id replaces the previous one.
    pub fn add_door(&self, config: DoorConfig) -> Arc<PetDoor> {
        let door = PetDoor::new(config, self.event_tx.clone());
        let entity_id = door.entity_id().to_string();
        tracing::info!("Registering door {}", entity_id);
        if self.doors.insert(entity_id.clone(), door.clone()).is_some() {
            tracing::warn!("Replaced existing door {}", entity_id);
        }
        door
    }

    /// Look up a door by entity id
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<Arc<PetDoor>> {
        self.doors.get(entity_id).map(|r| r.value().clone())
    }

    /// Look up a door, failing with `NotFound`
    pub fn resolve(&self, entity_id: &str) -> Result<Arc<PetDoor>, DoorError> {
        self.get(entity_id)
            .ok_or_else(|| DoorError::NotFound(entity_id.to_string()))
    }

    /// Number of registered doors
    #[must_use]
    pub fn len(&self) -> usize {
        self.doors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doors.is_empty()
    }

    /// Snapshots of every door, sorted by entity id
    pub async fn snapshots(&self) -> Vec<DoorSnapshot> {
        let doors: Vec<Arc<PetDoor>> = self.doors.iter().map(|r| r.value().clone()).collect();
        let mut snapshots = Vec::with_capacity(doors.len());
        for door in doors {
            snapshots.push(door.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        snapshots
    }

    /// Subscribe to events from every door
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DoorEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config(name: &str) -> DoorConfig {
        let mut config = DoorConfig::new("127.0.0.1");
        config.port = 1;
        config.name = name.to_string();
        config
    }

    #[tokio::test]
    async fn test_resolution_by_entity_id() {
        let hub = DoorHub::new();
        hub.add_door(offline_config("Back Door"));
        hub.add_door(offline_config("Garage Flap"));

        assert_eq!(hub.len(), 2);
        assert!(hub.get("petdoor.back_door").is_some());
        assert!(hub.resolve("petdoor.garage_flap").is_ok());

        let err = hub.resolve("petdoor.front_door").unwrap_err();
        assert!(matches!(err, DoorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshots_are_sorted() {
        let hub = DoorHub::new();
        hub.add_door(offline_config("Zulu"));
        hub.add_door(offline_config("Alpha"));

        let snapshots = hub.snapshots().await;
        let ids: Vec<&str> = snapshots.iter().map(|s| s.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["petdoor.alpha", "petdoor.zulu"]);
    }
}
