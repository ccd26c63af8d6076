//! One physical pet door
//!
//! `PetDoor` wraps the transport for a single unit, mirrors the state the
//! door reports (panel position plus configuration flags) and exposes the
//! control operations the services map onto.

use crate::config::DoorConfig;
use chrono::{DateTime, Utc};
use petdoor_protocol::{
    ConfigCommand, DoorCommand, DoorStatus, DoorTransport, ProtocolError, Response, Settings,
    Side, TransportEvent,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Door errors
#[derive(Error, Debug)]
pub enum DoorError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Door not found: {0}")]
    NotFound(String),

    /// A toggle needs the current flag value, which the door has not
    /// reported yet
    #[error("Door {entity_id} has not reported {flag} yet")]
    StateUnknown {
        entity_id: String,
        flag: &'static str,
    },
}

/// Door-level events
#[derive(Debug, Clone)]
pub enum DoorEvent {
    /// The door became reachable or unreachable
    Availability { entity_id: String, available: bool },
    /// The panel moved
    StatusChanged {
        entity_id: String,
        status: DoorStatus,
    },
    /// One or more configuration flags changed
    SettingsChanged { entity_id: String },
}

/// Mutable state mirrored from the door
#[derive(Debug, Clone, Default)]
struct DoorState {
    status: Option<DoorStatus>,
    settings: Settings,
    last_change: Option<DateTime<Utc>>,
    available: bool,
}

/// A point-in-time view of one door, as served by the API
#[derive(Debug, Clone, Serialize)]
pub struct DoorSnapshot {
    pub entity_id: String,
    pub name: String,
    pub available: bool,
    pub status: Option<DoorStatus>,
    /// Whether the panel is anywhere other than resting closed
    pub open: Option<bool>,
    pub settings: Settings,
    pub last_change: Option<DateTime<Utc>>,
}

/// One physical Power Pet Door
pub struct PetDoor {
    entity_id: String,
    config: DoorConfig,
    transport: Arc<DoorTransport>,
    state: Arc<RwLock<DoorState>>,
    event_tx: broadcast::Sender<DoorEvent>,
}

impl PetDoor {
    /// Create a door from its config and start its background tasks
    ///
    /// `event_tx` is the shared hub channel door events are published on.
    #[must_use]
    pub fn new(config: DoorConfig, event_tx: broadcast::Sender<DoorEvent>) -> Arc<Self> {
        let transport = Arc::new(DoorTransport::connect(
            config.host.clone(),
            config.port,
            config.connect_options(),
        ));

        let door = Arc::new(Self {
            entity_id: config.entity_id(),
            config,
            transport,
            state: Arc::new(RwLock::new(DoorState::default())),
            event_tx,
        });

        door.clone().start_listener();
        door.clone().start_refresh();
        door
    }

    /// The entity id this door resolves under
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state snapshot
    pub async fn snapshot(&self) -> DoorSnapshot {
        let state = self.state.read().await;
        DoorSnapshot {
            entity_id: self.entity_id.clone(),
            name: self.config.name.clone(),
            available: state.available,
            status: state.status,
            open: state.status.map(DoorStatus::is_open),
            settings: state.settings.clone(),
            last_change: state.last_change,
        }
    }

    /// Enable the proximity sensor on `side`
    pub async fn enable_sensor(&self, side: Side) -> Result<(), DoorError> {
        self.transport
            .config(ConfigCommand::enable_sensor(side))
            .await?;
        Ok(())
    }

    /// Disable the proximity sensor on `side`
    pub async fn disable_sensor(&self, side: Side) -> Result<(), DoorError> {
        self.transport
            .config(ConfigCommand::disable_sensor(side))
            .await?;
        Ok(())
    }

    /// Flip the proximity sensor on `side`
    pub async fn toggle_sensor(&self, side: Side) -> Result<(), DoorError> {
        let current = {
            let state = self.state.read().await;
            match side {
                Side::Inside => state.settings.inside,
                Side::Outside => state.settings.outside,
            }
        };
        match current {
            Some(true) => self.disable_sensor(side).await,
            Some(false) => self.enable_sensor(side).await,
            None => Err(self.state_unknown(side.as_str())),
        }
    }

    /// Enable the timer schedule
    pub async fn enable_auto(&self) -> Result<(), DoorError> {
        self.transport.config(ConfigCommand::EnableTimers).await?;
        Ok(())
    }

    /// Disable the timer schedule
    pub async fn disable_auto(&self) -> Result<(), DoorError> {
        self.transport.config(ConfigCommand::DisableTimers).await?;
        Ok(())
    }

    /// Flip the timer schedule
    pub async fn toggle_auto(&self) -> Result<(), DoorError> {
        match self.state.read().await.settings.timers_enabled {
            Some(true) => self.disable_auto().await,
            Some(false) => self.enable_auto().await,
            None => Err(self.state_unknown("timersEnabled")),
        }
    }

    /// Power the unit on
    pub async fn power_on(&self) -> Result<(), DoorError> {
        self.transport.config(ConfigCommand::PowerOn).await?;
        Ok(())
    }

    /// Power the unit off
    pub async fn power_off(&self) -> Result<(), DoorError> {
        self.transport.config(ConfigCommand::PowerOff).await?;
        Ok(())
    }

    /// Flip the unit's power state
    pub async fn power_toggle(&self) -> Result<(), DoorError> {
        match self.state.read().await.settings.power_state {
            Some(true) => self.power_off().await,
            Some(false) => self.power_on().await,
            None => Err(self.state_unknown("power_state")),
        }
    }

    /// Open the door
    ///
    /// `hold: None` falls back to the configured hold flag.
    pub async fn open(&self, hold: Option<bool>) -> Result<(), DoorError> {
        let command = if hold.unwrap_or(self.config.hold) {
            DoorCommand::OpenAndHold
        } else {
            DoorCommand::Open
        };
        self.transport.command(command).await?;
        Ok(())
    }

    /// Close the door
    pub async fn close(&self) -> Result<(), DoorError> {
        self.transport.command(DoorCommand::Close).await?;
        Ok(())
    }

    fn state_unknown(&self, flag: &'static str) -> DoorError {
        DoorError::StateUnknown {
            entity_id: self.entity_id.clone(),
            flag,
        }
    }

    /// Mirror transport events into door state
    fn start_listener(self: Arc<Self>) {
        let mut rx = self.transport.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(TransportEvent::Connected) => {
                        self.set_available(true).await;
                        // Prime the settings cache on every (re)connect
                        let door = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                door.transport.config(ConfigCommand::GetSettings).await
                            {
                                tracing::warn!(
                                    "Failed to fetch settings for {}: {}",
                                    door.entity_id,
                                    e
                                );
                            }
                        });
                    }
                    Ok(TransportEvent::Disconnected) => {
                        self.set_available(false).await;
                    }
                    Ok(TransportEvent::Message(response)) => {
                        self.apply_message(&response).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Door {} lagged by {} events", self.entity_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Transport channel closed for {}", self.entity_id);
                        break;
                    }
                }
            }
        });
    }

    /// Re-request settings periodically so drift gets corrected
    fn start_refresh(self: Arc<Self>) {
        let interval = self.config.refresh_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                if !self.transport.is_connected() {
                    continue;
                }
                tracing::debug!("Refreshing settings for {}", self.entity_id);
                if let Err(e) = self.transport.config(ConfigCommand::GetSettings).await {
                    tracing::warn!("Settings refresh for {} failed: {}", self.entity_id, e);
                }
            }
        });
    }

    async fn set_available(&self, available: bool) {
        {
            let mut state = self.state.write().await;
            state.available = available;
        }
        let _ = self.event_tx.send(DoorEvent::Availability {
            entity_id: self.entity_id.clone(),
            available,
        });
    }

    /// Apply one message's state payload
    ///
    /// Every message is applied the same way whether it answered a request
    /// or arrived on its own; the door pushes unsolicited updates whenever
    /// the panel moves.
    async fn apply_message(&self, response: &Response) {
        if !response.success {
            return;
        }

        let mut status_event = None;
        let mut settings_changed = false;
        {
            let mut state = self.state.write().await;
            let state = &mut *state;

            if let Some(status) = response.door_status {
                if state.status != Some(status) {
                    if state.status.is_some() {
                        state.last_change = Some(Utc::now());
                    }
                    state.status = Some(status);
                    status_event = Some(status);
                }
            }

            if let Some(settings) = &response.settings {
                if state.settings != *settings {
                    state.settings = settings.clone();
                    settings_changed = true;
                }
            }

            for (value, slot) in [
                (response.inside, &mut state.settings.inside),
                (response.outside, &mut state.settings.outside),
                (response.power_state, &mut state.settings.power_state),
                (response.timers_enabled, &mut state.settings.timers_enabled),
            ] {
                if value.is_some() && *slot != value {
                    *slot = value;
                    settings_changed = true;
                }
            }
        }

        if let Some(status) = status_event {
            let _ = self.event_tx.send(DoorEvent::StatusChanged {
                entity_id: self.entity_id.clone(),
                status,
            });
        }
        if settings_changed {
            let _ = self.event_tx.send(DoorEvent::SettingsChanged {
                entity_id: self.entity_id.clone(),
            });
        }
    }
}
