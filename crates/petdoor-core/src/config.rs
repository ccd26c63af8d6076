//! Door configuration

use petdoor_protocol::transport::{ConnectOptions, DEFAULT_PORT};
use petdoor_services::DOMAIN;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Configuration for one physical door
///
/// Interval fields are in seconds, matching the original platform schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorConfig {
    /// Display name
    #[serde(default = "default_name")]
    pub name: String,
    /// Host name or address of the door unit
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect timeout, seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Delay before reconnecting, seconds
    #[serde(default = "default_reconnect")]
    pub reconnect: u64,
    /// Idle time before a keepalive ping, seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
    /// Interval between settings refreshes, seconds
    #[serde(default = "default_refresh")]
    pub refresh: u64,
    /// Whether `open` holds the door open by default
    #[serde(default = "default_hold")]
    pub hold: bool,
    /// Explicit entity id; derived from the name when absent
    #[serde(default)]
    pub entity_id: Option<String>,
}

fn default_name() -> String {
    "Power Pet Door".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    5
}

fn default_reconnect() -> u64 {
    30
}

fn default_keep_alive() -> u64 {
    30
}

fn default_refresh() -> u64 {
    300
}

fn default_hold() -> bool {
    true
}

impl DoorConfig {
    /// Minimal config for a door at `host`, everything else defaulted
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            host: host.into(),
            port: default_port(),
            timeout: default_timeout(),
            reconnect: default_reconnect(),
            keep_alive: default_keep_alive(),
            refresh: default_refresh(),
            hold: default_hold(),
            entity_id: None,
        }
    }

    /// The entity id this door registers under
    #[must_use]
    pub fn entity_id(&self) -> String {
        self.entity_id
            .clone()
            .unwrap_or_else(|| format!("{DOMAIN}.{}", slugify(&self.name)))
    }

    /// Transport options derived from the interval fields
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_secs(self.timeout),
            reconnect: Duration::from_secs(self.reconnect),
            keep_alive: Duration::from_secs(self.keep_alive),
        }
    }

    /// The settings refresh interval
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh)
    }
}

/// Lowercase a display name into an entity object id
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Load door configs from a JSON file
///
/// A missing file is an empty deployment, not an error.
pub async fn load_doors(path: &Path) -> Vec<DoorConfig> {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<Vec<DoorConfig>>(&contents) {
            Ok(doors) => {
                tracing::info!("Loaded {} doors from {:?}", doors.len(), path);
                doors
            }
            Err(e) => {
                tracing::warn!("Failed to parse doors file {:?}: {}", path, e);
                Vec::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No doors file found at {:?}", path);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("Failed to read doors file {:?}: {}", path, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: DoorConfig = serde_json::from_str(r#"{"host":"10.0.0.5"}"#).unwrap();
        assert_eq!(config.name, "Power Pet Door");
        assert_eq!(config.port, 3000);
        assert_eq!(config.timeout, 5);
        assert_eq!(config.reconnect, 30);
        assert_eq!(config.keep_alive, 30);
        assert_eq!(config.refresh, 300);
        assert!(config.hold);
        assert_eq!(config.entity_id(), "petdoor.power_pet_door");
    }

    #[test]
    fn test_explicit_entity_id_wins() {
        let config: DoorConfig =
            serde_json::from_str(r#"{"host":"10.0.0.5","entity_id":"petdoor.garage"}"#).unwrap();
        assert_eq!(config.entity_id(), "petdoor.garage");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Back Door"), "back_door");
        assert_eq!(slugify("  Patio -- door 2 "), "patio_door_2");
        assert_eq!(slugify("Flap"), "flap");
    }
}
