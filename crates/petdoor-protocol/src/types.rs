//! Common types used throughout the protocol

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Transport not connected")]
    NotConnected,

    #[error("Door rejected command: {command}")]
    Rejected { command: String },
}

/// Which proximity sensor a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Inside,
    Outside,
}

impl Side {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Inside => "inside",
            Side::Outside => "outside",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inside" => Ok(Side::Inside),
            "outside" => Ok(Side::Outside),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown sensor side: {other}"
            ))),
        }
    }
}

/// Door position as reported by the unit
///
/// The unit reports a handful of transitional states while the panel is
/// moving; anything that is neither idle nor closed counts as open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorStatus {
    #[serde(rename = "DOOR_IDLE")]
    Idle,
    #[serde(rename = "DOOR_CLOSED")]
    Closed,
    #[serde(rename = "DOOR_RISING")]
    Rising,
    #[serde(rename = "DOOR_SLOWING")]
    Slowing,
    #[serde(rename = "DOOR_HOLDING")]
    Holding,
    #[serde(rename = "DOOR_KEEPUP")]
    KeepUp,
    #[serde(rename = "DOOR_CLOSING_TOP_OPEN")]
    ClosingTopOpen,
    #[serde(rename = "DOOR_CLOSING_MID_OPEN")]
    ClosingMidOpen,
    /// Firmware revisions report statuses we do not know about
    #[serde(other)]
    Unknown,
}

impl DoorStatus {
    /// Whether the panel is anywhere other than resting closed
    #[must_use]
    pub fn is_open(self) -> bool {
        !matches!(self, DoorStatus::Idle | DoorStatus::Closed)
    }
}

/// Configuration flags reported by the door
///
/// `GET_SETTINGS` returns the full set; individual commands echo back only
/// the flag they changed. Unreported flags stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub inside: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub outside: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    pub power_state: Option<bool>,
    #[serde(
        rename = "timersEnabled",
        default,
        deserialize_with = "de_opt_flag"
    )]
    pub timers_enabled: Option<bool>,
    /// Remaining settings (hold time, timezone, lockout schedule, ...)
    /// passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The wire is inconsistent about booleans: some firmware paths send JSON
/// `true`/`false`, others send the strings `"true"`/`"false"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireFlag {
    Bool(bool),
    Text(String),
}

impl WireFlag {
    fn as_bool<E: de::Error>(&self) -> Result<bool, E> {
        match self {
            WireFlag::Bool(b) => Ok(*b),
            WireFlag::Text(s) => match s.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(E::custom(format!("not a wire boolean: {other:?}"))),
            },
        }
    }
}

/// Deserialize a wire boolean
pub(crate) fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    WireFlag::deserialize(deserializer)?.as_bool()
}

/// Deserialize an optional wire boolean (absent keys become `None` via
/// `#[serde(default)]` on the field)
pub(crate) fn de_opt_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    de_flag(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_door_status_open() {
        assert!(!DoorStatus::Idle.is_open());
        assert!(!DoorStatus::Closed.is_open());
        assert!(DoorStatus::Rising.is_open());
        assert!(DoorStatus::Holding.is_open());
        assert!(DoorStatus::Unknown.is_open());
    }

    #[test]
    fn test_door_status_unknown_variant() {
        let status: DoorStatus = serde_json::from_str("\"DOOR_SOMETHING_NEW\"").unwrap();
        assert_eq!(status, DoorStatus::Unknown);
    }

    #[test]
    fn test_settings_mixed_flag_encodings() {
        let settings: Settings = serde_json::from_str(
            r#"{"inside":"true","outside":false,"power_state":"false","timersEnabled":true,"holdOpenTime":8}"#,
        )
        .unwrap();
        assert_eq!(settings.inside, Some(true));
        assert_eq!(settings.outside, Some(false));
        assert_eq!(settings.power_state, Some(false));
        assert_eq!(settings.timers_enabled, Some(true));
        assert_eq!(
            settings.extra.get("holdOpenTime"),
            Some(&serde_json::json!(8))
        );
    }

    #[test]
    fn test_settings_partial() {
        let settings: Settings = serde_json::from_str(r#"{"inside":"true"}"#).unwrap();
        assert_eq!(settings.inside, Some(true));
        assert_eq!(settings.outside, None);
    }

    #[test]
    fn test_side_round_trip() {
        assert_eq!("inside".parse::<Side>().unwrap(), Side::Inside);
        assert_eq!(Side::Outside.to_string(), "outside");
        assert!("upside".parse::<Side>().is_err());
    }
}
