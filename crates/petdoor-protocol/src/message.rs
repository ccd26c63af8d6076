//! Request and response messages
//!
//! Requests are JSON objects with a single command key (`cmd`, `config`
//! or `PING`), a `msgId` and the fixed direction marker `dir: "p2d"`
//! (panel-to-door). Responses echo the command under `CMD` and carry the
//! request id back under `msgID` -- the capitalization really does differ
//! between the two directions.

use crate::types::{de_flag, DoorStatus, ProtocolError, Settings, Side};
use serde::Deserialize;

/// Direction marker the door expects on every request
const DIRECTION: &str = "p2d";

/// Door movement commands (sent under the `cmd` key)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorCommand {
    /// Open, then close again after the hold time
    Open,
    /// Open and stay open until told otherwise
    OpenAndHold,
    /// Close now
    Close,
}

impl DoorCommand {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DoorCommand::Open => "OPEN",
            DoorCommand::OpenAndHold => "OPEN_AND_HOLD",
            DoorCommand::Close => "CLOSE",
        }
    }
}

/// Configuration commands (sent under the `config` key)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    GetSettings,
    GetDoorStatus,
    GetSensors,
    GetPower,
    GetTimersEnabled,
    EnableInside,
    DisableInside,
    EnableOutside,
    DisableOutside,
    PowerOn,
    PowerOff,
    EnableTimers,
    DisableTimers,
}

impl ConfigCommand {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigCommand::GetSettings => "GET_SETTINGS",
            ConfigCommand::GetDoorStatus => "GET_DOOR_STATUS",
            ConfigCommand::GetSensors => "GET_SENSORS",
            ConfigCommand::GetPower => "GET_POWER",
            ConfigCommand::GetTimersEnabled => "GET_TIMERS_ENABLED",
            ConfigCommand::EnableInside => "ENABLE_INSIDE",
            ConfigCommand::DisableInside => "DISABLE_INSIDE",
            ConfigCommand::EnableOutside => "ENABLE_OUTSIDE",
            ConfigCommand::DisableOutside => "DISABLE_OUTSIDE",
            ConfigCommand::PowerOn => "POWER_ON",
            ConfigCommand::PowerOff => "POWER_OFF",
            ConfigCommand::EnableTimers => "ENABLE_TIMERS",
            ConfigCommand::DisableTimers => "DISABLE_TIMERS",
        }
    }

    /// Enable the proximity sensor on the given side
    #[must_use]
    pub fn enable_sensor(side: Side) -> Self {
        match side {
            Side::Inside => ConfigCommand::EnableInside,
            Side::Outside => ConfigCommand::EnableOutside,
        }
    }

    /// Disable the proximity sensor on the given side
    #[must_use]
    pub fn disable_sensor(side: Side) -> Self {
        match side {
            Side::Inside => ConfigCommand::DisableInside,
            Side::Outside => ConfigCommand::DisableOutside,
        }
    }
}

/// An outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Command(DoorCommand),
    Config(ConfigCommand),
    /// Keepalive; the argument is the current Unix time in milliseconds
    Ping(String),
}

impl Request {
    /// The JSON key this request is sent under
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Command(_) => "cmd",
            Request::Config(_) => "config",
            Request::Ping(_) => "PING",
        }
    }

    /// The command argument carried by this request
    #[must_use]
    pub fn argument(&self) -> &str {
        match self {
            Request::Command(cmd) => cmd.as_str(),
            Request::Config(cmd) => cmd.as_str(),
            Request::Ping(millis) => millis,
        }
    }

    /// Encode as a wire message with the given message id
    #[must_use]
    pub fn encode(&self, msg_id: u64) -> Vec<u8> {
        let mut body = serde_json::Map::new();
        body.insert(self.kind().to_string(), self.argument().into());
        body.insert("msgId".to_string(), msg_id.into());
        body.insert("dir".to_string(), DIRECTION.into());
        serde_json::Value::Object(body).to_string().into_bytes()
    }
}

/// A decoded message from the door
///
/// Every message carries `success`; the rest of the payload depends on the
/// command. Solicited responses carry `msgID`, unsolicited pushes do not.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    #[serde(deserialize_with = "de_flag")]
    pub success: bool,
    #[serde(rename = "CMD", default)]
    pub cmd: Option<String>,
    #[serde(rename = "msgID", default)]
    pub msg_id: Option<u64>,
    #[serde(default)]
    pub door_status: Option<DoorStatus>,
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default, deserialize_with = "crate::types::de_opt_flag")]
    pub inside: Option<bool>,
    #[serde(default, deserialize_with = "crate::types::de_opt_flag")]
    pub outside: Option<bool>,
    #[serde(default, deserialize_with = "crate::types::de_opt_flag")]
    pub power_state: Option<bool>,
    #[serde(
        rename = "timersEnabled",
        default,
        deserialize_with = "crate::types::de_opt_flag"
    )]
    pub timers_enabled: Option<bool>,
}

impl Response {
    /// Decode a framed JSON block
    pub fn decode(block: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(block)
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }

    /// Whether the named command matches this message's echoed `CMD`
    #[must_use]
    pub fn is_cmd(&self, name: &str) -> bool {
        self.cmd.as_deref() == Some(name)
    }
}
