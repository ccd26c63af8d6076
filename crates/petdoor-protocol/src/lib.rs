//! Power Pet Door network protocol implementation
//!
//! This crate implements the JSON-over-TCP protocol used to communicate
//! with High Tech Pet "Power Pet Door" units on the local network.

pub mod codec;
pub mod message;
pub mod transport;
pub mod types;

pub use codec::BlockDecoder;
pub use message::{ConfigCommand, DoorCommand, Request, Response};
pub use transport::{ConnectOptions, DoorTransport, TransportEvent};
pub use types::*;
