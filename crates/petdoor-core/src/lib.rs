//! Pet door abstraction layer
//!
//! This crate provides high-level door state and control on top of the
//! low-level Power Pet Door protocol, plus the wiring that registers the
//! integration's services with a host.

pub mod config;
pub mod door;
pub mod hub;
pub mod services;

pub use config::DoorConfig;
pub use door::{DoorError, DoorEvent, DoorSnapshot, PetDoor};
pub use hub::DoorHub;
pub use services::register_services;
