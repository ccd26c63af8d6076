//! Service registry for the pet door integration
//!
//! Declares the callable services the integration exposes to the host --
//! their display metadata, typed fields and selector constraints -- and
//! provides the host-side machinery that validates an invocation against
//! the schema before dispatching it to a registered handler.

pub mod error;
pub mod host;
pub mod registry;
pub mod schema;

pub use error::{ServiceError, ValidationError};
pub use host::{ServiceCall, ServiceHost};
pub use registry::{ServiceRegistry, DOMAIN};
pub use schema::{EntitySelector, FieldDefinition, Selector, ServiceDefinition, TextSelector};
