//! Error types for the service registry

use thiserror::Error;

/// Why an invocation was rejected before dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No such service in the registry
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// A required field was not supplied
    #[error("Service {service} requires field {field}")]
    MissingField { service: String, field: String },

    /// A supplied field is not declared by the schema
    #[error("Service {service} does not accept field {field}")]
    UnexpectedField { service: String, field: String },

    /// A selector-constrained field expects a string
    #[error("Field {field} must be a string")]
    NotAString { field: String },

    /// An entity selector got an id outside its domain
    #[error("Field {field} expects an entity id in domain {domain}, got {value:?}")]
    InvalidEntity {
        field: String,
        domain: String,
        value: String,
    },

    /// A text selector got a value outside its literal set
    #[error("Field {field} must be one of [{allowed}], got {value:?}")]
    NotInSet {
        field: String,
        allowed: String,
        value: String,
    },
}

/// Errors raised by the service host
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The invocation did not pass schema validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The service is declared but no handler has been registered
    #[error("No handler registered for service: {0}")]
    NotRegistered(String),

    /// A handler can only be registered for a declared service
    #[error("Cannot register handler for undeclared service: {0}")]
    Undeclared(String),

    /// The handler ran and failed
    #[error("Service handler failed: {0}")]
    Handler(String),

    /// The registry document could not be parsed or written
    #[error("Registry document error: {0}")]
    Document(#[from] serde_yaml::Error),
}
