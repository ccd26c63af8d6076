//! Host-side dispatch
//!
//! The host owns the parsed registry plus one registered handler per
//! declared service. `call` validates the supplied argument set against
//! the schema and only then invokes the handler.

use crate::error::ServiceError;
use crate::registry::ServiceRegistry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// A caller-supplied service invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Service id, e.g. `enable_sensor`
    pub service: String,
    /// Field values keyed by field key
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl ServiceCall {
    /// Build a call for `service` with the given field map
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            service: service.into(),
            data,
        }
    }

    /// A field value as a string, if present and a string
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// The target entity id
    ///
    /// Every declared service requires `entity_id`, so after validation
    /// this is always present.
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        self.field_str("entity_id")
    }
}

type Handler = Box<dyn Fn(ServiceCall) -> BoxFuture<'static, Result<(), ServiceError>> + Send + Sync>;

/// The host's service table: registry plus registered handlers
pub struct ServiceHost {
    registry: ServiceRegistry,
    handlers: DashMap<String, Handler>,
}

impl ServiceHost {
    /// Create a host around a parsed registry
    #[must_use]
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            handlers: DashMap::new(),
        }
    }

    /// The registry this host validates against
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Register the handler for a declared service
    ///
    /// Fails if the registry does not declare the service; the schema is
    /// the contract, handlers cannot extend it.
    pub fn register<F, Fut>(&self, service: &str, handler: F) -> Result<(), ServiceError>
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        if self.registry.get(service).is_none() {
            return Err(ServiceError::Undeclared(service.to_string()));
        }

        let boxed: Handler = Box::new(move |call| Box::pin(handler(call)));
        if self.handlers.insert(service.to_string(), boxed).is_some() {
            tracing::warn!("Handler for service {} replaced", service);
        }
        Ok(())
    }

    /// Whether a handler is registered for the service
    #[must_use]
    pub fn is_registered(&self, service: &str) -> bool {
        self.handlers.contains_key(service)
    }

    /// Validate and dispatch a call
    pub async fn call(&self, call: ServiceCall) -> Result<(), ServiceError> {
        self.registry.validate(&call)?;

        tracing::debug!(service = %call.service, "Dispatching service call");

        let future = {
            let handler = self
                .handlers
                .get(&call.service)
                .ok_or_else(|| ServiceError::NotRegistered(call.service.clone()))?;
            (handler.value())(call)
        };
        future.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sensor_call(sensor: &str) -> ServiceCall {
        let data = json!({"entity_id": "petdoor.back_door", "sensor": sensor});
        ServiceCall::new("enable_sensor", data.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn test_call_reaches_registered_handler() {
        let host = ServiceHost::new(ServiceRegistry::canonical());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        host.register("enable_sensor", move |call| {
            let counter = counter.clone();
            async move {
                assert_eq!(call.entity_id(), Some("petdoor.back_door"));
                assert_eq!(call.field_str("sensor"), Some("inside"));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        host.call(sensor_call("inside")).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_call_never_reaches_handler() {
        let host = ServiceHost::new(ServiceRegistry::canonical());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        host.register("enable_sensor", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        let err = host.call(sensor_call("sideways")).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::NotInSet { .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_declared_but_unregistered_service() {
        let host = ServiceHost::new(ServiceRegistry::canonical());
        let data = json!({"entity_id": "petdoor.back_door"});
        let call = ServiceCall::new("power_on", data.as_object().cloned().unwrap());

        let err = host.call(call).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotRegistered(_)));
    }

    #[test]
    fn test_register_rejects_undeclared_service() {
        let host = ServiceHost::new(ServiceRegistry::canonical());
        let err = host
            .register("open_sesame", |_| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Undeclared(_)));
    }

    #[tokio::test]
    async fn test_handler_error_is_propagated() {
        let host = ServiceHost::new(ServiceRegistry::canonical());
        host.register("power_off", |_| async {
            Err(ServiceError::Handler("door unreachable".to_string()))
        })
        .unwrap();

        let data = json!({"entity_id": "petdoor.back_door"});
        let call = ServiceCall::new("power_off", data.as_object().cloned().unwrap());
        let err = host.call(call).await.unwrap_err();
        assert!(matches!(err, ServiceError::Handler(_)));
    }
}
