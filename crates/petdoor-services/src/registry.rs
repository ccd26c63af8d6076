//! The service registry and its canonical document
//!
//! The registry is an ordered mapping from service id to definition. It is
//! immutable configuration: the host parses it at integration load time,
//! renders an invocation UI from it, and validates calls against it before
//! dispatch.

use crate::error::ValidationError;
use crate::host::ServiceCall;
use crate::schema::{
    EntitySelector, FieldDefinition, Selector, ServiceDefinition, TextSelector,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The integration domain owning the pet door entities
pub const DOMAIN: &str = "petdoor";

/// Ordered mapping from service id to definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceRegistry {
    services: IndexMap<String, ServiceDefinition>,
}

impl ServiceRegistry {
    /// The canonical pet door registry: the nine services the
    /// integration exposes
    #[must_use]
    pub fn canonical() -> Self {
        let mut services = IndexMap::new();

        services.insert(
            "enable_sensor".to_string(),
            sensor_service("Enable sensor", "Enable one of the door's proximity sensors."),
        );
        services.insert(
            "disable_sensor".to_string(),
            sensor_service("Disable sensor", "Disable one of the door's proximity sensors."),
        );
        services.insert(
            "toggle_sensor".to_string(),
            sensor_service("Toggle sensor", "Toggle one of the door's proximity sensors."),
        );
        services.insert(
            "enable_auto".to_string(),
            entity_service("Enable automatic mode", "Enable the door's timer schedule."),
        );
        services.insert(
            "disable_auto".to_string(),
            entity_service("Disable automatic mode", "Disable the door's timer schedule."),
        );
        services.insert(
            "toggle_auto".to_string(),
            entity_service("Toggle automatic mode", "Toggle the door's timer schedule."),
        );
        services.insert(
            "power_on".to_string(),
            entity_service("Power on", "Turn the pet door on."),
        );
        services.insert(
            "power_off".to_string(),
            entity_service("Power off", "Turn the pet door off."),
        );
        services.insert(
            "power_toggle".to_string(),
            entity_service("Toggle power", "Toggle the pet door's power state."),
        );

        Self { services }
    }

    /// Parse a registry document
    pub fn from_yaml(document: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(document)
    }

    /// Serialize the registry document
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Look up a service definition
    #[must_use]
    pub fn get(&self, service: &str) -> Option<&ServiceDefinition> {
        self.services.get(service)
    }

    /// Declared service ids, in document order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Iterate over (id, definition) pairs in document order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceDefinition)> {
        self.services.iter().map(|(id, def)| (id.as_str(), def))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Validate a call against the schema, without dispatching it
    ///
    /// Rejects unknown services, missing required fields, undeclared
    /// fields, and selector-incompatible values.
    pub fn validate(&self, call: &ServiceCall) -> Result<(), ValidationError> {
        let service = self
            .get(&call.service)
            .ok_or_else(|| ValidationError::UnknownService(call.service.clone()))?;

        for (key, field) in &service.fields {
            if field.required && !call.data.contains_key(key) {
                return Err(ValidationError::MissingField {
                    service: call.service.clone(),
                    field: key.clone(),
                });
            }
        }

        for (key, value) in &call.data {
            let field = service.fields.get(key).ok_or_else(|| {
                ValidationError::UnexpectedField {
                    service: call.service.clone(),
                    field: key.clone(),
                }
            })?;

            let text = value
                .as_str()
                .ok_or_else(|| ValidationError::NotAString { field: key.clone() })?;

            match &field.selector {
                Selector::Entity(selector) => validate_entity_id(key, &selector.domain, text)?,
                Selector::Text(selector) => {
                    if !selector.values.iter().any(|v| v == text) {
                        return Err(ValidationError::NotInSet {
                            field: key.clone(),
                            allowed: selector.values.join(", "),
                            value: text.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Check `<domain>.<object_id>` shape with a lowercase slug object id
fn validate_entity_id(field: &str, domain: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidEntity {
        field: field.to_string(),
        domain: domain.to_string(),
        value: value.to_string(),
    };

    let (value_domain, object_id) = value.split_once('.').ok_or_else(invalid)?;
    if value_domain != domain || object_id.is_empty() {
        return Err(invalid());
    }
    if !object_id
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(invalid());
    }
    Ok(())
}

/// The target-door field every service carries
fn entity_field() -> FieldDefinition {
    FieldDefinition {
        name: "Entity".to_string(),
        description: "Name of the pet door to control.".to_string(),
        required: true,
        selector: Selector::Entity(EntitySelector {
            domain: DOMAIN.to_string(),
        }),
    }
}

/// The sensor-side field carried by the sensor services
fn sensor_field() -> FieldDefinition {
    FieldDefinition {
        name: "Sensor".to_string(),
        description: "Which proximity sensor to address.".to_string(),
        required: true,
        selector: Selector::Text(TextSelector {
            values: vec!["inside".to_string(), "outside".to_string()],
        }),
    }
}

fn entity_service(name: &str, description: &str) -> ServiceDefinition {
    let mut fields = IndexMap::new();
    fields.insert("entity_id".to_string(), entity_field());
    ServiceDefinition {
        name: name.to_string(),
        description: description.to_string(),
        fields,
    }
}

fn sensor_service(name: &str, description: &str) -> ServiceDefinition {
    let mut fields = IndexMap::new();
    fields.insert("entity_id".to_string(), entity_field());
    fields.insert("sensor".to_string(), sensor_field());
    ServiceDefinition {
        name: name.to_string(),
        description: description.to_string(),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SENSOR_SERVICES: [&str; 3] = ["enable_sensor", "disable_sensor", "toggle_sensor"];

    fn call(service: &str, data: serde_json::Value) -> ServiceCall {
        ServiceCall::new(service, data.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_canonical_service_ids() {
        let registry = ServiceRegistry::canonical();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(
            ids,
            vec![
                "enable_sensor",
                "disable_sensor",
                "toggle_sensor",
                "enable_auto",
                "disable_auto",
                "toggle_auto",
                "power_on",
                "power_off",
                "power_toggle",
            ]
        );
    }

    #[test]
    fn test_every_service_targets_the_domain() {
        let registry = ServiceRegistry::canonical();
        for (id, definition) in registry.iter() {
            let entity = definition
                .fields
                .get("entity_id")
                .unwrap_or_else(|| panic!("{id} lacks entity_id"));
            assert!(entity.required, "{id} entity_id must be required");
            assert_eq!(entity.selector.entity_domain(), Some(DOMAIN), "{id}");
        }
    }

    #[test]
    fn test_sensor_services_carry_the_sensor_field() {
        let registry = ServiceRegistry::canonical();
        for id in SENSOR_SERVICES {
            let definition = registry.get(id).unwrap();
            let keys: Vec<&String> = definition.fields.keys().collect();
            assert_eq!(keys, vec!["entity_id", "sensor"], "{id}");

            let sensor = &definition.fields["sensor"];
            assert!(sensor.required, "{id} sensor must be required");
            assert_eq!(
                sensor.selector.literal_values().unwrap(),
                &["inside".to_string(), "outside".to_string()],
                "{id}"
            );
        }
    }

    #[test]
    fn test_non_sensor_services_take_only_the_entity() {
        let registry = ServiceRegistry::canonical();
        for (id, definition) in registry.iter() {
            if SENSOR_SERVICES.contains(&id) {
                continue;
            }
            let keys: Vec<&String> = definition.fields.keys().collect();
            assert_eq!(keys, vec!["entity_id"], "{id}");
        }
    }

    #[test]
    fn test_yaml_round_trip_is_idempotent() {
        let registry = ServiceRegistry::canonical();
        let document = registry.to_yaml().unwrap();
        let parsed = ServiceRegistry::from_yaml(&document).unwrap();
        assert_eq!(parsed, registry);

        // And a second pass writes the identical document
        assert_eq!(parsed.to_yaml().unwrap(), document);
    }

    #[test]
    fn test_shipped_document_matches_canonical() {
        let document = include_str!("../services.yaml");
        let parsed = ServiceRegistry::from_yaml(document).unwrap();
        assert_eq!(parsed, ServiceRegistry::canonical());
    }

    #[test]
    fn test_validate_accepts_well_formed_calls() {
        let registry = ServiceRegistry::canonical();
        registry
            .validate(&call(
                "enable_sensor",
                json!({"entity_id": "petdoor.back_door", "sensor": "inside"}),
            ))
            .unwrap();
        registry
            .validate(&call("power_toggle", json!({"entity_id": "petdoor.back_door"})))
            .unwrap();
    }

    #[test]
    fn test_validate_rejects_unknown_service() {
        let registry = ServiceRegistry::canonical();
        let err = registry
            .validate(&call("open_sesame", json!({})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownService(_)));
    }

    #[test]
    fn test_validate_rejects_missing_required_field() {
        let registry = ServiceRegistry::canonical();
        let err = registry
            .validate(&call("enable_sensor", json!({"entity_id": "petdoor.back_door"})))
            .unwrap_err();
        assert!(
            matches!(err, ValidationError::MissingField { ref field, .. } if field == "sensor")
        );
    }

    #[test]
    fn test_validate_rejects_undeclared_field() {
        let registry = ServiceRegistry::canonical();
        let err = registry
            .validate(&call(
                "power_on",
                json!({"entity_id": "petdoor.back_door", "sensor": "inside"}),
            ))
            .unwrap_err();
        assert!(
            matches!(err, ValidationError::UnexpectedField { ref field, .. } if field == "sensor")
        );
    }

    #[test]
    fn test_validate_rejects_sensor_outside_literal_set() {
        let registry = ServiceRegistry::canonical();
        let err = registry
            .validate(&call(
                "toggle_sensor",
                json!({"entity_id": "petdoor.back_door", "sensor": "upside"}),
            ))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotInSet { .. }));
    }

    #[test]
    fn test_validate_rejects_foreign_domain_entity() {
        let registry = ServiceRegistry::canonical();
        let err = registry
            .validate(&call("power_on", json!({"entity_id": "switch.back_door"})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidEntity { .. }));
    }

    #[test]
    fn test_validate_rejects_malformed_entity_id() {
        let registry = ServiceRegistry::canonical();
        for bad in ["petdoor", "petdoor.", "petdoor.Back Door", "Petdoor.back_door"] {
            let err = registry
                .validate(&call("power_on", json!({ "entity_id": bad })))
                .unwrap_err();
            assert!(matches!(err, ValidationError::InvalidEntity { .. }), "{bad}");
        }
    }

    #[test]
    fn test_validate_rejects_non_string_values() {
        let registry = ServiceRegistry::canonical();
        let err = registry
            .validate(&call("power_on", json!({"entity_id": 42})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotAString { .. }));
    }
}
