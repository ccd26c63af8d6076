//! Service handler registration
//!
//! Wires the nine declared service ids to door operations. The host has
//! already validated each call against the registry before a handler runs,
//! so field lookups here only fail if a door disappears between validation
//! and dispatch.

use crate::door::{DoorError, PetDoor};
use crate::hub::DoorHub;
use petdoor_protocol::Side;
use petdoor_services::{ServiceCall, ServiceError, ServiceHost};
use std::sync::Arc;

/// Register a handler for every service the registry declares
pub fn register_services(host: &ServiceHost, hub: Arc<DoorHub>) -> Result<(), ServiceError> {
    {
        let hub = hub.clone();
        host.register("enable_sensor", move |call| {
            let hub = hub.clone();
            async move {
                target(&hub, &call)?.enable_sensor(sensor_side(&call)?).await.map_err(door_error)
            }
        })?;
    }
    {
        let hub = hub.clone();
        host.register("disable_sensor", move |call| {
            let hub = hub.clone();
            async move {
                target(&hub, &call)?.disable_sensor(sensor_side(&call)?).await.map_err(door_error)
            }
        })?;
    }
    {
        let hub = hub.clone();
        host.register("toggle_sensor", move |call| {
            let hub = hub.clone();
            async move {
                target(&hub, &call)?.toggle_sensor(sensor_side(&call)?).await.map_err(door_error)
            }
        })?;
    }
    {
        let hub = hub.clone();
        host.register("enable_auto", move |call| {
            let hub = hub.clone();
            async move { target(&hub, &call)?.enable_auto().await.map_err(door_error) }
        })?;
    }
    {
        let hub = hub.clone();
        host.register("disable_auto", move |call| {
            let hub = hub.clone();
            async move { target(&hub, &call)?.disable_auto().await.map_err(door_error) }
        })?;
    }
    {
        let hub = hub.clone();
        host.register("toggle_auto", move |call| {
            let hub = hub.clone();
            async move { target(&hub, &call)?.toggle_auto().await.map_err(door_error) }
        })?;
    }
    {
        let hub = hub.clone();
        host.register("power_on", move |call| {
            let hub = hub.clone();
            async move { target(&hub, &call)?.power_on().await.map_err(door_error) }
        })?;
    }
    {
        let hub = hub.clone();
        host.register("power_off", move |call| {
            let hub = hub.clone();
            async move { target(&hub, &call)?.power_off().await.map_err(door_error) }
        })?;
    }
    host.register("power_toggle", move |call| {
        let hub = hub.clone();
        async move { target(&hub, &call)?.power_toggle().await.map_err(door_error) }
    })?;

    Ok(())
}

/// Resolve the call's `entity_id` to a live door
fn target(hub: &DoorHub, call: &ServiceCall) -> Result<Arc<PetDoor>, ServiceError> {
    let entity_id = call
        .entity_id()
        .ok_or_else(|| ServiceError::Handler("call is missing entity_id".to_string()))?;
    hub.resolve(entity_id).map_err(door_error)
}

/// The validated `sensor` field as a `Side`
fn sensor_side(call: &ServiceCall) -> Result<Side, ServiceError> {
    call.field_str("sensor")
        .ok_or_else(|| ServiceError::Handler("call is missing sensor".to_string()))?
        .parse()
        .map_err(|e: petdoor_protocol::ProtocolError| ServiceError::Handler(e.to_string()))
}

fn door_error(e: DoorError) -> ServiceError {
    ServiceError::Handler(e.to_string())
}
