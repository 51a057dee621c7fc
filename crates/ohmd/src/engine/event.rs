use super::state::SensorState;

/// Engine-level events broadcast to subscribers such as the MQTT bridge.
///
/// Distinct from `FromIntegrationMessage` (transport-level). The engine converts
/// `FromIntegrationMessage` into `Event` at the boundary, after updating `State`.
#[derive(Debug, Clone)]
pub enum Event {
    SensorDiscovered {
        entity_id: String,
        state: SensorState,
    },
    SensorStateChanged {
        entity_id: String,
        state: SensorState,
    },
    UpdateFailed {
        integration_name: String,
        error: String,
    },
}
