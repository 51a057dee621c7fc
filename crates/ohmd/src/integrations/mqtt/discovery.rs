//! Home Assistant MQTT discovery payloads and topics.

use serde::Serialize;

use crate::config::MqttConfig;
use crate::engine::Device;
use crate::engine::SensorState;

/// Node ID under which all ohmd sensors are announced
const NODE_ID: &str = "ohmd";

/// Discovery payload for a numeric sensor
///
/// Published retained to `{discovery_prefix}/sensor/ohmd/{object_id}/config`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDiscoveryMessage {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub json_attributes_topic: String,
    pub unit_of_measurement: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    pub state_class: String,
    pub suggested_display_precision: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
}

/// Device block of a discovery payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// List of identifiers for this device
    pub identifiers: Vec<String>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl From<&Device> for DeviceInfo {
    fn from(device: &Device) -> Self {
        Self {
            identifiers: device
                .identifiers
                .iter()
                .map(|(domain, id)| format!("{}_{}", domain, id))
                .collect(),
            name: device.name.clone(),
            manufacturer: device.manufacturer.clone(),
            model: device.model.clone(),
        }
    }
}

impl SensorDiscoveryMessage {
    pub fn new(object_id: &str, sensor: &SensorState, config: &MqttConfig) -> Self {
        let description = &sensor.description;
        Self {
            name: description.name.clone(),
            unique_id: description.unique_id.clone(),
            state_topic: state_topic(&config.state_prefix, object_id),
            json_attributes_topic: attributes_topic(&config.state_prefix, object_id),
            unit_of_measurement: description.unit_of_measurement.clone(),
            device_class: description.device_class.map(|c| c.to_string()),
            state_class: description.state_class.to_string(),
            suggested_display_precision: description.suggested_display_precision,
            device: description.device.as_ref().map(DeviceInfo::from),
        }
    }
}

/// Object ID of an entity: its ID without the `sensor.` domain
pub fn object_id(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map_or(entity_id, |(_, object_id)| object_id)
}

/// Topic format: {prefix}/sensor/ohmd/{object_id}/config
pub fn config_topic(discovery_prefix: &str, object_id: &str) -> String {
    format!("{}/sensor/{}/{}/config", discovery_prefix, NODE_ID, object_id)
}

pub fn state_topic(state_prefix: &str, object_id: &str) -> String {
    format!("{}/{}/state", state_prefix, object_id)
}

pub fn attributes_topic(state_prefix: &str, object_id: &str) -> String {
    format!("{}/{}/attributes", state_prefix, object_id)
}
