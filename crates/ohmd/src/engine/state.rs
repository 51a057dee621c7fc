use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Serialize;

use super::device::Device;

/// Device class of a numeric sensor, matching Home Assistant's sensor device classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorDeviceClass {
    DataRate,
    DataSize,
    Frequency,
    Power,
    Temperature,
    Voltage,
}

/// How a sensor's values relate to each other over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateClass {
    /// The value is a current measurement, not a total or a counter
    #[default]
    Measurement,
}

/// Static description of a sensor, fixed when the sensor is discovered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDescription {
    /// Name of the integration instance that owns the sensor
    pub integration: String,
    pub unique_id: String,
    pub name: String,
    pub unit_of_measurement: String,
    pub device_class: Option<SensorDeviceClass>,
    pub state_class: StateClass,
    pub suggested_display_precision: u8,
    pub device: Option<Device>,
}

/// State of a numeric sensor entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    #[serde(flatten)]
    pub description: SensorDescription,

    /// Latest reading; `None` until the first reading or when the source has no reading
    pub value: Option<f64>,

    pub attributes: BTreeMap<String, String>,
}

impl SensorState {
    pub fn new(description: SensorDescription) -> Self {
        Self {
            description,
            value: None,
            attributes: BTreeMap::new(),
        }
    }
}

/// Outcome of the latest refresh cycle of an integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrationStatus {
    pub last_update_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub sensors: HashMap<String, SensorState>,
    pub integrations: HashMap<String, IntegrationStatus>,
}
