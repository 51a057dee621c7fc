use std::collections::BTreeMap;

use tracing::debug;

use super::flatten::EntityDescriptor;
use super::flatten::ReindexFailure;
use super::flatten::read_path;
use super::tree::SensorNode;
use super::units::Unit;
use crate::engine::Device;
use crate::engine::SensorDescription;
use crate::engine::SensorDeviceClass;
use crate::engine::StateClass;

/// OpenHardwareMonitor shows its measurements with one decimal
const SUGGESTED_DISPLAY_PRECISION: u8 = 1;

/// A sensor entity backed by one leaf of the OpenHardwareMonitor tree
#[derive(Debug, Clone)]
pub struct OhmSensor {
    /// Entity ID (e.g., "sensor.test_pc_intel_core_i7_7700_powers_cpu_package")
    pub entity_id: String,

    /// Human-readable name, also used as unique ID
    pub name: String,

    /// Child indices from the tree root, fixed at creation
    pub path: Vec<usize>,

    pub unit: Unit,
    pub device_class: Option<SensorDeviceClass>,
    pub device: Option<Device>,

    /// Latest reading
    pub value: Option<f64>,
    pub attributes: BTreeMap<String, String>,
}

impl OhmSensor {
    pub fn new(descriptor: EntityDescriptor, entity_id: String, device: Option<Device>) -> Self {
        let unit = Unit::canonicalize(&descriptor.unit_token);
        let device_class = unit.device_class();
        Self {
            entity_id,
            name: descriptor.display_name,
            path: descriptor.path,
            unit,
            device_class,
            device,
            value: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Re-read this sensor from a newer snapshot
    ///
    /// On failure the previous value and attributes are kept.
    pub fn refresh(&mut self, root: &SensorNode) -> Result<(), ReindexFailure> {
        let reading = read_path(root, &self.path)?;
        self.value = reading.value;
        self.attributes = reading.attributes;
        debug!("{} updated to {:?}", self.name, self.value);
        Ok(())
    }

    /// Description registered with the engine
    pub fn description(&self, integration: &str) -> SensorDescription {
        SensorDescription {
            integration: integration.to_string(),
            unique_id: self.name.clone(),
            name: self.name.clone(),
            unit_of_measurement: self.unit.to_string(),
            device_class: self.device_class,
            state_class: StateClass::Measurement,
            suggested_display_precision: SUGGESTED_DISPLAY_PRECISION,
            device: self.device.clone(),
        }
    }
}

/// Turn a display name into the object part of an entity ID.
///
/// Lower-cases, collapses every run of non-alphanumeric characters into a
/// single `_` and trims leading/trailing `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::openhardwaremonitor::flatten::derive_entities;
    use crate::integrations::openhardwaremonitor::flatten::tests::fixture;
    use crate::integrations::openhardwaremonitor::flatten::tests::group;
    use crate::integrations::openhardwaremonitor::flatten::tests::leaf;

    fn sensors(root: &SensorNode) -> Vec<OhmSensor> {
        derive_entities(root)
            .into_iter()
            .map(|d| {
                let entity_id = format!("sensor.{}", slugify(&d.display_name));
                OhmSensor::new(d, entity_id, None)
            })
            .collect()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Test PC Intel Core i7-7700 Temperatures CPU Core #1"),
            "test_pc_intel_core_i7_7700_temperatures_cpu_core_1"
        );
        assert_eq!(slugify("  GPU -- Memory  "), "gpu_memory");
        assert_eq!(slugify("Temperatur °C"), "temperatur_c");
    }

    #[test]
    fn test_end_to_end_single_sensor() {
        let root = group(
            "Sensor",
            vec![group(
                "CPU",
                vec![group("Temperatures", vec![leaf("Core #1", "31.0 °C")])],
            )],
        );

        let mut sensors = sensors(&root);
        assert_eq!(sensors.len(), 1);

        let sensor = &mut sensors[0];
        sensor.refresh(&root).unwrap();

        assert_eq!(sensor.name, "CPU Temperatures Core #1");
        assert_eq!(sensor.unit, Unit::Celsius);
        assert_eq!(sensor.device_class, Some(SensorDeviceClass::Temperature));
        assert_eq!(sensor.value, Some(31.0));

        let description = sensor.description("openhardwaremonitor.test");
        assert_eq!(description.unique_id, "CPU Temperatures Core #1");
        assert_eq!(description.unit_of_measurement, "°C");
        assert_eq!(description.state_class, StateClass::Measurement);
        assert_eq!(description.suggested_display_precision, 1);
    }

    #[test]
    fn test_fixture_sensors() {
        let root = fixture();
        let mut sensors = sensors(&root);
        assert_eq!(sensors.len(), 21);

        for sensor in &mut sensors {
            sensor.refresh(&root).unwrap();
        }

        let by_id = |id: &str| {
            sensors
                .iter()
                .find(|s| s.entity_id == id)
                .unwrap_or_else(|| panic!("missing {}", id))
        };

        let core = by_id("sensor.test_pc_intel_core_i7_7700_temperatures_cpu_core_1");
        assert_eq!(core.value, Some(31.0));
        assert_eq!(core.unit.to_string(), "°C");
        assert_eq!(core.device_class, Some(SensorDeviceClass::Temperature));

        let package = by_id("sensor.test_pc_intel_core_i7_7700_powers_cpu_package");
        assert_eq!(package.value, Some(12.1));
        assert_eq!(package.unit.to_string(), "W");
        assert_eq!(package.device_class, Some(SensorDeviceClass::Power));

        let graphics = by_id("sensor.test_pc_intel_core_i7_7700_powers_cpu_graphics");
        assert_eq!(graphics.value, None);
        assert_eq!(graphics.device_class, Some(SensorDeviceClass::Power));

        let free = by_id("sensor.test_pc_nvidia_geforce_gtx_1080_data_gpu_memory_free");
        assert_eq!(free.value, Some(7873.1));
        assert_eq!(free.unit.to_string(), "MB");
        assert_eq!(free.device_class, Some(SensorDeviceClass::DataSize));

        let avcc = by_id("sensor.test_pc_asus_prime_z270_a_nuvoton_nct6793d_voltages_avcc");
        assert_eq!(avcc.value, Some(3.392));
        assert_eq!(avcc.device_class, Some(SensorDeviceClass::Voltage));

        let rx = by_id("sensor.test_pc_nvidia_geforce_gtx_1080_throughput_gpu_pcie_rx");
        assert_eq!(rx.unit.to_string(), "kB/s");
        assert_eq!(rx.device_class, Some(SensorDeviceClass::DataRate));

        let fan = by_id("sensor.test_pc_asus_prime_z270_a_nuvoton_nct6793d_fans_fan_1");
        assert_eq!(fan.unit, Unit::Other("RPM".to_string()));
        assert_eq!(fan.device_class, None);
        assert_eq!(fan.value, Some(1100.0));
    }

    #[test]
    fn test_refresh_follows_fixed_paths() {
        let first = group(
            "Sensor",
            vec![group(
                "PC",
                vec![
                    group("Temperatures", vec![leaf("Core", "31.0 °C")]),
                    group("Powers", vec![leaf("Package", "12.1 W")]),
                ],
            )],
        );
        let second = group(
            "Sensor",
            vec![group(
                "PC",
                vec![
                    group("Temperatures", vec![leaf("Core", "45,5 °C")]),
                    group("Powers", vec![leaf("Package", "- W")]),
                ],
            )],
        );

        let mut sensors = sensors(&first);
        for sensor in &mut sensors {
            sensor.refresh(&first).unwrap();
        }
        for sensor in &mut sensors {
            sensor.refresh(&second).unwrap();
        }

        assert_eq!(sensors[0].name, "PC Temperatures Core");
        assert_eq!(sensors[0].unit, Unit::Celsius);
        assert_eq!(sensors[0].value, Some(45.5));
        assert_eq!(sensors[1].name, "PC Powers Package");
        assert_eq!(sensors[1].device_class, Some(SensorDeviceClass::Power));
        assert_eq!(sensors[1].value, None);
    }

    #[test]
    fn test_reindex_failure_is_isolated() {
        let first = group(
            "Sensor",
            vec![group(
                "PC",
                vec![
                    group("GPU", vec![leaf("Core", "40.0 °C"), leaf("Memory", "50.0 °C")]),
                    group("CPU", vec![leaf("Core", "31.0 °C")]),
                ],
            )],
        );
        // The GPU branch lost its second sensor
        let second = group(
            "Sensor",
            vec![group(
                "PC",
                vec![
                    group("GPU", vec![leaf("Core", "41.0 °C")]),
                    group("CPU", vec![leaf("Core", "32.0 °C")]),
                ],
            )],
        );

        let mut sensors = sensors(&first);
        for sensor in &mut sensors {
            sensor.refresh(&first).unwrap();
        }

        let results: Vec<_> = sensors.iter_mut().map(|s| s.refresh(&second)).collect();

        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(ReindexFailure::ShapeChanged { depth: 2, index: 1 })
        );
        assert!(results[2].is_ok());

        assert_eq!(sensors[0].value, Some(41.0));
        // Previous value and attributes stand
        assert_eq!(sensors[1].value, Some(50.0));
        assert_eq!(sensors[1].attributes["name"], "Memory");
        assert_eq!(sensors[2].value, Some(32.0));
    }
}
