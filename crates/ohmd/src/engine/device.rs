use serde::Serialize;

/// A device in the ohmd system.
///
/// A device represents a physical machine that contains one or more sensor
/// entities. All entities of one OpenHardwareMonitor endpoint share the same
/// device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// `(domain, identifier)` pairs uniquely identifying the device
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Device {
    pub fn new(name: String) -> Self {
        Self {
            identifiers: Vec::new(),
            name,
            manufacturer: None,
            model: None,
        }
    }

    pub fn with_identifier(mut self, domain: &str, id: &str) -> Self {
        let identifier = (domain.to_string(), id.to_string());
        if !self.identifiers.contains(&identifier) {
            self.identifiers.push(identifier);
        }
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_not_duplicated() {
        let device = Device::new("Test PC".to_string())
            .with_identifier("openhardwaremonitor", "Test PC")
            .with_identifier("openhardwaremonitor", "Test PC");

        assert_eq!(
            device.identifiers,
            vec![("openhardwaremonitor".to_string(), "Test PC".to_string())]
        );
    }
}
