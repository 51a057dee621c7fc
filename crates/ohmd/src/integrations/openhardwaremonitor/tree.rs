use serde::Deserialize;
use serde::Deserializer;

/// A node of the sensor tree served by OpenHardwareMonitor's `data.json`.
///
/// The daemon also sends `id`, `Min`, `Max` and `ImageURL` on every node;
/// those are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorNode {
    /// Display text of the node
    #[serde(rename = "Text", default)]
    pub label: String,

    #[serde(rename = "Children", default, deserialize_with = "deserialize_null_as_empty")]
    pub children: Vec<SensorNode>,

    /// `"<number> <unit>"` on metric leaves, usually empty on inner nodes
    #[serde(rename = "Value", default)]
    pub raw_value: Option<String>,
}

/// Deserialize a `Children` array that may be `null`.
fn deserialize_null_as_empty<'de, D>(deserializer: D) -> Result<Vec<SensorNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SensorNode>>::deserialize(deserializer)?.unwrap_or_default())
}

impl SensorNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Split the raw value on its first space into `(number, unit)`
    ///
    /// Returns `None` when there is no value or no space, i.e. when the node
    /// is not a metric leaf.
    pub fn value_parts(&self) -> Option<(&str, &str)> {
        self.raw_value.as_deref()?.split_once(' ')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_node() {
        let json = r#"{
            "id": 3,
            "Text": "Temperatures",
            "Min": "",
            "Value": "",
            "Max": "",
            "ImageURL": "images_icon/temperature.png",
            "Children": [
                {
                    "id": 4,
                    "Text": "CPU Core #1",
                    "Min": "28.0 °C",
                    "Value": "31.0 °C",
                    "Max": "52.0 °C",
                    "ImageURL": "images/transparent.png",
                    "Children": []
                }
            ]
        }"#;

        let node: SensorNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.label, "Temperatures");
        assert!(!node.is_leaf());
        assert_eq!(node.value_parts(), None);

        let leaf = &node.children[0];
        assert!(leaf.is_leaf());
        assert_eq!(leaf.label, "CPU Core #1");
        assert_eq!(leaf.value_parts(), Some(("31.0", "°C")));
    }

    #[test]
    fn test_missing_and_null_children() {
        let node: SensorNode = serde_json::from_str(r#"{"Text": "a", "Children": null}"#).unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.raw_value, None);

        let node: SensorNode = serde_json::from_str(r#"{"Text": "b", "Value": "5 W"}"#).unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.value_parts(), Some(("5", "W")));
    }

    #[test]
    fn test_value_without_space() {
        let node = SensorNode {
            label: "x".to_string(),
            children: Vec::new(),
            raw_value: Some("42".to_string()),
        };
        assert_eq!(node.value_parts(), None);
    }
}
