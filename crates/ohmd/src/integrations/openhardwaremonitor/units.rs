//! Unit canonicalization for OpenHardwareMonitor readings.
//!
//! OpenHardwareMonitor's unit spelling doesn't always match the canonical
//! spelling (it reports `KB/s`, `KHz`, ...), so raw unit tokens are mapped
//! case-insensitively onto a fixed table. Tokens outside the table (`%`,
//! `RPM`, ...) pass through unchanged.

use std::fmt;

use crate::engine::SensorDeviceClass;

/// A canonical unit of measurement, or a raw token passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Unit {
    KilobytesPerSecond,
    MegabytesPerSecond,
    GigabytesPerSecond,
    Hertz,
    Kilohertz,
    Megahertz,
    Gigahertz,
    Celsius,
    Fahrenheit,
    Watt,
    Gigabytes,
    Megabytes,
    Kilobytes,
    Bytes,
    Volt,
    /// A unit not in the canonical table
    Other(String),
}

impl Unit {
    /// Canonicalize a raw unit token from a sensor value string
    pub fn canonicalize(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "kb/s" => Self::KilobytesPerSecond,
            "mb/s" => Self::MegabytesPerSecond,
            "gb/s" => Self::GigabytesPerSecond,
            "hz" => Self::Hertz,
            "khz" => Self::Kilohertz,
            "mhz" => Self::Megahertz,
            "ghz" => Self::Gigahertz,
            "°c" => Self::Celsius,
            "°f" => Self::Fahrenheit,
            "w" => Self::Watt,
            "gb" => Self::Gigabytes,
            "mb" => Self::Megabytes,
            "kb" => Self::Kilobytes,
            "b" => Self::Bytes,
            "v" => Self::Volt,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Canonical spelling of the unit
    pub fn as_str(&self) -> &str {
        match self {
            Self::KilobytesPerSecond => "kB/s",
            Self::MegabytesPerSecond => "MB/s",
            Self::GigabytesPerSecond => "GB/s",
            Self::Hertz => "Hz",
            Self::Kilohertz => "kHz",
            Self::Megahertz => "MHz",
            Self::Gigahertz => "GHz",
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Watt => "W",
            Self::Gigabytes => "GB",
            Self::Megabytes => "MB",
            Self::Kilobytes => "kB",
            Self::Bytes => "B",
            Self::Volt => "V",
            Self::Other(raw) => raw,
        }
    }

    /// Device class implied by the canonical unit
    ///
    /// Only kilobytes per second is a data rate; MB/s and GB/s readings carry
    /// no device class. The kilo units match whatever case the daemon used.
    pub fn device_class(&self) -> Option<SensorDeviceClass> {
        match self {
            Self::Celsius | Self::Fahrenheit => Some(SensorDeviceClass::Temperature),
            Self::Watt => Some(SensorDeviceClass::Power),
            Self::Volt => Some(SensorDeviceClass::Voltage),
            Self::KilobytesPerSecond => Some(SensorDeviceClass::DataRate),
            Self::Gigabytes | Self::Megabytes | Self::Kilobytes => {
                Some(SensorDeviceClass::DataSize)
            }
            Self::Hertz | Self::Kilohertz | Self::Megahertz | Self::Gigahertz => {
                Some(SensorDeviceClass::Frequency)
            }
            Self::MegabytesPerSecond | Self::GigabytesPerSecond | Self::Bytes | Self::Other(_) => {
                None
            }
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_is_case_insensitive() {
        assert_eq!(Unit::canonicalize("W"), Unit::Watt);
        assert_eq!(Unit::canonicalize("w"), Unit::Watt);
        assert_eq!(Unit::canonicalize("KB/s"), Unit::KilobytesPerSecond);
        assert_eq!(Unit::canonicalize("KHz"), Unit::Kilohertz);
        assert_eq!(Unit::canonicalize("°C"), Unit::Celsius);
        assert_eq!(Unit::canonicalize("°c"), Unit::Celsius);
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for raw in [
            "KB/s", "MB/s", "GB/s", "Hz", "KHz", "MHz", "GHz", "°C", "°F", "W", "GB", "MB",
            "KB", "B", "V", "%", "RPM", "dB",
        ] {
            let once = Unit::canonicalize(raw);
            let twice = Unit::canonicalize(once.as_str());
            assert_eq!(once, twice, "canonicalizing {:?} twice changed it", raw);
        }
    }

    #[test]
    fn test_unmapped_tokens_pass_through() {
        assert_eq!(Unit::canonicalize("RPM"), Unit::Other("RPM".to_string()));
        assert_eq!(Unit::canonicalize("%").to_string(), "%");
        assert_eq!(Unit::canonicalize("x").device_class(), None);
    }

    #[test]
    fn test_canonical_spelling() {
        assert_eq!(Unit::canonicalize("KB/s").to_string(), "kB/s");
        assert_eq!(Unit::canonicalize("kb").to_string(), "kB");
        assert_eq!(Unit::canonicalize("mhz").to_string(), "MHz");
        assert_eq!(Unit::canonicalize("°f").to_string(), "°F");
    }

    #[test]
    fn test_device_class_from_unit() {
        let class = |raw: &str| Unit::canonicalize(raw).device_class();

        assert_eq!(class("°C"), Some(SensorDeviceClass::Temperature));
        assert_eq!(class("°F"), Some(SensorDeviceClass::Temperature));
        assert_eq!(class("W"), Some(SensorDeviceClass::Power));
        assert_eq!(class("V"), Some(SensorDeviceClass::Voltage));
        assert_eq!(class("KB/s"), Some(SensorDeviceClass::DataRate));
        assert_eq!(class("kB/s"), Some(SensorDeviceClass::DataRate));
        assert_eq!(class("MB/s"), None);
        assert_eq!(class("GB/s"), None);
        assert_eq!(class("GB"), Some(SensorDeviceClass::DataSize));
        assert_eq!(class("MB"), Some(SensorDeviceClass::DataSize));
        assert_eq!(class("KB"), Some(SensorDeviceClass::DataSize));
        assert_eq!(class("MHz"), Some(SensorDeviceClass::Frequency));
        assert_eq!(class("Hz"), Some(SensorDeviceClass::Frequency));
        assert_eq!(class("KHz"), Some(SensorDeviceClass::Frequency));
        assert_eq!(class("B"), None);
        assert_eq!(class("%"), None);
        assert_eq!(class("RPM"), None);
    }
}
