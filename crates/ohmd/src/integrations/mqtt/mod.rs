//! MQTT bridge.
//!
//! Republishes every engine sensor through Home Assistant MQTT discovery:
//! one retained config message per sensor, then retained state and
//! attribute messages on every reading.

mod bridge;
mod client;
mod discovery;

pub use bridge::MqttBridge;
pub use client::MqttClient;
pub use client::RumqttcClient;
