pub mod api;
pub mod config;
mod engine;
mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::Event;
pub use engine::SensorState;
pub use engine::State;
#[cfg(feature = "integration_mqtt")]
pub use integrations::mqtt::MqttBridge;
#[cfg(feature = "integration_mqtt")]
pub use integrations::mqtt::RumqttcClient;
