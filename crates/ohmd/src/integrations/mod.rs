#[cfg(feature = "integration_mqtt")]
pub mod mqtt;
#[cfg(feature = "integration_openhardwaremonitor")]
mod openhardwaremonitor;
