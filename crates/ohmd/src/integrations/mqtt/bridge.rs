use std::error::Error;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::discovery::SensorDiscoveryMessage;
use super::discovery::attributes_topic;
use super::discovery::config_topic;
use super::discovery::object_id;
use super::discovery::state_topic;
use crate::config::MqttConfig;
use crate::engine::Engine;
use crate::engine::Event;
use crate::engine::SensorState;
use crate::engine::State;

/// Payload Home Assistant reads as "no reading"
const PAYLOAD_NONE: &str = "None";

/// Republishes engine sensors over MQTT using Home Assistant discovery
pub struct MqttBridge<C: MqttClient> {
    client: C,
    config: MqttConfig,
}

impl<C: MqttClient> MqttBridge<C> {
    pub fn new(client: C, config: &MqttConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    /// Connect to the broker
    pub async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!(
            "Connecting to MQTT broker at {}:{}",
            self.config.broker, self.config.port
        );
        self.client.connect().await
    }

    /// Forward engine events until the engine goes away
    ///
    /// Sensors the engine already knows about are published first. After
    /// falling behind the event stream everything is published again from
    /// the current state.
    pub async fn run(mut self, engine: Arc<Engine>) {
        let mut events = engine.subscribe();
        self.resync(&engine.state_snapshot()).await;

        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.handle_event(&event).await {
                        warn!("Failed to publish to MQTT: {}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("MQTT bridge missed {} events, resyncing", skipped);
                    self.resync(&engine.state_snapshot()).await;
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!("MQTT bridge stopped");
    }

    /// Publish discovery and current state of every known sensor
    async fn resync(&mut self, state: &State) {
        let mut entity_ids: Vec<_> = state.sensors.keys().collect();
        entity_ids.sort();

        for entity_id in entity_ids {
            let sensor = &state.sensors[entity_id];
            if let Err(e) = self.publish_discovery(entity_id, sensor).await {
                warn!("Failed to publish discovery for {}: {}", entity_id, e);
                continue;
            }
            if let Err(e) = self.publish_state(entity_id, sensor).await {
                warn!("Failed to publish state for {}: {}", entity_id, e);
            }
        }
    }

    async fn handle_event(&mut self, event: &Event) -> Result<(), Box<dyn Error + Send>> {
        match event {
            Event::SensorDiscovered { entity_id, state } => {
                self.publish_discovery(entity_id, state).await
            }
            Event::SensorStateChanged { entity_id, state } => {
                self.publish_state(entity_id, state).await
            }
            Event::UpdateFailed { .. } => Ok(()),
        }
    }

    async fn publish_discovery(
        &mut self,
        entity_id: &str,
        sensor: &SensorState,
    ) -> Result<(), Box<dyn Error + Send>> {
        let object_id = object_id(entity_id);
        let message = SensorDiscoveryMessage::new(object_id, sensor, &self.config);
        let payload =
            serde_json::to_vec(&message).map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        debug!("Announcing {} over MQTT", entity_id);
        self.client
            .publish(
                &config_topic(&self.config.discovery_prefix, object_id),
                &payload,
                true,
            )
            .await
    }

    async fn publish_state(
        &mut self,
        entity_id: &str,
        sensor: &SensorState,
    ) -> Result<(), Box<dyn Error + Send>> {
        let object_id = object_id(entity_id);

        let value = sensor
            .value
            .map_or_else(|| PAYLOAD_NONE.to_string(), |v| v.to_string());
        self.client
            .publish(
                &state_topic(&self.config.state_prefix, object_id),
                value.as_bytes(),
                true,
            )
            .await?;

        let attributes = serde_json::to_vec(&sensor.attributes)
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
        self.client
            .publish(
                &attributes_topic(&self.config.state_prefix, object_id),
                &attributes,
                true,
            )
            .await
    }
}
