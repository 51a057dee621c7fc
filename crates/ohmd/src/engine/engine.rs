use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::event::Event;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::IntegrationContext;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::IntegrationStatus;
use super::state::SensorState;
use super::state::State;

/// ohmd engine
///
/// This structure handles the flow of messages from integrations, maintains a
/// view of the world with State, and fans state changes out to subscribers.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Communication channels to integrations (for commands), keyed by integration name
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Fan-out of engine events to subscribers
    event_tx: broadcast::Sender<Event>,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

/// Capacity for the engine→subscriber event channel
const EVENT_CHANNEL_SIZE: usize = 1024;

/// How long shutdown waits for an integration task to finish
const INTEGRATION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            event_tx,
            integration_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every registered integration factory against the config and
    /// registers the instances they return.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integrations = match constr(&ctx) {
                Ok(i) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
            };
            for integration in integrations {
                let name = integration.name().to_string();
                self.register_integration(name, integration);
            }
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        if let Ok(mut channels) = self.integration_channels.lock() {
            if channels.insert(name.clone(), to_integration_tx).is_some() {
                warn!("Integration '{}' registered twice, replacing", name);
            }
        }

        info!("Registering integration '{}'", name);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        if let Ok(mut handles) = self.integration_handles.lock() {
            handles.push(handle);
        }
    }

    /// Names of all registered integrations
    pub fn integration_names(&self) -> Vec<String> {
        self.integration_channels
            .lock()
            .map(|channels| channels.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Send a command to a named integration
    pub fn send_command(
        &self,
        integration_name: &str,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        let channels = self
            .integration_channels
            .lock()
            .map_err(|e| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::other(e.to_string()))
            })?;

        let tx = channels.get(integration_name).ok_or_else(
            || -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Integration channel not found: {}", integration_name),
                ))
            },
        )?;

        tx.send(msg)
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming messages from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            if let Err(e) = self.handle_event(msg).await {
                warn!("Error handling event: {}", e);
            }
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Stop all integrations
    ///
    /// Dropping the command channels ends each integration's command loop,
    /// which then runs the integration's own shutdown.
    pub async fn shutdown(&self) {
        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.clear();
        }

        let handles = self
            .integration_handles
            .lock()
            .map(|mut handles| std::mem::take(&mut *handles))
            .unwrap_or_default();

        for handle in handles {
            match tokio::time::timeout(INTEGRATION_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Integration task ended abnormally: {}", e),
                Err(_) => warn!("Integration task did not stop within {:?}", INTEGRATION_SHUTDOWN_TIMEOUT),
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Copy the current state, apply `f` and publish the result
    fn update_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = State::clone(&self.state.load());
        let result = f(&mut state);
        self.state.store(Arc::new(state));
        result
    }

    fn publish(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Handle a message from an integration
    async fn handle_event(&self, msg: FromIntegrationMessage) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
                description,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                let sensor = SensorState::new(description);
                let replaced = self.update_state(|state| {
                    state
                        .sensors
                        .insert(entity_id.clone(), sensor.clone())
                        .is_some()
                });
                if replaced {
                    warn!("Entity {} was already registered, replaced", entity_id);
                }

                self.publish(Event::SensorDiscovered {
                    entity_id,
                    state: sensor,
                });
            }
            FromIntegrationMessage::SensorStateChanged {
                entity_id,
                value,
                attributes,
            } => {
                debug!("Sensor state changed: {} -> {:?}", entity_id, value);

                let updated = self.update_state(|state| {
                    state.sensors.get_mut(&entity_id).map(|sensor| {
                        sensor.value = value;
                        sensor.attributes = attributes;
                        sensor.clone()
                    })
                });

                match updated {
                    Some(state) => self.publish(Event::SensorStateChanged { entity_id, state }),
                    None => {
                        return Err(Box::new(std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("State change for unknown entity: {}", entity_id),
                        )));
                    }
                }
            }
            FromIntegrationMessage::UpdateSucceeded { integration_name } => {
                debug!("Integration {} refreshed", integration_name);
                self.update_state(|state| {
                    state.integrations.insert(
                        integration_name,
                        IntegrationStatus {
                            last_update_success: true,
                            last_error: None,
                        },
                    );
                });
            }
            FromIntegrationMessage::UpdateFailed {
                integration_name,
                error,
            } => {
                warn!("Integration {} update failed: {}", integration_name, error);
                self.update_state(|state| {
                    state.integrations.insert(
                        integration_name.clone(),
                        IntegrationStatus {
                            last_update_success: false,
                            last_error: Some(error.clone()),
                        },
                    );
                });

                self.publish(Event::UpdateFailed {
                    integration_name,
                    error,
                });
            }
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::engine::state::SensorDescription;
    use crate::engine::state::StateClass;

    fn description(name: &str) -> SensorDescription {
        SensorDescription {
            integration: "test".to_string(),
            unique_id: name.to_string(),
            name: name.to_string(),
            unit_of_measurement: "W".to_string(),
            device_class: None,
            state_class: StateClass::Measurement,
            suggested_display_precision: 1,
            device: None,
        }
    }

    #[tokio::test]
    async fn test_discovery_then_state_change() {
        let engine = Engine::new();
        let mut events = engine.subscribe();

        engine
            .handle_event(FromIntegrationMessage::EntityDiscovered {
                entity_id: "sensor.cpu_package".to_string(),
                integration_name: "test".to_string(),
                description: description("CPU Package"),
            })
            .await
            .unwrap();

        let state = engine.state_snapshot();
        assert_eq!(state.sensors["sensor.cpu_package"].value, None);

        engine
            .handle_event(FromIntegrationMessage::SensorStateChanged {
                entity_id: "sensor.cpu_package".to_string(),
                value: Some(12.1),
                attributes: BTreeMap::from([("name".to_string(), "CPU Package".to_string())]),
            })
            .await
            .unwrap();

        // The earlier snapshot is unaffected
        assert_eq!(state.sensors["sensor.cpu_package"].value, None);

        let state = engine.state_snapshot();
        let sensor = &state.sensors["sensor.cpu_package"];
        assert_eq!(sensor.value, Some(12.1));
        assert_eq!(sensor.attributes["name"], "CPU Package");

        assert!(matches!(
            events.recv().await.unwrap(),
            Event::SensorDiscovered { ref entity_id, .. } if entity_id == "sensor.cpu_package"
        ));
        match events.recv().await.unwrap() {
            Event::SensorStateChanged { entity_id, state } => {
                assert_eq!(entity_id, "sensor.cpu_package");
                assert_eq!(state.value, Some(12.1));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_state_change_for_unknown_entity() {
        let engine = Engine::new();
        let result = engine
            .handle_event(FromIntegrationMessage::SensorStateChanged {
                entity_id: "sensor.nope".to_string(),
                value: Some(1.0),
                attributes: BTreeMap::new(),
            })
            .await;

        assert!(result.is_err());
        assert!(engine.state_snapshot().sensors.is_empty());
    }

    #[tokio::test]
    async fn test_update_status_tracking() {
        let engine = Engine::new();

        engine
            .handle_event(FromIntegrationMessage::UpdateFailed {
                integration_name: "test".to_string(),
                error: "connection refused".to_string(),
            })
            .await
            .unwrap();

        let status = engine.state_snapshot().integrations["test"].clone();
        assert!(!status.last_update_success);
        assert_eq!(status.last_error.as_deref(), Some("connection refused"));

        engine
            .handle_event(FromIntegrationMessage::UpdateSucceeded {
                integration_name: "test".to_string(),
            })
            .await
            .unwrap();

        let status = engine.state_snapshot().integrations["test"].clone();
        assert!(status.last_update_success);
        assert_eq!(status.last_error, None);
    }

    /// Integration that records the commands it receives
    struct RecordingIntegration {
        seen: mpsc::UnboundedSender<ToIntegrationMessage>,
    }

    #[async_trait]
    impl Integration for RecordingIntegration {
        fn name(&self) -> &str {
            "recording"
        }

        async fn setup(&mut self, _tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            let _ = self.seen.send(msg);
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_command_routes_by_name() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let mut engine = Engine::new();
        engine.register_integration(
            "recording".to_string(),
            Box::new(RecordingIntegration { seen: seen_tx }),
        );

        assert_eq!(engine.integration_names(), vec!["recording".to_string()]);
        assert!(engine.send_command("missing", ToIntegrationMessage::Refresh).is_err());

        engine
            .send_command("recording", ToIntegrationMessage::Refresh)
            .unwrap();
        assert_eq!(seen_rx.recv().await, Some(ToIntegrationMessage::Refresh));

        engine.shutdown().await;
        assert!(engine.integration_names().is_empty());
    }
}
