use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::client::Fetcher;
use super::coordinator::Coordinator;
use super::flatten::derive_entities;
use super::sensor::OhmSensor;
use super::sensor::slugify;
use super::tree::SensorNode;
use crate::config::OhmConfig;
use crate::engine::Device;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// OpenHardwareMonitor integration for ohmd
///
/// Polls one OpenHardwareMonitor endpoint and publishes every metric leaf of
/// its sensor tree as a sensor entity.
pub struct OhmIntegration<F: Fetcher> {
    name: String,
    scan_interval: Duration,
    coordinator: Arc<Coordinator<F>>,
    /// Wakes the poll task for an immediate cycle
    refresh_tx: Option<mpsc::Sender<()>>,
    poll_task: Option<JoinHandle<()>>,
}

impl<F: Fetcher + 'static> OhmIntegration<F> {
    /// Create the integration for the endpoint configured under `key`
    pub fn new(key: &str, config: &OhmConfig, fetcher: F) -> Self {
        Self {
            name: format!("{}.{}", DOMAIN, key),
            scan_interval: config.scan_interval(),
            coordinator: Arc::new(Coordinator::new(fetcher)),
            refresh_tx: None,
            poll_task: None,
        }
    }
}

#[async_trait]
impl<F: Fetcher + 'static> Integration for OhmIntegration<F> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        info!("{} polling every {:?}", self.name, self.scan_interval);

        // Capacity 1: triggers arriving while one is pending collapse into it
        let (refresh_tx, refresh_rx) = mpsc::channel(1);

        let poller = Poller {
            integration_name: self.name.clone(),
            coordinator: self.coordinator.clone(),
            to_engine: tx,
            sensors: None,
        };
        let scan_interval = self.scan_interval;
        self.poll_task = Some(tokio::spawn(poller.run(scan_interval, refresh_rx)));
        self.refresh_tx = Some(refresh_tx);

        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::Refresh => {
                let Some(refresh_tx) = &self.refresh_tx else {
                    debug!("{} not polling, ignoring refresh", self.name);
                    return Ok(());
                };
                match refresh_tx.try_send(()) {
                    Ok(()) => debug!("{} refresh requested", self.name),
                    Err(TrySendError::Full(())) => {
                        debug!("{} refresh already pending", self.name)
                    }
                    Err(TrySendError::Closed(())) => {
                        warn!("{} poll task is gone, cannot refresh", self.name)
                    }
                }
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("{} shutting down", self.name);
        self.refresh_tx = None;
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl<F: Fetcher> Drop for OhmIntegration<F> {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

/// State owned by the poll task
struct Poller<F: Fetcher> {
    integration_name: String,
    coordinator: Arc<Coordinator<F>>,
    to_engine: FromIntegrationSender,
    /// Derived at the first successful fetch, fixed afterwards
    sensors: Option<Vec<OhmSensor>>,
}

impl<F: Fetcher> Poller<F> {
    /// Run a cycle now, then on every tick or refresh trigger
    async fn run(mut self, scan_interval: Duration, mut refresh_rx: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                Some(()) = refresh_rx.recv() => {
                    interval.reset();
                }
            }

            if self.cycle().await.is_err() {
                info!(
                    "{} stopping, engine is no longer receiving",
                    self.integration_name
                );
                break;
            }
        }
    }

    /// One refresh cycle
    ///
    /// Only fails when the engine has gone away.
    async fn cycle(&mut self) -> Result<(), SendError<FromIntegrationMessage>> {
        let snapshot = match self.coordinator.refresh().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("{} update failed: {}", self.integration_name, e);
                if let Some(last) = self.coordinator.data() {
                    debug!(
                        "{} keeping snapshot from {:?} ago",
                        self.integration_name,
                        last.fetched_at.elapsed()
                    );
                }
                return self
                    .to_engine
                    .send(FromIntegrationMessage::UpdateFailed {
                        integration_name: self.integration_name.clone(),
                        error: e.to_string(),
                    })
                    .await;
            }
        };

        let root = snapshot.root.as_ref();

        if self.sensors.is_none() {
            let sensors = build_sensors(root);
            info!(
                "{} discovered {} sensors",
                self.integration_name,
                sensors.len()
            );
            for sensor in &sensors {
                self.to_engine
                    .send(FromIntegrationMessage::EntityDiscovered {
                        entity_id: sensor.entity_id.clone(),
                        integration_name: self.integration_name.clone(),
                        description: sensor.description(&self.integration_name),
                    })
                    .await?;
            }
            self.sensors = Some(sensors);
        }

        match root {
            Some(root) => {
                for sensor in self.sensors.iter_mut().flatten() {
                    if let Err(e) = sensor.refresh(root) {
                        debug!("{} not updated: {}", sensor.entity_id, e);
                        continue;
                    }
                    self.to_engine
                        .send(FromIntegrationMessage::SensorStateChanged {
                            entity_id: sensor.entity_id.clone(),
                            value: sensor.value,
                            attributes: sensor.attributes.clone(),
                        })
                        .await?;
                }
            }
            None => debug!("{} served an empty sensor tree", self.integration_name),
        }

        self.to_engine
            .send(FromIntegrationMessage::UpdateSucceeded {
                integration_name: self.integration_name.clone(),
            })
            .await
    }
}

/// Derive the fixed sensor set from the first snapshot
fn build_sensors(root: Option<&SensorNode>) -> Vec<OhmSensor> {
    let Some(root) = root else {
        return Vec::new();
    };

    // The root's first child is the monitored machine
    let device = root.children.first().map(|machine| {
        Device::new(machine.label.clone())
            .with_model(machine.label.clone())
            .with_identifier(DOMAIN, &machine.label)
    });

    let mut taken = HashSet::new();
    derive_entities(root)
        .into_iter()
        .map(|descriptor| {
            let entity_id = unique_entity_id(&mut taken, &descriptor.display_name);
            OhmSensor::new(descriptor, entity_id, device.clone())
        })
        .collect()
}

/// `sensor.<slug>`, suffixed with `_2`, `_3`, ... until unused
fn unique_entity_id(taken: &mut HashSet<String>, display_name: &str) -> String {
    let mut slug = slugify(display_name);
    if slug.is_empty() {
        slug = "unnamed".to_string();
    }

    let mut entity_id = format!("sensor.{}", slug);
    let mut n = 2;
    while taken.contains(&entity_id) {
        entity_id = format!("sensor.{}_{}", slug, n);
        n += 1;
    }
    taken.insert(entity_id.clone());
    entity_id
}
