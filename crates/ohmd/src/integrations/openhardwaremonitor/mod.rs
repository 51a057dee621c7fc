//! OpenHardwareMonitor integration.
//!
//! Each configured endpoint is polled for its `data.json` sensor tree. The
//! first successful snapshot fixes the set of sensors; later snapshots only
//! refresh their readings.

mod client;
mod coordinator;
mod flatten;
mod ohm;
mod sensor;
mod tree;
mod units;

use anyhow::Context;
use linkme::distributed_slice;
pub use ohm::OhmIntegration;
use tracing::debug;

use crate::engine;

/// Integration domain, also the device identifier namespace
pub const DOMAIN: &str = "openhardwaremonitor";

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_openhardwaremonitor(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let mut endpoints: Vec<_> = ctx.config.integrations.openhardwaremonitor.iter().collect();
    endpoints.sort_by_key(|(key, _)| *key);

    let mut integrations: Vec<Box<dyn engine::Integration>> = Vec::new();
    for (key, config) in endpoints {
        let fetcher = client::ReqwestFetcher::new(config)
            .with_context(|| format!("Failed to create HTTP client for {}", key))?;
        debug!("{}.{} reads {}", DOMAIN, key, fetcher.url());
        integrations.push(Box::new(OhmIntegration::new(key, config, fetcher)));
    }
    Ok(integrations)
}
