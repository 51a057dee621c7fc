//! Type-safe message system for ohmd
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use std::collections::BTreeMap;

use super::state::SensorDescription;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// A sensor was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
        description: SensorDescription,
    },

    /// A sensor produced a new reading
    SensorStateChanged {
        entity_id: String,
        value: Option<f64>,
        attributes: BTreeMap<String, String>,
    },

    /// A refresh cycle completed successfully
    UpdateSucceeded { integration_name: String },

    /// A refresh cycle failed; previously published states stand
    UpdateFailed {
        integration_name: String,
        error: String,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToIntegrationMessage {
    /// Run a refresh cycle now instead of waiting for the next interval
    Refresh,
}
