use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use tracing::debug;

use super::client::FetchError;
use super::client::Fetcher;
use super::tree::SensorNode;

/// Result of one successful fetch
#[derive(Debug)]
pub struct Snapshot {
    /// `None` when the daemon served a `null` tree
    pub root: Option<SensorNode>,
    pub fetched_at: Instant,
}

/// A refresh cycle could not produce a new snapshot
#[derive(Debug, thiserror::Error)]
#[error("error communicating with OpenHardwareMonitor: {0}")]
pub struct UpdateFailed(#[from] pub FetchError);

/// Fetches the sensor tree and caches the last good snapshot.
///
/// The cache is only replaced after a completed successful fetch, so a failed
/// or abandoned refresh leaves the previous snapshot readable.
pub struct Coordinator<F: Fetcher> {
    fetcher: F,
    snapshot: ArcSwapOption<Snapshot>,
}

impl<F: Fetcher> Coordinator<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            snapshot: ArcSwapOption::empty(),
        }
    }

    /// Fetch once and cache the result on success
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, UpdateFailed> {
        let root = self.fetcher.fetch().await?;
        let snapshot = Arc::new(Snapshot {
            root,
            fetched_at: Instant::now(),
        });
        self.snapshot.store(Some(snapshot.clone()));
        debug!("Cached new sensor tree snapshot");
        Ok(snapshot)
    }

    /// Last good snapshot, if any fetch has succeeded yet
    pub fn data(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }
}
