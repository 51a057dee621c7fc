use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::tree::SensorNode;
use crate::config::OhmConfig;

/// Failure to fetch the sensor tree
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to connect to {url}, is OpenHardwareMonitor running?")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed sensor tree from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        let url = url.to_string();
        if source.is_timeout() {
            Self::Timeout { url, source }
        } else if source.is_connect() {
            Self::Connect { url, source }
        } else if source.is_decode() {
            Self::Decode { url, source }
        } else {
            Self::Request { url, source }
        }
    }
}

/// Trait for fetching the sensor tree
///
/// This trait allows for mocking the daemon for testing purposes
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the full sensor tree
    ///
    /// `Ok(None)` means the daemon answered with an absent (`null`) tree.
    async fn fetch(&self) -> Result<Option<SensorNode>, FetchError>;
}

/// Fetcher for OpenHardwareMonitor's remote web server using reqwest
pub struct ReqwestFetcher {
    client: reqwest::Client,
    url: String,
}

impl ReqwestFetcher {
    /// Create a new ReqwestFetcher from configuration
    pub fn new(config: &OhmConfig) -> anyhow::Result<Self> {
        Self::with_url(config.data_url(), config.timeout())
    }

    pub fn with_url(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self) -> Result<Option<SensorNode>, FetchError> {
        debug!("Fetching {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        response
            .json::<Option<SensorNode>>()
            .await
            .map_err(|e| FetchError::from_reqwest(&self.url, e))
    }
}

#[cfg(test)]
type MockResults = std::collections::VecDeque<Result<Option<SensorNode>, reqwest::StatusCode>>;

/// Mock fetcher for testing
///
/// Returns the queued results in order, then keeps failing with HTTP 503.
#[cfg(test)]
#[derive(Default)]
pub struct MockFetcher {
    results: std::sync::Mutex<MockResults>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful fetch
    pub fn push_tree(&self, tree: Option<SensorNode>) {
        self.results.lock().unwrap().push_back(Ok(tree));
    }

    /// Queue a failed fetch with the given status
    pub fn push_failure(&self, status: reqwest::StatusCode) {
        self.results.lock().unwrap().push_back(Err(status));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self) -> Result<Option<SensorNode>, FetchError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let next = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        next.map_err(|status| FetchError::Status {
            url: "http://mock:8085/data.json".to_string(),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tokio::net::TcpListener;

    use super::*;

    /// Serve `router` on an ephemeral local port
    async fn serve(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn fetcher(addr: SocketAddr, timeout: Duration) -> ReqwestFetcher {
        ReqwestFetcher::with_url(format!("http://{}/data.json", addr), timeout).unwrap()
    }

    #[test]
    fn test_url_from_config() {
        let mut config = OhmConfig::new("desktop.lan");
        config.port = 8086;
        let fetcher = ReqwestFetcher::new(&config).unwrap();
        assert_eq!(fetcher.url(), "http://desktop.lan:8086/data.json");
    }

    #[tokio::test]
    async fn test_fetch_tree() {
        let body = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/openhardwaremonitor.json"
        ));
        let addr = serve(Router::new().route("/data.json", get(move || async move { body }))).await;

        let tree = fetcher(addr, Duration::from_secs(5))
            .fetch()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tree.label, "Sensor");
        assert_eq!(tree.children[0].label, "Test PC");
    }

    #[tokio::test]
    async fn test_fetch_null_tree() {
        let addr = serve(Router::new().route("/data.json", get(|| async { "null" }))).await;
        let tree = fetcher(addr, Duration::from_secs(5)).fetch().await.unwrap();
        assert_eq!(tree, None);
    }

    #[tokio::test]
    async fn test_fetch_malformed_json() {
        let addr = serve(Router::new().route("/data.json", get(|| async { "{\"Text\": " }))).await;
        let err = fetcher(addr, Duration::from_secs(5)).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let addr = serve(Router::new()).await;
        let err = fetcher(addr, Duration::from_secs(5)).fetch().await.unwrap_err();
        assert!(
            matches!(err, FetchError::Status { status, .. } if status == StatusCode::NOT_FOUND),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let addr = serve(Router::new().route(
            "/data.json",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "null"
            }),
        ))
        .await;

        let err = fetcher(addr, Duration::from_millis(100)).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind and immediately drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let err = fetcher(addr, Duration::from_secs(5)).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Connect { .. }), "got {:?}", err);
    }
}
