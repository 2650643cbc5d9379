use std::num::NonZeroU32;
use std::time::Duration;

/// How the indexer reaches the chain.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Endpoint URL. `None` only when `use_mock` is set.
    pub url: Option<String>,
    pub use_mock: bool,
    pub timeout: Duration,
    pub requests_per_second: Option<NonZeroU32>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: None,
            use_mock: false,
            timeout: Duration::from_secs(30),
            requests_per_second: None,
        }
    }
}
