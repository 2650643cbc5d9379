use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use super::feed::EventFeed;
use super::types::{
    EventsPage, EventsRequest, JsonRpcRequest, JsonRpcResponse, LatestLedger, JSONRPC_VERSION,
};

/// Failure talking to the chain endpoint. Every variant is fatal to the
/// fetch that produced it.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),
}

impl RpcError {
    fn from_reqwest(method: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RpcError::Timeout(format!("{}: {}", method, e))
        } else {
            RpcError::Transport(format!("{}: {}", method, e))
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl RateLimitConfig {
    pub fn per_second(requests_per_second: NonZeroU32) -> Self {
        Self {
            requests_per_second,
            jitter_min_ms: 5,
            jitter_max_ms: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub url: Url,
    /// Per-call timeout covering connect, send and body read.
    pub timeout: Duration,
    pub rate_limit: Option<RateLimitConfig>,
}

impl RpcClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(30),
            rate_limit: None,
        }
    }

    pub fn from_url(url: &str) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::new(url))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }
}

/// JSON-RPC client for a Soroban RPC endpoint.
pub struct SorobanRpcClient {
    http: reqwest::Client,
    config: RpcClientConfig,
    request_id: AtomicU64,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
    jitter: Option<Jitter>,
}

impl SorobanRpcClient {
    pub fn new(config: RpcClientConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let (rate_limiter, jitter) = if let Some(ref rate_config) = config.rate_limit {
            let quota = Quota::per_second(rate_config.requests_per_second);
            let limiter = RateLimiter::direct(quota);
            let jitter = Jitter::new(
                Duration::from_millis(rate_config.jitter_min_ms),
                Duration::from_millis(rate_config.jitter_max_ms),
            );
            (Some(Arc::new(limiter)), Some(jitter))
        } else {
            (None, None)
        };

        Ok(Self {
            http,
            config,
            request_id: AtomicU64::new(1),
            rate_limiter,
            jitter,
        })
    }

    async fn wait_for_rate_limit(&self) {
        if let (Some(limiter), Some(jitter)) = (&self.rate_limiter, &self.jitter) {
            limiter.until_ready_with_jitter(*jitter).await;
        }
    }

    /// Performs one JSON-RPC round-trip and decodes `result` into `R`.
    pub async fn call<P, R>(&self, method: &str, params: Option<P>) -> Result<R, RpcError>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        self.wait_for_rate_limit().await;

        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .http
            .post(self.config.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest(method, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("RPC '{}' returned HTTP {}: {}", method, status, body);
            return Err(RpcError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RpcError::from_reqwest(method, e))?;

        let envelope: JsonRpcResponse = serde_json::from_slice(&body)
            .map_err(|e| RpcError::MalformedResponse(format!("{}: {}", method, e)))?;

        if let Some(error) = envelope.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = envelope
            .result
            .ok_or_else(|| RpcError::MalformedResponse(format!("{}: missing result", method)))?;

        serde_json::from_value(result)
            .map_err(|e| RpcError::MalformedResponse(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl EventFeed for SorobanRpcClient {
    async fn latest_ledger(&self) -> Result<u32, RpcError> {
        let latest: LatestLedger = self.call::<(), _>("getLatestLedger", None).await?;
        Ok(latest.sequence)
    }

    async fn events_page(&self, request: &EventsRequest) -> Result<EventsPage, RpcError> {
        self.call("getEvents", Some(request)).await
    }
}

impl std::fmt::Debug for SorobanRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SorobanRpcClient")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish()
    }
}
