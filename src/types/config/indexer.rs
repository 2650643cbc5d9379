use std::env;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::types::config::database::{DatabaseConfig, DEFAULT_DSN};
use crate::types::config::ingestion::IngestionConfig;
use crate::types::config::rpc::RpcConfig;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_INGESTION_CONFIG: &str = "config/ingestion.json";

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub http_addr: SocketAddr,
    pub rpc: RpcConfig,
    pub database: DatabaseConfig,
    pub ingestion: IngestionConfig,
}

impl IndexerConfig {
    /// Builds the config from process env (after loading `.env`, if any) and
    /// the optional ingestion tuning file.
    pub fn load() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).context("failed to load .env file");
            }
        }

        let mut config = Self::from_lookup(|key| env::var(key).ok())?;

        let ingestion_path = env::var("INGESTION_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_INGESTION_CONFIG));
        config.ingestion = IngestionConfig::load_or_default(&ingestion_path)?;

        Ok(config)
    }

    /// Builds the env-driven part of the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let http_addr = get("HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr: SocketAddr = http_addr
            .parse()
            .with_context(|| format!("invalid HTTP_ADDR '{}'", http_addr))?;

        let use_mock = get("RPC_USE_MOCK")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        let url = get("SOROBAN_RPC_URL");
        anyhow::ensure!(
            use_mock || url.is_some(),
            "SOROBAN_RPC_URL must be set unless RPC_USE_MOCK=true"
        );

        let rpc = RpcConfig {
            url,
            use_mock,
            timeout: Duration::from_secs(parse_positive(&get, "RPC_TIMEOUT_SECS", 30)),
            requests_per_second: get("RPC_REQUESTS_PER_SECOND")
                .and_then(|v| v.parse::<u32>().ok())
                .and_then(NonZeroU32::new),
        };

        let database = DatabaseConfig {
            dsn: get("DB_DSN").unwrap_or_else(|| DEFAULT_DSN.to_string()),
            max_conns: parse_positive(&get, "DB_MAX_CONNS", 10),
            connect_timeout: Duration::from_secs(parse_positive(&get, "DB_CONNECT_TIMEOUT_SECS", 5)),
            wait_timeout: Duration::from_secs(parse_positive(&get, "DB_WAIT_TIMEOUT_SECS", 5)),
            run_migrations: get("RUN_MIGRATIONS")
                .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
                .unwrap_or(true),
        };

        Ok(Self {
            http_addr,
            rpc,
            database,
            ingestion: IngestionConfig::default(),
        })
    }
}

/// Parses a positive number, falling back to `default` when the variable is
/// unset, unparsable or zero.
fn parse_positive<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}
