use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use escrow_indexer::api::{create_router, AppState};
use escrow_indexer::db::DbPool;
use escrow_indexer::deposits::{
    DepositDecoder, DepositNormalizer, DepositStore, IngestionService, LedgerWindowSource,
    OpaqueValueDecoder, PgDepositStore, PlainValueDecoder,
};
use escrow_indexer::escrow::PgEscrowStore;
use escrow_indexer::rpc::{
    EventFeed, MockEventFeed, RateLimitConfig, RpcClientConfig, SorobanRpcClient,
};
use escrow_indexer::types::config::indexer::IndexerConfig;
use escrow_indexer::types::config::rpc::RpcConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = IndexerConfig::load()?;

    let pool = Arc::new(
        DbPool::new(&config.database)
            .await
            .context("failed to connect to database")?,
    );
    if config.database.run_migrations {
        pool.run_migrations().await.context("failed to run migrations")?;
    } else {
        tracing::info!("Skipping migrations (RUN_MIGRATIONS=false)");
    }

    let (feed, decoder, origin) = build_feed(&config.rpc)?;
    let source = Arc::new(LedgerWindowSource::new(feed, &config.ingestion));
    let deposits: Arc<dyn DepositStore> = Arc::new(PgDepositStore::new(pool.clone()));
    let ingestion = IngestionService::new(
        source,
        DepositNormalizer::new(decoder, origin),
        deposits.clone(),
        config.ingestion.read_back_limit,
    )
    .with_run_timeout(config.ingestion.run_timeout());

    let shutdown = CancellationToken::new();
    let state = AppState {
        ingestion: Arc::new(ingestion),
        deposits,
        escrows: Arc::new(PgEscrowStore::new(pool)),
        shutdown: shutdown.clone(),
    };

    let listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

type FeedParts = (Arc<dyn EventFeed>, Arc<dyn DepositDecoder>, &'static str);

/// Fixture feed when mocking, otherwise the RPC client. Each feed comes
/// with the decoder that understands its payloads.
fn build_feed(config: &RpcConfig) -> anyhow::Result<FeedParts> {
    if config.use_mock {
        tracing::warn!("Using mock event feed, no chain endpoint will be contacted");
        let feed: Arc<dyn EventFeed> = Arc::new(MockEventFeed::new());
        let decoder: Arc<dyn DepositDecoder> = Arc::new(PlainValueDecoder);
        return Ok((feed, decoder, "mock"));
    }

    let url = config
        .url
        .as_deref()
        .context("SOROBAN_RPC_URL must be set unless RPC_USE_MOCK=true")?;
    let mut client_config = RpcClientConfig::from_url(url)
        .context("invalid SOROBAN_RPC_URL")?
        .with_timeout(config.timeout);
    if let Some(rps) = config.requests_per_second {
        client_config = client_config.with_rate_limit(RateLimitConfig::per_second(rps));
    }
    let client = SorobanRpcClient::new(client_config)?;
    tracing::info!("Using event feed {:?}", client);

    let feed: Arc<dyn EventFeed> = Arc::new(client);
    let decoder: Arc<dyn DepositDecoder> = Arc::new(OpaqueValueDecoder);
    Ok((feed, decoder, "soroban_rpc"))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling in-flight ingestion");
    shutdown.cancel();
}
