//! HTTP server bootstrap for the statement ledger.
//!
//! This module wires together:
//! - configuration
//! - the ledger store and chat log (PostgreSQL or in-memory)
//! - the completion oracle, when one is configured
//! - the chain linker and the verification/query pipelines
//! - the Axum router

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::infra::{
    ChatLog, InMemoryChatLog, InMemoryLedgerStore, LedgerStore, PgChatLog, PgLedgerStore,
    RetryConfig,
};
use crate::ledger::{ChainLinker, QueryPipeline, RetrievalMode, VerificationPipeline};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::oracle::{CompletionOracle, HttpOracle, OracleConfig};
use crate::telemetry::{self, TelemetryConfig};

/// Where ledger entries and chat turns are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("unknown LEDGER_STORE: {other:?} (expected postgres or memory)"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ledger store backend.
    pub store: StoreBackend,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Run embedded migrations before serving.
    pub migrate_on_startup: bool,
    /// Compare-and-swap retries before an append fails with a conflict.
    pub append_max_retries: u32,
    /// Retrieval strategy order for `ask`.
    pub retrieval_mode: RetrievalMode,
    /// `*` or a comma-separated origin list.
    pub cors_allow_origins: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    ///
    /// Malformed numbers fall back to their defaults; an unknown store
    /// backend or retrieval mode is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let store = match lookup("LEDGER_STORE") {
            Some(v) => v.parse()?,
            None => StoreBackend::Postgres,
        };

        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "postgres://localhost/statement_ledger".to_string());

        let port: u16 = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {host}:{port}: {e}"))?;

        let max_connections: u32 = lookup("MAX_DB_CONNECTIONS")
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let migrate_on_startup = lookup("DB_MIGRATE_ON_STARTUP")
            .map(|v| {
                !matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "off"
                )
            })
            .unwrap_or(true);

        let append_max_retries = lookup("CHAIN_APPEND_MAX_RETRIES")
            .and_then(|p| p.parse().ok())
            .unwrap_or(RetryConfig::chain_append().max_retries);

        let retrieval_mode = match lookup("RETRIEVAL_MODE") {
            Some(v) => v
                .parse::<RetrievalMode>()
                .map_err(|e| anyhow::anyhow!(e.to_string()))?,
            None => RetrievalMode::default(),
        };

        let cors_allow_origins = lookup("CORS_ALLOW_ORIGINS").unwrap_or_else(|| "*".to_string());

        Ok(Self {
            store,
            database_url,
            listen_addr,
            max_connections,
            migrate_on_startup,
            append_max_retries,
            retrieval_mode,
            cors_allow_origins,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub linker: Arc<ChainLinker>,
    pub verifier: Arc<VerificationPipeline>,
    pub query: Arc<QueryPipeline>,
    pub store: Arc<dyn LedgerStore>,
    pub chat_log: Arc<dyn ChatLog>,
    pub oracle: Option<Arc<dyn CompletionOracle>>,
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    /// Wire the ledger services over the given collaborators.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        chat_log: Arc<dyn ChatLog>,
        oracle: Option<Arc<dyn CompletionOracle>>,
        retry: RetryConfig,
        mode: RetrievalMode,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());

        let linker = ChainLinker::new(store.clone(), metrics.clone()).with_retry(retry);
        let verifier = VerificationPipeline::new(store.clone(), oracle.clone(), metrics.clone());
        let query = QueryPipeline::new(store.clone(), oracle.clone(), metrics.clone())
            .with_chat_log(chat_log.clone())
            .with_mode(mode);

        Self {
            linker: Arc::new(linker),
            verifier: Arc::new(verifier),
            query: Arc::new(query),
            store,
            chat_log,
            oracle,
            metrics,
        }
    }

    /// In-memory store and chat log, for local runs and tests.
    pub fn in_memory(oracle: Option<Arc<dyn CompletionOracle>>) -> Self {
        Self::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryChatLog::new()),
            oracle,
            RetryConfig::chain_append(),
            RetrievalMode::default(),
        )
    }
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    telemetry::init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialise telemetry: {e}"))?;

    info!("Starting statement ledger v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Store backend: {:?}", config.store);
    info!("  Retrieval mode: {:?}", config.retrieval_mode);

    let (store, chat_log) = connect_store(&config).await?;

    let oracle: Option<Arc<dyn CompletionOracle>> = match OracleConfig::from_env() {
        Some(oracle_config) => {
            info!("Completion oracle configured: {:?}", oracle_config);
            let oracle: Arc<dyn CompletionOracle> = Arc::new(HttpOracle::new(oracle_config)?);
            Some(oracle)
        }
        None => {
            warn!("Completion oracle not configured (set ORACLE_API_KEY to enable verification and synthesized answers)");
            None
        }
    };

    let retry = RetryConfig::chain_append().with_max_retries(config.append_max_retries);
    let state = AppState::new(store, chat_log, oracle, retry, config.retrieval_mode);

    if let Some(tail) = state.linker.tail().await? {
        state
            .metrics
            .set_gauge(metric_names::CHAIN_HEIGHT, tail.height)
            .await;
        info!(height = tail.height, tail = %tail.block_fingerprint, "Ledger tail loaded");
    }

    let app = build_router(state, cors_layer(&config.cors_allow_origins)?);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("Statement ledger is ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}

async fn connect_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn LedgerStore>, Arc<dyn ChatLog>)> {
    match config.store {
        StoreBackend::Memory => {
            warn!("Using the in-memory ledger store; entries are lost on restart");
            let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
            let chat_log: Arc<dyn ChatLog> = Arc::new(InMemoryChatLog::new());
            Ok((store, chat_log))
        }
        StoreBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.database_url)
                .await?;
            info!("Connected to PostgreSQL");

            if config.migrate_on_startup {
                info!("Running database migrations...");
                crate::migrations::run_postgres(&pool).await?;
                info!("Database migrations applied");
            } else {
                info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
            }

            let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool.clone()));
            let chat_log: Arc<dyn ChatLog> = Arc::new(PgChatLog::new(pool));
            Ok((store, chat_log))
        }
    }
}

/// Full application router: API, probes, metrics, CORS and request tracing.
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .nest("/api", crate::api::router())
        .route("/health", get(crate::api::handlers::health_check))
        .route("/ready", get(crate::api::handlers::readiness_check))
        .route("/metrics", get(crate::api::handlers::metrics_export))
        .fallback(crate::api::not_found)
        .layer(TraceLayer::new_for_http().make_span_with(telemetry::http_request_span::<axum::body::Body>))
        .layer(cors)
        .with_state(state)
}

/// CORS policy from a `*` or comma-separated origin list.
///
/// Pre-flight requests are answered by the layer with an empty success.
pub fn cors_layer(origins: &str) -> anyhow::Result<CorsLayer> {
    let origins = origins.trim();

    let allow_origin = if origins.is_empty() || origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed never fires; the other one still can.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
