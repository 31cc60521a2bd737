//! RagForge API Gateway
//!
//! The HTTP entry point for the retrieval system.
//! Handles:
//! - Tenant extraction from the `X-Organization-ID` header
//! - Rate limiting
//! - Document ingestion, deletion and reconciliation
//! - Hybrid search and prompt context rendering
//! - Session event append, replay and SSE streaming
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use ragforge_common::{
    config::AppConfig,
    db::{DbPool, DocumentStore, InMemoryDocumentStore, Repository},
    embeddings::create_embedder,
    events::{create_event_relay, EventRelay},
    metrics::{self, LATENCY_BUCKETS},
    vector::create_vector_index,
};
use ragforge_ingestion::{ChunkingConfig, IngestionPipeline};
use ragforge_search::{HybridSearchEngine, InMemoryLexicalSearch, LexicalSearch, PostgresLexicalSearch, VectorRetriever};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub documents: Arc<dyn DocumentStore>,
    pub pipeline: Arc<IngestionPipeline>,
    pub search: Arc<HybridSearchEngine>,
    pub events: Arc<dyn EventRelay>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    init_tracing(&config);

    info!("Starting RagForge API Gateway v{}", ragforge_common::VERSION);

    // Initialize metrics
    metrics::register_metrics();
    match config.observability.metrics_addr() {
        Some(metrics_addr) => {
            PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .set_buckets(LATENCY_BUCKETS)?
                .install()?;
            info!(%metrics_addr, "Prometheus exporter listening");
        }
        None => info!("Prometheus exporter disabled"),
    }

    let state = build_state(config.clone()).await?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Wire every backend named by the configuration.
///
/// With `database.url` set, documents live in Postgres and lexical search
/// runs as full-text queries there; otherwise both run in memory.
async fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let embedder = create_embedder(&config.embedding)?;
    let index = create_vector_index(&config.vector_index, config.embedding.dimension)?;
    let events = create_event_relay(&config.events, &config.redis).await?;

    let (documents, lexical) = if config.database.url.is_some() {
        info!("Connecting to database...");
        let pool = DbPool::new(&config.database).await?;
        pool.ensure_schema().await?;
        let lexical: Arc<dyn LexicalSearch> = Arc::new(PostgresLexicalSearch::new(Arc::new(pool.clone())));
        let documents: Arc<dyn DocumentStore> = Arc::new(Repository::new(pool));
        (documents, lexical)
    } else {
        tracing::warn!("No database configured, using in-memory document store");
        let store = Arc::new(InMemoryDocumentStore::new());
        let lexical: Arc<dyn LexicalSearch> = Arc::new(InMemoryLexicalSearch::new(store.clone()));
        let documents: Arc<dyn DocumentStore> = store;
        (documents, lexical)
    };

    let pipeline = IngestionPipeline::new(
        documents.clone(),
        embedder.clone(),
        index.clone(),
        ChunkingConfig::from(&config.chunking),
    )?;
    let vector = VectorRetriever::new(embedder, index, documents.clone())?;
    let search = HybridSearchEngine::new(vector, lexical, &config.search);

    info!(
        embedding = %config.embedding.provider,
        vector_index = %config.vector_index.provider,
        events = events.backend(),
        "Backends initialized"
    );

    Ok(AppState {
        config,
        documents,
        pipeline: Arc::new(pipeline),
        search: Arc::new(search),
        events,
    })
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Document endpoints
        .route("/documents", post(handlers::documents::create_document))
        .route(
            "/documents/{id}",
            get(handlers::documents::get_document).delete(handlers::documents::delete_document),
        )
        .route("/documents/{id}/ingest", post(handlers::documents::ingest_document))
        .route("/documents/{id}/reconcile", post(handlers::documents::reconcile_document))
        // Search endpoint
        .route("/search", post(handlers::search::search))
        // Session event endpoints
        .route(
            "/sessions/{id}/events",
            post(handlers::events::append_event).get(handlers::events::read_events),
        )
        .route("/sessions/{id}/stream", get(handlers::events::stream_events))
        .route_layer(from_fn(middleware::metrics::track_requests));

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        api_routes = api_routes.layer(from_fn_with_state(limiter, middleware::rate_limit::rate_limit_middleware));
    }

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
