//! Pricing Forge API Server implementation
//!
//! HTTP REST API server using Axum. Serves one suite file: formulas, test cases, runs,
//! stats, and stateless compare/check endpoints.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::core::HarnessConfig;
use crate::storage::{Store, YamlStore};

/// API Server configuration
#[derive(Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Suite file served by the API; created empty if missing
    pub suite: PathBuf,
    pub harness: HarnessConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            suite: PathBuf::from("suite.yaml"),
            harness: HarnessConfig::default(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub store: Arc<dyn Store>,
    pub config: HarnessConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: HarnessConfig) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            store,
            config,
        }
    }
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Formulas
        .route("/api/v1/formulas", get(handlers::list_formulas))
        .route(
            "/api/v1/formulas/:id/test-cases",
            get(handlers::list_test_cases).post(handlers::add_test_case),
        )
        .route("/api/v1/formulas/:id/stats", get(handlers::formula_stats))
        .route("/api/v1/formulas/:id/run", post(handlers::run_formula))
        // Test cases
        .route(
            "/api/v1/test-cases/:id",
            get(handlers::get_test_case)
                .patch(handlers::update_test_case)
                .delete(handlers::delete_test_case),
        )
        .route("/api/v1/test-cases/:id/run", post(handlers::run_test_case))
        // Stateless
        .route("/api/v1/compare", post(handlers::compare))
        .route("/api/v1/check", post(handlers::check))
        // State and middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: ApiConfig) -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricing_forge=info,tower_http=info".into()),
        )
        .init();

    let store = YamlStore::open_or_create(&config.suite)?;
    info!(suite = %config.suite.display(), "suite opened");

    let state = Arc::new(AppState::new(Arc::new(store), config.harness));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("🔥 Pricing Forge API Server starting on http://{}", addr);
    info!("   Endpoints: /api/v1/formulas, /api/v1/test-cases, /api/v1/compare, /api/v1/check");
    info!("   Health: /health, Version: /version");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Pricing Forge API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received, stopping server...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.suite, PathBuf::from("suite.yaml"));
        assert_eq!(config.harness, HarnessConfig::default());
    }

    #[test]
    fn test_config_address_format() {
        let config = ApiConfig {
            host: "192.168.1.100".to_string(),
            port: 9090,
            ..ApiConfig::default()
        };
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .unwrap();
        assert_eq!(addr.port(), 9090);
    }

    #[test]
    fn test_app_state_shares_store() {
        let state = Arc::new(AppState::new(
            Arc::new(MemoryStore::new()),
            HarnessConfig::default(),
        ));
        let state_clone = Arc::clone(&state);
        assert_eq!(state.version, env!("CARGO_PKG_VERSION"));
        assert!(Arc::ptr_eq(&state.store, &state_clone.store));
    }
}
