//! Server state and lifecycle
//!
//! [`GatewayServer`] is the shared Axum state: the gateway plus the metrics
//! accessor. [`run_server`] wires logging, repository loading, the dispatch
//! loop, and the HTTP listener together.

use std::sync::Arc;

use tracing::info;

use crate::gateway::{Gateway, GatewayConfig};
use crate::http::routes::create_router;
use crate::logging::init_logging_default;
use crate::metrics::{MetricRegistry, Metrics};
use crate::registry::resolve_repository_dir;

pub use crate::http::types::ServerResult;

/// Shared state behind every HTTP handler
#[derive(Clone)]
pub struct GatewayServer {
    pub gateway: Arc<Gateway>,
    pub metrics_registry: MetricRegistry,
}

impl GatewayServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        GatewayServer {
            gateway,
            metrics_registry: MetricRegistry::new(),
        }
    }
}

/// Run the HTTP gateway server
///
/// Initializes logging and metrics, scans the model repository, starts the
/// dispatch loop, and serves the Axum router on the given address.
pub async fn run_server(addr: &str, model_repository: Option<&str>) -> ServerResult<()> {
    // Initialize tracing for structured logging (idempotent)
    init_logging_default();

    let repository = resolve_repository_dir(model_repository);
    info!("using model repository {}", repository.display());

    let metrics = Arc::new(Metrics::new());
    let config = GatewayConfig::new().with_model_repository(repository);
    let gateway = Arc::new(Gateway::with_parts(
        config,
        crate::dispatch::BackendRegistry::new(),
        Some(metrics.clone()),
    ));

    let loaded = gateway.load_repository().await?;
    info!(versions = loaded, "model repository scan complete");

    gateway.start().await;

    let server = GatewayServer::new(gateway);
    server.metrics_registry.init(metrics).await;

    let app = create_router(server);

    info!("starting ModelGate server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
