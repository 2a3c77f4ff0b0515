//! S3 gateway server

use axum::{
    middleware,
    routing::{any, get},
    Router,
};
use prism_core::{config::PrismConfig, Result};
use prism_events::NotificationService;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::backend::BackendClient;
use crate::metrics::{metrics_handler, metrics_middleware, MetricsRecorder};
use crate::routes::{self, SubresourceStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub notifications: Arc<NotificationService>,
    pub backend: Arc<BackendClient>,
    pub subresources: Arc<SubresourceStore>,
}

impl AppState {
    pub fn new(config: &PrismConfig, notifications: Arc<NotificationService>) -> Result<Self> {
        let backend = BackendClient::new(&config.backend, &config.aws.region)?;
        Ok(Self {
            notifications,
            backend: Arc::new(backend),
            subresources: Arc::new(SubresourceStore::new(config.storage.clone())),
        })
    }
}

/// S3 Server
pub struct S3Server {
    config: PrismConfig,
    state: AppState,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl S3Server {
    pub fn new(config: PrismConfig, notifications: Arc<NotificationService>) -> Result<Self> {
        let state = AppState::new(&config, notifications)?;
        Ok(Self {
            config,
            state,
            metrics: None,
        })
    }

    /// Serve Prometheus metrics at `/metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone(), self.metrics.clone())
    }

    /// Serve until `shutdown` resolves, then let in-flight requests finish
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let addr = format!("{}:{}", self.config.server.bind_address, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("🚀 Prism S3 gateway listening on http://{}", addr);
        info!("📦 Forwarding to {}", self.state.backend.endpoint());
        info!("🔔 Invoking Lambda functions at {}", self.config.notifications.lambda_endpoint);
        if self.metrics.is_some() {
            info!("📈 Prometheus metrics at http://{}/metrics", addr);
        }

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

pub fn create_router(state: AppState, metrics: Option<Arc<MetricsRecorder>>) -> Router {
    let mut router = Router::new()
        .route("/", any(routes::service_handler))
        .route("/{bucket}", any(routes::bucket_handler))
        .route("/{bucket}/", any(routes::bucket_handler))
        .route("/{bucket}/{*key}", any(routes::object_handler));

    if let Some(metrics) = metrics {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(metrics),
        );
    }

    router
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
