//! # HTTP Server
//!
//! Axum front end for the provisioner:
//!
//! - `POST /api/standardLoadBalRequest` runs a provisioning request
//! - `GET /health` reports liveness
//! - `GET <metrics path>` renders Prometheus metrics when enabled
//! - any other `GET` serves the static web form, any other `POST` gets a fixed reply
//!
//! Every request passes through tracing and a body size limit. Everything except provisioning
//! is bounded by the request timeout; provisioning enforces it between load balancer steps
//! and reports what it did not get to.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::core::config::ProvisionerConfig;
use crate::core::error::{ProvisionerError, ProvisionerResult};
use crate::gateway::handlers::{
    fallback_handler, health_check, metrics_handler, provision_handler, static_handler,
};
use crate::gateway::static_files::StaticFiles;
use crate::observability::MetricsHandle;
use crate::provisioning::ProvisioningService;

/// Path of the provisioning endpoint
pub const PROVISION_PATH: &str = "/api/standardLoadBalRequest";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProvisioningService>,
    pub static_files: Arc<StaticFiles>,
    pub metrics: Option<MetricsHandle>,
    pub load_balancer: &'static str,
}

impl AppState {
    pub fn new(
        config: &ProvisionerConfig,
        service: Arc<ProvisioningService>,
        metrics: Option<MetricsHandle>,
    ) -> Self {
        Self {
            load_balancer: service.client_name(),
            service,
            static_files: Arc::new(StaticFiles::from_config(&config.server)),
            metrics,
        }
    }
}

/// Build the router with all routes and middleware
pub fn create_app(config: &ProvisionerConfig, state: AppState) -> AxumRouter {
    let provisioning =
        AxumRouter::new().route(PROVISION_PATH, post(provision_handler).get(static_handler));

    let mut app =
        AxumRouter::new().route("/health", get(health_check).fallback(fallback_handler));

    if state.metrics.is_some() {
        app = app.route(
            &config.observability.metrics.endpoint_path,
            get(metrics_handler).fallback(fallback_handler),
        );
    }

    let app = app
        .fallback(fallback_handler)
        .layer(TimeoutLayer::new(config.server.request_timeout));

    provisioning.merge(app).with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(config.server.max_request_size))
            .layer(DefaultBodyLimit::disable()),
    )
}

/// The provisioner's HTTP server
pub struct ProvisionerServer {
    bind_address: String,
    http_port: u16,
    app: AxumRouter,
}

impl ProvisionerServer {
    pub fn new(
        config: &ProvisionerConfig,
        service: Arc<ProvisioningService>,
        metrics: Option<MetricsHandle>,
    ) -> Self {
        let state = AppState::new(config, service, metrics);

        Self {
            bind_address: config.server.bind_address.clone(),
            http_port: config.server.http_port,
            app: create_app(config, state),
        }
    }

    /// Serve until `shutdown` completes
    #[instrument(skip(self, shutdown))]
    pub async fn start<F>(self, shutdown: F) -> ProvisionerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = format!("{}:{}", self.bind_address, self.http_port);

        let listener = TcpListener::bind((self.bind_address.as_str(), self.http_port))
            .await
            .map_err(|e| {
                ProvisionerError::internal(format!("Failed to bind server to {}: {}", address, e))
            })?;

        info!("Provisioner HTTP server listening on {}", address);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ProvisionerError::internal(format!("Server error: {}", e)))?;

        info!("Provisioner HTTP server stopped");
        Ok(())
    }
}
