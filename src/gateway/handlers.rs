//! HTTP handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::error::ProvisionerError;
use crate::core::types::LoadBalancerRequest;
use crate::gateway::server::AppState;
use crate::observability::metrics::record_request;
use crate::provisioning::ProvisioningReport;

/// `POST /api/standardLoadBalRequest`
#[instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn provision_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ProvisioningReport>, ProvisionerError> {
    let request: LoadBalancerRequest = serde_json::from_slice(&body).map_err(|e| {
        record_request("rejected");
        ProvisionerError::from(e)
    })?;

    // Finishes and logs its report even if the caller goes away mid-request
    let service = state.service.clone();
    let report = tokio::spawn(async move { service.provision(request).await })
        .await
        .map_err(|e| ProvisionerError::internal(format!("Provisioning task failed: {}", e)))??;
    Ok(Json(report))
}

/// `GET` on any path without a dedicated route
#[instrument(skip(state))]
pub async fn static_handler(State(state): State<AppState>, uri: Uri) -> Response {
    match state.static_files.load(uri.path()).await {
        Some(asset) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, asset.content_type)],
            asset.body,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/html")],
            "<html><body><h1>404 Not Found</h1></body></html>",
        )
            .into_response(),
    }
}

/// Everything the router does not match
pub async fn fallback_handler(state: State<AppState>, method: Method, uri: Uri) -> Response {
    match method {
        Method::GET | Method::HEAD => static_handler(state, uri).await,
        Method::POST => {
            debug!(path = %uri.path(), "POST to unknown endpoint");
            Json(json!({ "message": "no endpoint to handle request" })).into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health_info = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "lb-provisioner",
        "loadBalancer": state.load_balancer,
    });

    (StatusCode::OK, Json(health_info))
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
