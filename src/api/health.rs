//! Health check endpoint

use axum::{routing::get, Json, Router};

/// Health check response
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Build health check router
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Report liveness and build version
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let response = health().await;
        assert_eq!(response.0.status, "ok");
        assert!(!response.0.version.is_empty());
    }
}
