// HTTP boundary: POST /analyze, GET /health

use crate::handlers::normalize_url;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use sitelens_core::{AnalysisError, Analyzer, Report};
use sitelens_scanner::{RegistryLookup, Renderer};
use std::sync::Arc;
use tracing::{info, warn};

pub const URL_REQUIRED: &str = "URL is required";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzeRequest {
    pub url: Option<String>,
}

/// Response envelope shared by every analysis outcome.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub error: Option<String>,
    pub data: Option<Report>,
}

impl ApiResponse {
    fn ok(report: Report) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(report),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub fn router<R, L>(analyzer: Arc<Analyzer<R, L>>) -> Router
where
    R: Renderer + 'static,
    L: RegistryLookup + 'static,
{
    Router::new()
        .route("/analyze", post(analyze::<R, L>))
        .route("/health", get(health))
        .with_state(analyzer)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn analyze<R, L>(
    State(analyzer): State<Arc<Analyzer<R, L>>>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> (StatusCode, Json<ApiResponse>)
where
    R: Renderer + 'static,
    L: RegistryLookup + 'static,
{
    let requested = match body {
        Ok(Json(request)) => request.url,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected analyze request body");
            None
        }
    };

    let Some(url) = requested.as_deref().and_then(normalize_url) else {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::failure(URL_REQUIRED)));
    };

    info!(url = %url, "Analyze request");
    match analyzer.analyze(&url).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::ok(report))),
        Err(AnalysisError::InvalidUrl(_)) => {
            (StatusCode::BAD_REQUEST, Json(ApiResponse::failure(URL_REQUIRED)))
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Analysis failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::failure(e.to_string())),
            )
        }
    }
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve<R, L>(
    analyzer: Arc<Analyzer<R, L>>,
    addr: std::net::SocketAddr,
) -> anyhow::Result<()>
where
    R: Renderer + 'static,
    L: RegistryLookup + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(analyzer))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
