use crate::config::AppConfig;
use crate::error::IngestError;
use crate::pipeline::{self, PipelineOptions};
use crate::render;
use crate::spatial::AreaIndex;
use crate::types::Dashboard;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

pub struct AppState {
    pub areas: AreaIndex,
    pub options: PipelineOptions,
}

#[derive(Deserialize)]
pub struct SpeciesQuery {
    species: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Dashboard JSON with the year chart inlined, so the page never has to
/// upload the file twice.
#[derive(Serialize)]
struct DashboardResponse {
    #[serde(flatten)]
    dashboard: Dashboard,
    chart_svg: String,
}

pub enum ApiError {
    /// Ingestion failures are shown to the user as-is.
    Ingest(IngestError),
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Ingest(err) => {
                let mut message = err.to_string();
                let mut source = std::error::Error::source(&err);
                while let Some(cause) = source {
                    message.push_str(&format!(": {}", cause));
                    source = cause.source();
                }
                warn!("Rejected upload: {}", message);
                (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorBody { error: message })).into_response()
            }
            ApiError::Internal(message) => {
                error!("Pipeline task failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: message })).into_response()
            }
        }
    }
}

pub fn build_router(state: Arc<AppState>, static_dir: &Path, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/dashboard", post(dashboard_handler))
        .route("/api/chart.svg", post(chart_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, areas: AreaIndex) -> Result<()> {
    let options = PipelineOptions::new(config.delimiter_byte()?, &config.processing);
    let state = Arc::new(AppState { areas, options });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    let app = build_router(
        state,
        &config.server.static_dir,
        config.server.max_upload_mb * 1024 * 1024,
    );

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Parsing and the spatial join are CPU-bound; keep them off the async workers.
async fn run_pipeline(
    state: Arc<AppState>,
    species: Option<String>,
    body: Bytes,
) -> Result<Option<Dashboard>, ApiError> {
    let dashboard = tokio::task::spawn_blocking(move || {
        pipeline::run(Some(&body[..]), species.as_deref(), &state.areas, state.options)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(dashboard)
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SpeciesQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let dashboard = run_pipeline(state, params.species, body).await?;

    Ok(match dashboard {
        Some(dashboard) => {
            let chart_svg = render::year_chart_svg(&dashboard.years);
            Json(DashboardResponse { dashboard, chart_svg }).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn chart_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SpeciesQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let dashboard = run_pipeline(state, params.species, body).await?;

    Ok(match dashboard {
        Some(dashboard) => (
            [(header::CONTENT_TYPE, "image/svg+xml")],
            render::year_chart_svg(&dashboard.years),
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}
