use std::fs;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde_json::json;

use crate::config::Config;
use crate::error::PipelineError;
use crate::files;
use crate::ingest::{IngestSummary, Ingestor};
use crate::report::aggregate::Aggregator;
use crate::report::chart::ChartRenderer;
use crate::report::ReportRenderer;
use crate::sheet::{self, SPREADSHEET_EXTENSIONS};
use crate::store::{ProjectStore, SqliteStore};

/// Everything a request needs, built once in `main`.
pub struct AppState {
    pub config: Config,
    pub store: SqliteStore,
    pub chart: ChartRenderer,
}

type SharedState = Arc<AppState>;

/// A request that failed as a whole.
#[derive(Debug, PartialEq)]
pub struct RequestError {
    pub status: StatusCode,
    pub message: String,
}

impl RequestError {
    fn new(status: StatusCode, message: impl Into<String>) -> RequestError {
        RequestError {
            status,
            message: message.into(),
        }
    }

    fn from_pipeline(err: PipelineError) -> RequestError {
        let status = match err {
            PipelineError::Format(_) => StatusCode::BAD_REQUEST,
            PipelineError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        RequestError::new(status, err.to_string())
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/upload", post(upload))
        .route("/v1/generate_image", get(generate_image))
        .with_state(state)
}

pub async fn serve(state: SharedState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(state.config.bind_addr()).await?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("cannot listen for shutdown signal, err={}", err);
    }
    info!("shutting down");
}

async fn healthz(State(state): State<SharedState>) -> Response {
    let ping = tokio::task::spawn_blocking(move || state.store.ping()).await;

    match ping {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Ok(Err(err)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "error", "reason": err.to_string() })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "reason": err.to_string() })),
        )
            .into_response(),
    }
}

async fn upload(State(state): State<SharedState>, mut multipart: Multipart) -> Response {
    let (file_name, bytes) = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => break (file_name, bytes),
                    Err(err) => return error_response(StatusCode::BAD_REQUEST, err.body_text()),
                }
            },
            Ok(Some(_)) => continue,
            Ok(None) => return error_response(StatusCode::BAD_REQUEST, "missing multipart field \"file\""),
            Err(err) => return error_response(StatusCode::BAD_REQUEST, err.body_text()),
        }
    };

    let result = tokio::task::spawn_blocking(move || store_upload(&state, &file_name, &bytes)).await;
    match result {
        Ok(Ok((file_name, summary))) if summary.is_clean() => (
            StatusCode::OK,
            Json(json!({
                "message": format!("spreadsheet '{}' uploaded and processed, {} rows written", file_name, summary.written)
            })),
        )
            .into_response(),
        Ok(Ok((_, summary))) => (StatusCode::OK, Json(json!({ "error": summary.messages() }))).into_response(),
        Ok(Err(err)) => error_response(err.status, err.message),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Saves the uploaded bytes under a unique name in the upload directory and
/// runs the ingest pipeline on them.
pub fn store_upload(
    state: &AppState,
    file_name: &str,
    bytes: &[u8],
) -> Result<(String, IngestSummary), RequestError> {
    if !sheet::is_spreadsheet(file_name) {
        return Err(RequestError::new(
            StatusCode::BAD_REQUEST,
            format!(
                "'{}' is not a spreadsheet, upload one of: {}",
                file_name,
                SPREADSHEET_EXTENSIONS.join(", ")
            ),
        ));
    }

    fs::create_dir_all(&state.config.upload_dir)
        .map_err(|err| RequestError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let path = state.config.upload_dir.join(files::upload_file_name(file_name));
    fs::write(&path, bytes).map_err(|err| {
        error!("cannot save upload, path={}, err={}", path.display(), err);
        RequestError::new(StatusCode::INTERNAL_SERVER_ERROR, "cannot save the uploaded file")
    })?;

    let summary = Ingestor::new(&state.store)
        .ingest(&path)
        .map_err(RequestError::from_pipeline)?;
    if !summary.is_clean() {
        warn!("partial ingest, file={}, errors={}", file_name, summary.errors.len());
    }

    Ok((file_name.to_string(), summary))
}

async fn generate_image(State(state): State<SharedState>) -> Response {
    let result = tokio::task::spawn_blocking(move || render_chart(&state)).await;

    match result {
        Ok(Ok(png)) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(Err(err)) => {
            warn!("report failed, status={}, err={}", err.status, err.message);
            (err.status, Json(json!({ "message": err.message }))).into_response()
        },
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": err.to_string() })),
        )
            .into_response(),
    }
}

/// Aggregates the store, plots it and returns the PNG bytes.
pub fn render_chart(state: &AppState) -> Result<Vec<u8>, RequestError> {
    let table = Aggregator::new(&state.store)
        .aggregate()
        .map_err(|err| RequestError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("cannot read data: {}", err)))?
        .ok_or_else(|| RequestError::new(StatusCode::NOT_FOUND, "no data to plot yet"))?;

    let path = state
        .chart
        .render(&table, &state.config.plot_dir)
        .map_err(|err| RequestError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("cannot plot data: {}", err)))?;

    fs::read(&path).map_err(|err| {
        RequestError::new(
            StatusCode::NOT_FOUND,
            format!("chart file {} not found: {}", path.display(), err),
        )
    })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}
