//! HTTP adapter: upload and retrieval routes over the job pipeline.
//!
//! | Route | Behaviour |
//! |---|---|
//! | `POST /` | multipart field `files` (repeatable) → `{"data":[{"uid","file_name"}]}` |
//! | `GET /{uid}` | CSV, `tables.zip`, `{"message":"No tables found"}`, or 202 while processing |
//! | `GET /{uid}/status` | the job record as JSON |
//! | `DELETE /{uid}` | forget a finished job and its files |
//!
//! Errors are JSON bodies. Validation failures are 400, unknown identifiers
//! 404, failed jobs 422, deleting a running job 409.

use crate::config::ServiceConfig;
use crate::error::Pdf2CsvError;
use crate::job::{Submission, Upload};
use crate::orchestrator::{JobHandle, Orchestrator};
use crate::pipeline::extract::TableExtractor;
use crate::retrieve::{Retrieval, RetrievalService};
use crate::store::JobStore;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Shared state accessible from all handlers.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub retrieval: RetrievalService,
}

impl AppState {
    /// Wire an orchestrator and a retrieval service around one job store.
    pub fn new(
        config: ServiceConfig,
        extractor: Arc<dyn TableExtractor>,
    ) -> Result<Self, Pdf2CsvError> {
        let store = Arc::new(JobStore::new());
        let wait = config.retrieval_wait();
        let orchestrator = Orchestrator::new(config, Arc::clone(&store), extractor)?;
        let retrieval = RetrievalService::new(store, orchestrator.packager().clone(), wait);
        Ok(Self {
            orchestrator,
            retrieval,
        })
    }
}

/// Build the router. Request bodies are capped at `max_upload_bytes`.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.orchestrator.config().max_upload_bytes);

    Router::new()
        .route("/", post(submit))
        .route("/{uid}", get(retrieve).delete(delete))
        .route("/{uid}/status", get(status))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn submit(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let uploads = match multipart {
        Ok(multipart) => match read_uploads(multipart).await {
            Ok(uploads) => uploads,
            Err(resp) => return Ok(resp),
        },
        Err(rejection) => {
            debug!("Rejected non-multipart upload: {}", rejection);
            return Ok(json_error(StatusCode::BAD_REQUEST, NO_FILES_PART));
        }
    };

    let handles = state.orchestrator.submit(uploads).await?;
    let data: Vec<Submission> = handles.iter().map(JobHandle::submission).collect();
    Ok(Json(json!({ "data": data })).into_response())
}

async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let response = match state.retrieval.retrieve(&uid).await? {
        Retrieval::File(download) => (
            [
                (header::CONTENT_TYPE, download.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", download.filename),
                ),
            ],
            download.bytes,
        )
            .into_response(),
        Retrieval::NoTables { message } => Json(json!({ "message": message })).into_response(),
        Retrieval::Processing { job } => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "processing", "job": job })),
        )
            .into_response(),
    };
    Ok(response)
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let job = state.retrieval.status(&uid)?;
    Ok(Json(job).into_response())
}

async fn delete(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.retrieval.delete(&uid)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Multipart ────────────────────────────────────────────────────────────────

const NO_FILES_PART: &str = "No files part in the request";
const NO_FILES_SELECTED: &str = "No files selected for upload";

/// Collect every `files` field; other fields are drained and ignored, but a
/// failure while draining one still rejects the request.
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<Upload>, Response> {
    let mut uploads = Vec::new();
    let mut saw_files = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(json_error(e.status(), &e.body_text())),
        };

        if field.name() != Some("files") {
            field
                .bytes()
                .await
                .map_err(|e| json_error(e.status(), &e.body_text()))?;
            continue;
        }
        saw_files = true;

        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| json_error(e.status(), &e.body_text()))?;
        uploads.push(Upload::new(filename, bytes.to_vec()));
    }

    if !saw_files {
        return Err(json_error(StatusCode::BAD_REQUEST, NO_FILES_PART));
    }
    if uploads.first().is_some_and(|u| u.filename.is_empty()) {
        return Err(json_error(StatusCode::BAD_REQUEST, NO_FILES_SELECTED));
    }
    Ok(uploads)
}

// ── Errors ───────────────────────────────────────────────────────────────────

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Maps library errors onto HTTP responses.
pub struct ApiError(Pdf2CsvError);

impl From<Pdf2CsvError> for ApiError {
    fn from(e: Pdf2CsvError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Pdf2CsvError::NotAPdf { rejected } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "All files should be PDFs", "rejected": rejected })),
            )
                .into_response(),
            Pdf2CsvError::EmptyBatch => json_error(StatusCode::BAD_REQUEST, NO_FILES_SELECTED),
            e @ Pdf2CsvError::BatchTooLarge { .. } => {
                json_error(StatusCode::BAD_REQUEST, &e.to_string())
            }
            e @ Pdf2CsvError::JobNotFound { .. } => json_error(StatusCode::NOT_FOUND, &e.to_string()),
            Pdf2CsvError::JobFailed { reason, .. } => {
                json_error(StatusCode::UNPROCESSABLE_ENTITY, &reason)
            }
            e @ Pdf2CsvError::JobInFlight { .. } => json_error(StatusCode::CONFLICT, &e.to_string()),
            e => {
                error!("Request failed: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
        }
    }
}
