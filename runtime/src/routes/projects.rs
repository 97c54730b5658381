use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use tracing::{error, info};

use super::{
    internal_error,
    types::{DocumentResponse, ExtractRequest, JobStartedResponse, RegisterDocumentRequest},
};
use crate::{
    AppState,
    pipeline::{
        Task,
        types::{Document, DocumentStatus, JobType},
        utils::generate_id,
    },
};

pub fn project_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/projects/{project_id}/documents",
            post(register_document).get(list_documents),
        )
        .route("/projects/{project_id}/extract", post(start_extraction))
        .route("/projects/{project_id}/link", post(start_linking))
        .route(
            "/projects/{project_id}/backfill-locators",
            post(start_backfill),
        )
}

async fn register_document(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(request): Json<RegisterDocumentRequest>,
) -> Result<Json<DocumentResponse>, (StatusCode, String)> {
    let filename = request.filename.trim();
    if filename.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "filename is required".to_string()));
    }

    let document = Document {
        id: generate_id("doc"),
        project_id: project_id.clone(),
        filename: filename.to_string(),
        source_handle: request.source_handle.filter(|h| !h.trim().is_empty()),
        status: DocumentStatus::Uploaded,
        size_bytes: request.size_bytes,
        summary: None,
    };
    state
        .store
        .put_document(&document)
        .await
        .map_err(|err| internal_error("failed to register document", err))?;
    info!(project_id = %project_id, document_id = %document.id, filename = %document.filename, "document registered");
    Ok(Json(document_response(document)))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<DocumentResponse>>, (StatusCode, String)> {
    let documents = state
        .store
        .list_documents(&project_id)
        .await
        .map_err(|err| internal_error("failed to load documents", err))?;
    Ok(Json(documents.into_iter().map(document_response).collect()))
}

async fn start_extraction(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<JobStartedResponse>, (StatusCode, String)> {
    if request.document_ids.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "documentIds must not be empty".to_string(),
        ));
    }

    start_job(&state, &project_id, JobType::Extraction, |job_id| {
        Task::Extraction {
            job_id,
            project_id: project_id.clone(),
            document_ids: request.document_ids,
        }
    })
    .await
}

async fn start_linking(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<JobStartedResponse>, (StatusCode, String)> {
    start_job(&state, &project_id, JobType::Linking, |job_id| {
        Task::LinkingSetup {
            job_id,
            project_id: project_id.clone(),
        }
    })
    .await
}

async fn start_backfill(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<JobStartedResponse>, (StatusCode, String)> {
    start_job(&state, &project_id, JobType::LocatorBackfill, |job_id| {
        Task::LocatorBackfill {
            job_id,
            project_id: project_id.clone(),
        }
    })
    .await
}

/// Creates the job record, then queues its first task. A job whose task
/// cannot be queued is marked failed right away.
async fn start_job<F>(
    state: &AppState,
    project_id: &str,
    job_type: JobType,
    task: F,
) -> Result<Json<JobStartedResponse>, (StatusCode, String)>
where
    F: FnOnce(String) -> Task,
{
    let job = state
        .jobs
        .create(project_id, job_type)
        .await
        .map_err(|err| internal_error("failed to create job", err))?;

    if let Err(err) = state.scheduler.submit(task(job.id.clone())).await {
        if let Err(mark_err) = state.jobs.mark_failed(&job.id, &err.to_string()).await {
            error!(job_id = %job.id, error = %mark_err, "failed to mark unscheduled job as failed");
        }
        return Err(internal_error("failed to schedule job", err));
    }

    Ok(Json(JobStartedResponse { job_id: job.id }))
}

fn document_response(document: Document) -> DocumentResponse {
    DocumentResponse {
        id: document.id,
        filename: document.filename,
        status: document.status,
        size_bytes: document.size_bytes,
        summary: document.summary,
    }
}
