use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

use super::internal_error;
use crate::{
    AppState,
    pipeline::types::{Job, JobStatus, JobType},
};

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/{job_id}", get(get_job))
        .route("/projects/{project_id}/jobs/latest", get(latest_job))
}

#[derive(Deserialize)]
struct LatestJobParams {
    #[serde(rename = "type")]
    job_type: String,
    /// Comma separated, e.g. `pending,running`.
    status: Option<String>,
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, (StatusCode, String)> {
    state
        .jobs
        .get(&job_id)
        .await
        .map_err(|err| internal_error("failed to load job", err))?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("job {job_id} not found")))
}

async fn latest_job(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(params): Query<LatestJobParams>,
) -> Result<Json<Option<Job>>, (StatusCode, String)> {
    let job_type: JobType = params
        .job_type
        .parse()
        .map_err(|err: anyhow::Error| (StatusCode::BAD_REQUEST, err.to_string()))?;
    let statuses = parse_statuses(params.status.as_deref())
        .map_err(|message| (StatusCode::BAD_REQUEST, message))?;

    let job = state
        .jobs
        .latest_by_type(&project_id, job_type, &statuses)
        .await
        .map_err(|err| internal_error("failed to load jobs", err))?;
    Ok(Json(job))
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<JobStatus>, String> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            serde_json::from_value(serde_json::Value::String(s.to_string()))
                .map_err(|_| format!("unknown job status: {s}"))
        })
        .collect()
}
