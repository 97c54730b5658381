pub mod graph;
pub mod jobs;
pub mod projects;

pub mod types;

use axum::http::StatusCode;
use tracing::error;

pub use graph::graph_routes;
pub use jobs::job_routes;
pub use projects::project_routes;

fn internal_error(context: &str, err: anyhow::Error) -> (StatusCode, String) {
    error!(error = %err, "{context}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {err}"))
}
