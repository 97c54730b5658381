use std::sync::Arc;

pub mod ai;
pub mod config;
pub mod evidence;
pub mod pipeline;
pub mod routes;
pub mod storage;

use config::AppConfig;
use pipeline::{JobTracker, TaskScheduler};
use storage::GraphStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<GraphStore>,
    pub jobs: Arc<JobTracker>,
    pub scheduler: TaskScheduler,
}
