use std::sync::Arc;

use tracing::error;

use super::{job_tracker::JobTracker, utils::single_line};

/// Longest error message stored on a job record.
pub const MAX_JOB_ERROR_CHARS: usize = 300;

/// Turns an orchestration failure into the job's terminal error.
#[derive(Clone)]
pub struct ErrorReporter {
    jobs: Arc<JobTracker>,
}

impl ErrorReporter {
    pub fn new(jobs: Arc<JobTracker>) -> Self {
        Self { jobs }
    }

    /// Logs the full cause chain and marks the job failed with the
    /// outermost message only.
    pub async fn job_failed(&self, job_id: &str, stage: &str, err: &anyhow::Error) {
        error!(job_id = %job_id, stage, error = %err, "job failed");
        for (depth, cause) in err.chain().skip(1).enumerate() {
            error!(
                job_id = %job_id,
                cause_depth = depth + 1,
                cause = %cause,
                "caused by"
            );
        }

        let message = single_line(&err.to_string(), MAX_JOB_ERROR_CHARS);
        if let Err(status_err) = self.jobs.mark_failed(job_id, &message).await {
            error!(error = %status_err, job_id = %job_id, "failed to mark job as failed");
        }
    }
}
