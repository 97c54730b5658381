use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    types::{Job, JobStatus, JobType},
    utils::{generate_id, pluralize},
};
use crate::storage::GraphStore;

/// Merge-patch for a job's progress fields; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobProgress {
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub message: Option<String>,
    pub ideas_extracted: Option<u64>,
    pub links_created: Option<u64>,
}

impl JobProgress {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn current(mut self, current: usize) -> Self {
        self.current = Some(current as u64);
        self
    }

    pub fn total(mut self, total: usize) -> Self {
        self.total = Some(total as u64);
        self
    }

    pub fn ideas_extracted(mut self, ideas: usize) -> Self {
        self.ideas_extracted = Some(ideas as u64);
        self
    }

    pub fn links_created(mut self, links: usize) -> Self {
        self.links_created = Some(links as u64);
        self
    }

    fn apply(&self, job: &mut Job) {
        if let Some(current) = self.current {
            job.progress_current = Some(current);
        }
        if let Some(total) = self.total {
            job.progress_total = Some(total);
        }
        if let Some(message) = &self.message {
            job.progress_message = Some(message.clone());
        }
        if let Some(ideas) = self.ideas_extracted {
            job.ideas_extracted = Some(ideas);
        }
        if let Some(links) = self.links_created {
            job.links_created = Some(links);
        }
    }
}

/// Read-time staleness: a pending or running job idle for longer than
/// `timeout` is presented as failed. The stored record is not touched.
pub fn project_staleness(mut job: Job, now: DateTime<Utc>, timeout: Duration) -> Job {
    if job.status.is_terminal() {
        return job;
    }

    let idle = now
        .signed_duration_since(job.last_activity())
        .to_std()
        .unwrap_or_default();
    if idle > timeout {
        job.status = JobStatus::Failed;
        job.error = Some(stale_message(timeout));
    }
    job
}

pub fn stale_message(timeout: Duration) -> String {
    let minutes = (timeout.as_secs() / 60) as usize;
    format!(
        "Job timed out — no progress for {}",
        pluralize(minutes, "minute", "s")
    )
}

/// Owns every job status write. Read-modify-write cycles are serialized so
/// concurrent patches never interleave.
pub struct JobTracker {
    store: Arc<GraphStore>,
    stale_timeout: Duration,
    write_lock: Mutex<()>,
}

impl JobTracker {
    pub fn new(store: Arc<GraphStore>, stale_timeout: Duration) -> Self {
        Self {
            store,
            stale_timeout,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn create(&self, project_id: &str, job_type: JobType) -> Result<Job> {
        let job = Job::new(generate_id("job"), project_id, job_type, Utc::now());
        self.store.put_job(&job).await?;
        info!(job_id = %job.id, project_id = %project_id, job_type = job_type.as_str(), "job created");
        Ok(job)
    }

    pub async fn mark_running(&self, id: &str) -> Result<Job> {
        self.transition(id, JobStatus::Running, |job, now| {
            job.last_progress_at = Some(now);
        })
        .await
    }

    pub async fn update_progress(&self, id: &str, progress: &JobProgress) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        let mut job = self.load(id).await?;
        progress.apply(&mut job);
        job.last_progress_at = Some(Utc::now());
        self.store.put_job(&job).await?;
        debug!(job_id = %id, message = ?progress.message, current = ?progress.current, "job progress");
        Ok(job)
    }

    pub async fn mark_completed(&self, id: &str) -> Result<Job> {
        let job = self
            .transition(id, JobStatus::Completed, |job, now| {
                job.completed_at = Some(now);
            })
            .await?;
        info!(job_id = %id, message = ?job.progress_message, "job completed");
        Ok(job)
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<Job> {
        self.transition(id, JobStatus::Failed, |job, now| {
            job.error = Some(error.to_string());
            job.completed_at = Some(now);
        })
        .await
    }

    /// Job as callers should see it, staleness applied.
    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self
            .store
            .get_job(id)
            .await?
            .map(|job| project_staleness(job, Utc::now(), self.stale_timeout)))
    }

    /// Most recently created job of `job_type`, optionally restricted to
    /// `statuses` (matched after the staleness projection).
    pub async fn latest_by_type(
        &self,
        project_id: &str,
        job_type: JobType,
        statuses: &[JobStatus],
    ) -> Result<Option<Job>> {
        let now = Utc::now();
        Ok(self
            .store
            .list_jobs(project_id, job_type)
            .await?
            .into_iter()
            .map(|job| project_staleness(job, now, self.stale_timeout))
            .find(|job| statuses.is_empty() || statuses.contains(&job.status)))
    }

    async fn load(&self, id: &str) -> Result<Job> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| anyhow!("job {id} not found"))
    }

    async fn transition<F>(&self, id: &str, next: JobStatus, update: F) -> Result<Job>
    where
        F: FnOnce(&mut Job, DateTime<Utc>),
    {
        let _guard = self.write_lock.lock().await;
        let mut job = self.load(id).await?;
        if !job.status.can_transition_to(next) {
            bail!(
                "job {id} cannot move from {:?} to {:?}",
                job.status,
                next
            );
        }
        job.status = next;
        update(&mut job, Utc::now());
        self.store.put_job(&job).await?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_job(last_progress_minutes_ago: Option<i64>, created_minutes_ago: i64) -> (Job, DateTime<Utc>) {
        let now = Utc::now();
        let mut job = Job::new(
            "job-1".into(),
            "p1",
            JobType::Linking,
            now - chrono::Duration::minutes(created_minutes_ago),
        );
        job.status = JobStatus::Running;
        job.last_progress_at =
            last_progress_minutes_ago.map(|m| now - chrono::Duration::minutes(m));
        (job, now)
    }

    #[test]
    fn stale_running_job_reads_as_failed() {
        let (job, now) = running_job(Some(16), 30);
        let projected = project_staleness(job, now, Duration::from_secs(900));
        assert_eq!(projected.status, JobStatus::Failed);
        assert_eq!(
            projected.error.as_deref(),
            Some("Job timed out — no progress for 15 minutes")
        );
    }

    #[test]
    fn recent_progress_keeps_job_alive() {
        let (job, now) = running_job(Some(14), 60);
        let projected = project_staleness(job, now, Duration::from_secs(900));
        assert_eq!(projected.status, JobStatus::Running);
        assert!(projected.error.is_none());
    }

    #[test]
    fn creation_time_used_without_progress() {
        let (mut job, now) = running_job(None, 20);
        job.status = JobStatus::Pending;
        let projected = project_staleness(job, now, Duration::from_secs(900));
        assert_eq!(projected.status, JobStatus::Failed);
    }

    #[test]
    fn terminal_jobs_are_never_projected() {
        let (mut job, now) = running_job(Some(120), 200);
        job.status = JobStatus::Completed;
        let projected = project_staleness(job, now, Duration::from_secs(900));
        assert_eq!(projected.status, JobStatus::Completed);
    }

    #[test]
    fn progress_patch_only_touches_provided_fields() {
        let (mut job, _) = running_job(None, 0);
        JobProgress::message("first").current(0).total(3).ideas_extracted(0).apply(&mut job);
        JobProgress::message("second").current(1).apply(&mut job);

        assert_eq!(job.progress_message.as_deref(), Some("second"));
        assert_eq!(job.progress_current, Some(1));
        assert_eq!(job.progress_total, Some(3));
        assert_eq!(job.ideas_extracted, Some(0));
        assert_eq!(job.links_created, None);
    }
}
