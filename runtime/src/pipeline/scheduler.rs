use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::{
    sync::mpsc::{self, Receiver, Sender, WeakSender},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{extraction::ExtractionOrchestrator, linking::{BatchCursor, LinkingOrchestrator}};
use crate::evidence::LocatorBackfill;

/// One independently schedulable unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Extraction {
        job_id: String,
        project_id: String,
        document_ids: Vec<String>,
    },
    LinkingSetup {
        job_id: String,
        project_id: String,
    },
    LinkingBatch(BatchCursor),
    LocatorBackfill {
        job_id: String,
        project_id: String,
    },
}

impl Task {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Extraction { job_id, .. }
            | Self::LinkingSetup { job_id, .. }
            | Self::LocatorBackfill { job_id, .. } => job_id,
            Self::LinkingBatch(cursor) => &cursor.job_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction",
            Self::LinkingSetup { .. } => "linking_setup",
            Self::LinkingBatch(_) => "linking_batch",
            Self::LocatorBackfill { .. } => "locator_backfill",
        }
    }
}

pub struct Workers {
    pub extraction: Arc<ExtractionOrchestrator>,
    pub linking: Arc<LinkingOrchestrator>,
    pub backfill: Arc<LocatorBackfill>,
}

/// Handle for submitting tasks. Dropping every handle stops the worker
/// loop once in-flight tasks have handed off.
#[derive(Clone)]
pub struct TaskScheduler {
    tx: Sender<Task>,
}

impl TaskScheduler {
    pub fn start(workers: Workers, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(worker_loop(rx, tx.downgrade(), Arc::new(workers)));
        (Self { tx }, handle)
    }

    pub async fn submit(&self, task: Task) -> Result<()> {
        let job_id = task.job_id().to_string();
        let kind = task.kind();
        self.tx
            .send(task)
            .await
            .map_err(|_| anyhow!("scheduler is shut down"))?;
        debug!(job_id = %job_id, task = kind, "task queued");
        Ok(())
    }
}

async fn worker_loop(mut rx: Receiver<Task>, requeue: WeakSender<Task>, workers: Arc<Workers>) {
    info!("task scheduler started");
    while let Some(task) = rx.recv().await {
        let workers = workers.clone();
        let requeue = requeue.clone();
        tokio::spawn(async move {
            debug!(job_id = %task.job_id(), task = task.kind(), "task started");
            if let Some(next) = execute(&workers, task).await {
                hand_off(&requeue, next).await;
            }
        });
    }
    info!("task scheduler stopped");
}

/// Runs one task and returns the follow-up step, if any.
async fn execute(workers: &Workers, task: Task) -> Option<Task> {
    match task {
        Task::Extraction {
            job_id,
            project_id,
            document_ids,
        } => {
            workers
                .extraction
                .run(&job_id, &project_id, &document_ids)
                .await;
            None
        }
        Task::LinkingSetup { job_id, project_id } => workers
            .linking
            .run(&job_id, &project_id)
            .await
            .map(Task::LinkingBatch),
        Task::LinkingBatch(cursor) => workers
            .linking
            .process_batch(cursor)
            .await
            .map(Task::LinkingBatch),
        Task::LocatorBackfill { job_id, project_id } => {
            workers.backfill.run(&job_id, &project_id).await;
            None
        }
    }
}

async fn hand_off(requeue: &WeakSender<Task>, next: Task) {
    let job_id = next.job_id().to_string();
    let Some(tx) = requeue.upgrade() else {
        warn!(job_id = %job_id, "scheduler closed before next step could be queued");
        return;
    };
    if tx.send(next).await.is_err() {
        warn!(job_id = %job_id, "scheduler closed before next step could be queued");
    }
}
