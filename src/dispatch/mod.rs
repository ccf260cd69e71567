use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::PipelineError;
use crate::pipeline::{ModelSelector, Orchestrator, StagedMedia, Task};

/// Maximum accepted video payload.
pub const MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Pool sizing: a small fixed worker count over a bounded backlog. This is
/// the only admission control in the system.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 25,
        }
    }
}

/// Accepts submissions, validates them, and hands accepted tasks to a
/// bounded worker pool. The caller gets the task id back immediately and
/// never blocks on pipeline completion; a saturated queue is reported
/// synchronously instead of silently dropping work.
pub struct Dispatcher {
    queue: mpsc::Sender<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn start(config: DispatcherConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let (tx, rx) = mpsc::channel::<Task>(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let rx = rx.clone();
            let orchestrator = orchestrator.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(task) = task else {
                        info!("Worker {} shutting down, queue closed", worker_id);
                        break;
                    };

                    info!("Worker {} picked up task {}", worker_id, task.id);
                    // the submitter already got its acknowledgment; the
                    // outcome is logged here and reported via progress only
                    match orchestrator.run(task).await {
                        Ok(path) => info!("Worker {} finished task, output: {}", worker_id, path.display()),
                        Err(e) => error!("Worker {} task failed: {}", worker_id, e),
                    }
                }
            }));
        }

        info!(
            "Dispatcher started with {} worker(s), queue capacity {}",
            config.workers, config.queue_capacity
        );
        Self {
            queue: tx,
            workers: Mutex::new(workers),
        }
    }

    /// Validates and enqueues a submission, returning the generated task id.
    /// Validation failures and a full queue surface synchronously; no task
    /// is created in either case.
    pub fn submit(&self, input: StagedMedia, model: ModelSelector) -> Result<String, PipelineError> {
        validate_media(&input)?;

        let task = Task::new(input, model);
        let task_id = task.id.clone();

        self.queue.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => PipelineError::CapacityExceeded,
            TrySendError::Closed(_) => {
                error!("Worker pool queue is closed, rejecting submission");
                PipelineError::CapacityExceeded
            }
        })?;

        info!("Task {} accepted for processing", task_id);
        Ok(task_id)
    }

    /// Closes the queue and waits for every worker to drain and exit.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        drop(self.queue);
        let mut workers = self.workers.into_inner();
        for worker in workers.drain(..) {
            worker.await?;
        }
        Ok(())
    }
}

fn validate_media(media: &StagedMedia) -> Result<(), PipelineError> {
    if media.size_bytes == 0 {
        return Err(PipelineError::validation("no video payload provided"));
    }
    if !media.content_type.starts_with("video/") {
        return Err(PipelineError::validation(format!(
            "unsupported content type '{}', expected video/*",
            media.content_type
        )));
    }
    if media.size_bytes > MAX_UPLOAD_BYTES {
        return Err(PipelineError::validation("video file exceeds the 500 MB limit"));
    }
    Ok(())
}
