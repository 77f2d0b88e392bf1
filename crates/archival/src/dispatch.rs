//! Queue consumer: runs stage tasks under the retry policy, records metrics
//! and acknowledges entries once the policy has settled.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use storage::TaskQueue;
use storm_common::{StormResult, TaskMessage};

use crate::archiver::{Archiver, FetchReport};
use crate::retry::RetryPolicy;

/// What a finished task produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskOutput {
    Fetch(FetchReport),
    Archive { snapshot: String },
    Combine { url: Option<String> },
    Extract { url: Option<String> },
    FetchUrl { body: Option<String> },
}

/// Routes task messages to archiver stages.
pub struct TaskDispatcher {
    archiver: Arc<Archiver>,
    queue: Arc<dyn TaskQueue>,
    retry: RetryPolicy,
}

impl TaskDispatcher {
    pub fn new(archiver: Arc<Archiver>, queue: Arc<dyn TaskQueue>, retry: RetryPolicy) -> Self {
        Self {
            archiver,
            queue,
            retry,
        }
    }

    pub fn archiver(&self) -> &Arc<Archiver> {
        &self.archiver
    }

    /// Run one message once, without retries.
    pub async fn execute(&self, message: &TaskMessage) -> StormResult<TaskOutput> {
        let a = &self.archiver;
        Ok(match message {
            TaskMessage::Fetch(task) => TaskOutput::Fetch(a.fetch(task).await?),
            TaskMessage::Archive {
                storm_id,
                requirement_id,
                log_id,
            } => TaskOutput::Archive {
                snapshot: a.archive(*storm_id, *requirement_id, *log_id).await?,
            },
            TaskMessage::Combine { run_id } => TaskOutput::Combine {
                url: a.combine(*run_id).await?,
            },
            TaskMessage::Extract { run_id } => TaskOutput::Extract {
                url: a.extract(*run_id).await?,
            },
            TaskMessage::FetchUrl {
                url,
                verify_tls,
                write_to_path,
            } => TaskOutput::FetchUrl {
                body: a.fetch_url(url, *verify_tls, write_to_path.as_deref()).await?,
            },
        })
    }

    /// Run a message under the retry policy. A fetch that still fails is
    /// logged as an unsuccessful attempt before the error is returned.
    #[instrument(skip(self, message), fields(task = message.kind()))]
    pub async fn run(&self, message: &TaskMessage) -> StormResult<TaskOutput> {
        let kind = message.kind();
        let started = Instant::now();

        let result = self
            .retry
            .run(kind, |attempt| {
                metrics::counter!("storm_task_attempts_total", "task" => kind).increment(1);
                if attempt > 1 {
                    info!(attempt, "Retrying task");
                }
                self.execute(message)
            })
            .await;

        metrics::histogram!("storm_task_duration_seconds", "task" => kind)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => {
                metrics::counter!("storm_tasks_total", "task" => kind, "status" => "success")
                    .increment(1);
            }
            Err(e) => {
                metrics::counter!("storm_tasks_total", "task" => kind, "status" => "failure")
                    .increment(1);
                error!(error = %e, "Task failed");

                if let TaskMessage::Fetch(task) = message {
                    if let Err(log_err) = self.archiver.record_failed_fetch(task).await {
                        error!(error = %log_err, "Failed to record fetch failure");
                    }
                }
            }
        }

        result
    }

    /// Claim, run and acknowledge one queued task. Returns `false` when the
    /// queue had nothing to hand out.
    pub async fn process_next(&self, consumer: &str) -> StormResult<bool> {
        let Some(claimed) = self.queue.claim_next(consumer).await? else {
            return Ok(false);
        };

        // Failures are final once the policy gives up; the entry is acked
        // either way so it is not redelivered.
        let _ = self.run(&claimed.envelope.message).await;
        self.queue.ack(&claimed.entry_id).await?;
        Ok(true)
    }

    /// Consume the queue until `shutdown` resolves.
    pub async fn serve(&self, consumer: &str, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!(consumer = %consumer, "Consuming stage tasks");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping consumer");
                    return;
                }
                result = self.process_next(consumer) => match result {
                    Ok(true) => {}
                    // Redis blocks inside claim_next; in-memory queues return at once.
                    Ok(false) => tokio::time::sleep(std::time::Duration::from_millis(200)).await,
                    Err(e) => {
                        error!(error = %e, "Queue error");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                },
            }
        }
    }
}
