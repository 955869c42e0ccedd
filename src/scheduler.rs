//! Cron-like recurrent job registry. One executor task wakes at the
//! nearest due time and invokes the job handler under a bounded deadline,
//! replacing one hand-written `tokio::spawn` + `interval` loop per
//! background activity with a single owned, cancellable registry.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type JobHandler = Arc<dyn Fn() -> JobFuture + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastResult {
    Ok,
    Failed(String),
    Cancelled,
}

struct Job {
    interval: ChronoDuration,
    handler: JobHandler,
    enabled: bool,
    last_run_at: Option<DateTime<Utc>>,
    last_result: Option<LastResult>,
}

/// The minimum job set a fully wired process registers:
/// `portfolio.snapshot`, `history.sync`, `arbitrage.tick`, `db.backup`,
/// `market.index.prune`, `sessions.prune`, and, when tracked terms are
/// configured, `arbitrage.auto_match`.
pub struct Scheduler {
    jobs: Mutex<HashMap<String, Job>>,
    job_deadline: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(job_deadline_secs: u64) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            job_deadline: Duration::from_secs(job_deadline_secs),
            handle: Mutex::new(None),
        }
    }

    pub async fn register<F, Fut>(&self, id: impl Into<String>, interval: ChronoDuration, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = id.into();
        let wrapped: JobHandler = Arc::new(move || Box::pin(handler()));
        self.jobs.lock().await.insert(
            id,
            Job {
                interval,
                handler: wrapped,
                enabled: true,
                last_run_at: None,
                last_result: None,
            },
        );
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) {
        if let Some(job) = self.jobs.lock().await.get_mut(id) {
            job.enabled = enabled;
        }
    }

    pub async fn last_result(&self, id: &str) -> Option<LastResult> {
        self.jobs.lock().await.get(id).and_then(|j| j.last_result.clone())
    }

    /// Spawns the single executor task. Each wake scans for due jobs, runs
    /// them concurrently under `job_deadline`, and records outcomes.
    pub async fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            loop {
                tick.tick().await;
                scheduler.run_due_jobs().await;
            }
        });
        *self.handle.lock().await = Some(handle);
    }

    async fn run_due_jobs(&self) {
        let now = Utc::now();
        let due: Vec<(String, JobHandler)> = {
            let jobs = self.jobs.lock().await;
            jobs.iter()
                .filter(|(_, job)| job.enabled)
                .filter(|(_, job)| job.last_run_at.map(|t| now - t >= job.interval).unwrap_or(true))
                .map(|(id, job)| (id.clone(), job.handler.clone()))
                .collect()
        };

        for (id, handler) in due {
            let deadline = self.job_deadline;
            let result = tokio::time::timeout(deadline, handler()).await;
            let outcome = match result {
                Ok(Ok(())) => {
                    info!(job = id.as_str(), "job completed");
                    LastResult::Ok
                }
                Ok(Err(e)) => {
                    error!(job = id.as_str(), error = %e, "job failed");
                    LastResult::Failed(e.to_string())
                }
                Err(_) => {
                    warn!(job = id.as_str(), "job exceeded deadline, cancelled");
                    LastResult::Cancelled
                }
            };
            if let Some(job) = self.jobs.lock().await.get_mut(&id) {
                job.last_run_at = Some(Utc::now());
                job.last_result = Some(outcome);
            }
        }
    }

    /// Cancels the executor task. Pending Store writes are flushed by the
    /// Store itself (each mutating helper commits before returning); the
    /// Scheduler has no buffered state of its own to flush.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn due_job_runs_and_records_ok() {
        let scheduler = Scheduler::new(5);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        scheduler
            .register("test.job", ChronoDuration::seconds(0), move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        scheduler.run_due_jobs().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.last_result("test.job").await, Some(LastResult::Ok));
    }

    #[tokio::test]
    async fn disabled_job_does_not_run() {
        let scheduler = Scheduler::new(5);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        scheduler
            .register("test.job", ChronoDuration::seconds(0), move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        scheduler.set_enabled("test.job", false).await;
        scheduler.run_due_jobs().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_job_records_failed_result() {
        let scheduler = Scheduler::new(5);
        scheduler
            .register("test.job", ChronoDuration::seconds(0), || async { anyhow::bail!("boom") })
            .await;
        scheduler.run_due_jobs().await;
        assert!(matches!(scheduler.last_result("test.job").await, Some(LastResult::Failed(_))));
    }
}
