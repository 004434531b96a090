// ============================================================================
// Task Runner - Background Job Substrate
// ============================================================================
//
// Named queues with per-queue rate limits, retry with doubling backoff,
// soft/hard timeouts, periodic schedules, and status tracking. A task's
// status moves to Succeeded/Failed only after its handler completes, so
// callers polling a task id never observe a half-done "success".
//
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, args: Value) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded { result: Value },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct QueuePolicy {
    pub rate_per_minute: u32,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
    /// A worker ends its loop after this many tasks and is replaced.
    pub tasks_per_worker: u32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            rate_per_minute: 100,
            max_retries: 3,
            retry_backoff: Duration::from_secs(60),
            soft_timeout: Duration::from_secs(9 * 60),
            hard_timeout: Duration::from_secs(10 * 60),
            tasks_per_worker: 1000,
        }
    }
}

impl QueuePolicy {
    /// Policy for the batch-reply queue: far fewer dispatches per minute
    /// than the default queue.
    pub fn batch_replies() -> Self {
        Self {
            rate_per_minute: 10,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct QueuedTask {
    id: Uuid,
    name: String,
    args: Value,
    attempt: u32,
}

struct Registration {
    queue: String,
    handler: Arc<dyn TaskHandler>,
}

pub struct TaskRunner {
    handlers: Arc<DashMap<String, Registration>>,
    queues: Arc<DashMap<String, mpsc::UnboundedSender<QueuedTask>>>,
    statuses: Arc<DashMap<Uuid, TaskStatus>>,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            queues: Arc::new(DashMap::new()),
            statuses: Arc::new(DashMap::new()),
        }
    }

    /// Create a named queue and start its worker.
    pub fn declare_queue(&self, name: &str, policy: QueuePolicy) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues.insert(name.to_string(), tx.clone());

        tokio::spawn(supervise_queue(
            name.to_string(),
            policy,
            rx,
            tx,
            self.handlers.clone(),
            self.statuses.clone(),
        ));
    }

    /// Bind a task name to a queue and handler.
    pub fn register(&self, task_name: &str, queue: &str, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(
            task_name.to_string(),
            Registration {
                queue: queue.to_string(),
                handler,
            },
        );
    }

    /// Enqueue a task; at-least-once from the caller's perspective.
    pub fn submit(&self, task_name: &str, args: Value) -> Result<Uuid> {
        let queue_name = self
            .handlers
            .get(task_name)
            .map(|r| r.queue.clone())
            .ok_or_else(|| AppError::NotFound(format!("Unknown task '{}'", task_name)))?;

        let queue = self
            .queues
            .get(&queue_name)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("queue '{}' not declared", queue_name)))?;

        let id = Uuid::new_v4();
        self.statuses.insert(id, TaskStatus::Pending);

        queue
            .send(QueuedTask {
                id,
                name: task_name.to_string(),
                args,
                attempt: 0,
            })
            .map_err(|_| AppError::Internal(anyhow::anyhow!("queue '{}' is closed", queue_name)))?;

        Ok(id)
    }

    pub fn status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.statuses.get(&task_id).map(|s| s.clone())
    }

    /// Submit `task_name` every `every` interval, starting one period
    /// from now.
    pub fn schedule_periodic(self: Arc<Self>, task_name: &str, args: Value, every: Duration) {
        let runner = self;
        let task_name = task_name.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            tracing::info!("⏱ Periodic schedule registered: '{}' every {:?}", task_name, every);

            loop {
                interval.tick().await;
                match runner.submit(&task_name, args.clone()) {
                    Ok(id) => tracing::debug!("⏱ Scheduled task '{}' submitted as {}", task_name, id),
                    Err(e) => tracing::error!("Failed to submit scheduled task '{}': {}", task_name, e),
                }
            }
        });
    }
}

/// Keeps one worker alive per queue. A worker generation ends its loop
/// after `tasks_per_worker` tasks and hands the receiver back; the
/// supervisor spawns a fresh generation against the same channel, so the
/// queue drains continuously across recycles.
async fn supervise_queue(
    queue_name: String,
    policy: QueuePolicy,
    rx: mpsc::UnboundedReceiver<QueuedTask>,
    retry_tx: mpsc::UnboundedSender<QueuedTask>,
    handlers: Arc<DashMap<String, Registration>>,
    statuses: Arc<DashMap<Uuid, TaskStatus>>,
) {
    tracing::info!(
        "🛠 Queue '{}' started ({}/min, {} retries, recycle after {} tasks)",
        queue_name,
        policy.rate_per_minute,
        policy.max_retries,
        policy.tasks_per_worker
    );

    let mut rx = rx;
    let mut generation: u64 = 1;

    loop {
        let worker = tokio::spawn(run_worker(
            queue_name.clone(),
            generation,
            policy.clone(),
            rx,
            retry_tx.clone(),
            handlers.clone(),
            statuses.clone(),
        ));

        match worker.await {
            Ok(Some(returned_rx)) => {
                tracing::info!(
                    "♻️ Queue '{}' worker generation {} recycled after {} tasks",
                    queue_name,
                    generation,
                    policy.tasks_per_worker
                );
                rx = returned_rx;
                generation += 1;
            }
            Ok(None) => {
                tracing::info!("Queue '{}' closed; worker stopped", queue_name);
                break;
            }
            Err(e) => {
                tracing::error!(
                    "❌ Queue '{}' worker generation {} crashed: {}; queue halted",
                    queue_name,
                    generation,
                    e
                );
                break;
            }
        }
    }
}

/// One worker generation. Returns the receiver for the next generation
/// after `tasks_per_worker` tasks, or None once the channel closes.
async fn run_worker(
    queue_name: String,
    generation: u64,
    policy: QueuePolicy,
    mut rx: mpsc::UnboundedReceiver<QueuedTask>,
    retry_tx: mpsc::UnboundedSender<QueuedTask>,
    handlers: Arc<DashMap<String, Registration>>,
    statuses: Arc<DashMap<Uuid, TaskStatus>>,
) -> Option<mpsc::UnboundedReceiver<QueuedTask>> {
    let min_gap = Duration::from_secs_f64(60.0 / policy.rate_per_minute.max(1) as f64);
    let mut processed: u32 = 0;
    let mut last_start: Option<Instant> = None;

    tracing::debug!("Queue '{}' worker generation {} running", queue_name, generation);

    while let Some(task) = rx.recv().await {
        if let Some(prev) = last_start {
            let since = prev.elapsed();
            if since < min_gap {
                tokio::time::sleep(min_gap - since).await;
            }
        }
        last_start = Some(Instant::now());

        let handler = match handlers.get(&task.name).map(|r| r.handler.clone()) {
            Some(handler) => handler,
            None => {
                statuses.insert(
                    task.id,
                    TaskStatus::Failed {
                        error: format!("no handler registered for task '{}'", task.name),
                    },
                );
                continue;
            }
        };

        statuses.insert(task.id, TaskStatus::Running);

        match execute_with_timeouts(&queue_name, &task, handler.as_ref(), &policy).await {
            Ok(result) => {
                statuses.insert(task.id, TaskStatus::Succeeded { result });
            }
            Err(error) => {
                if task.attempt < policy.max_retries {
                    let backoff = policy.retry_backoff * 2u32.saturating_pow(task.attempt);
                    tracing::warn!(
                        "Task '{}' ({}) attempt {} failed: {}. Retrying in {:?}",
                        task.name,
                        task.id,
                        task.attempt + 1,
                        error,
                        backoff
                    );
                    let retry = QueuedTask {
                        attempt: task.attempt + 1,
                        ..task
                    };
                    let retry_tx = retry_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(backoff).await;
                        let _ = retry_tx.send(retry);
                    });
                } else {
                    tracing::error!(
                        "❌ Task '{}' ({}) failed after {} attempts: {}",
                        task.name,
                        task.id,
                        task.attempt + 1,
                        error
                    );
                    statuses.insert(task.id, TaskStatus::Failed { error });
                }
            }
        }

        processed += 1;
        if processed >= policy.tasks_per_worker {
            return Some(rx);
        }
    }

    None
}

async fn execute_with_timeouts(
    queue_name: &str,
    task: &QueuedTask,
    handler: &dyn TaskHandler,
    policy: &QueuePolicy,
) -> std::result::Result<Value, String> {
    let mut run = handler.run(task.args.clone());

    let result = match tokio::time::timeout(policy.soft_timeout, &mut run).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                "⏰ Task '{}' on queue '{}' exceeded soft timeout ({:?})",
                task.name,
                queue_name,
                policy.soft_timeout
            );
            let grace = policy.hard_timeout.saturating_sub(policy.soft_timeout);
            match tokio::time::timeout(grace, &mut run).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(format!("hard timeout after {:?}", policy.hard_timeout));
                }
            }
        }
    };

    result.map_err(|e| format!("{e:#}"))
}
