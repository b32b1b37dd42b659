use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{Clock, ScheduledTaskInfo, TaskError, TaskKey, TaskManagerConfig};

struct PendingTask {
    generation: u64,
    fire_at: DateTime<Utc>,
    handle: AbortHandle,
}

struct ManagerState {
    tasks: Mutex<HashMap<TaskKey, PendingTask>>,
    permits: Arc<Semaphore>,
    pool_size: usize,
    clock: Arc<dyn Clock>,
    next_generation: AtomicU64,
    is_shutdown: AtomicBool,
}

/// Keyed one-shot timers.
///
/// Scheduling under a key that already has a pending action replaces it.
/// A pending action can be cancelled until it starts; once it has started
/// it always runs to completion. Execution is bounded by a fixed pool of
/// permits, and a failing or panicking action is logged and never affects
/// other actions.
#[derive(Clone)]
pub struct DeferredTaskManager {
    state: Arc<ManagerState>,
}

impl DeferredTaskManager {
    pub fn new(config: TaskManagerConfig, clock: Arc<dyn Clock>) -> Self {
        let pool_size = if config.pool_size == 0 {
            warn!("Task pool size of 0 requested, using 1");
            1
        } else {
            config.pool_size
        };

        Self {
            state: Arc::new(ManagerState {
                tasks: Mutex::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(pool_size)),
                pool_size,
                clock,
                next_generation: AtomicU64::new(0),
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.state.clock)
    }

    /// Arranges for `task` to run at `fire_at`, or as soon as possible if that
    /// instant has already passed.
    #[instrument(skip(self, task), fields(key = %key))]
    pub async fn schedule<F>(
        &self,
        key: TaskKey,
        fire_at: DateTime<Utc>,
        task: F,
    ) -> Result<(), TaskError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.state.is_shutdown.load(Ordering::SeqCst) {
            return Err(TaskError::ShutDown);
        }

        let mut tasks = self.state.tasks.lock().await;

        let generation = self.state.next_generation.fetch_add(1, Ordering::SeqCst);
        let delay = (fire_at - self.state.clock.now())
            .to_std()
            .unwrap_or_default();

        let state = Arc::clone(&self.state);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let _permit = match Arc::clone(&state.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("Task pool closed before {} could run", task_key);
                    return;
                }
            };

            // Past this point the action is no longer cancellable.
            {
                let mut tasks = state.tasks.lock().await;
                match tasks.get(&task_key) {
                    Some(pending) if pending.generation == generation => {
                        tasks.remove(&task_key);
                    }
                    _ => return,
                }
            }

            debug!("Running deferred task {}", task_key);
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => debug!("Deferred task {} completed", task_key),
                Ok(Err(e)) => error!("Deferred task {} failed: {:#}", task_key, e),
                Err(_) => error!("Deferred task {} panicked", task_key),
            }
        })
        .abort_handle();

        if let Some(previous) = tasks.insert(
            key.clone(),
            PendingTask {
                generation,
                fire_at,
                handle,
            },
        ) {
            debug!("Replacing pending task {} (was due {})", key, previous.fire_at);
            previous.handle.abort();
        }

        debug!("Scheduled {} for {}", key, fire_at);
        Ok(())
    }

    /// Cancels the pending action for `key`. Returns whether one was pending.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn cancel(&self, key: &TaskKey) -> bool {
        let mut tasks = self.state.tasks.lock().await;
        match tasks.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                debug!("Cancelled pending task {}", key);
                true
            }
            None => false,
        }
    }

    pub async fn is_scheduled(&self, key: &TaskKey) -> bool {
        self.state.tasks.lock().await.contains_key(key)
    }

    pub async fn fire_time(&self, key: &TaskKey) -> Option<DateTime<Utc>> {
        self.state
            .tasks
            .lock()
            .await
            .get(key)
            .map(|pending| pending.fire_at)
    }

    pub async fn scheduled_count(&self) -> usize {
        self.state.tasks.lock().await.len()
    }

    pub async fn scheduled(&self) -> Vec<ScheduledTaskInfo> {
        let tasks = self.state.tasks.lock().await;
        let mut scheduled: Vec<ScheduledTaskInfo> = tasks
            .iter()
            .map(|(key, pending)| ScheduledTaskInfo {
                key: key.clone(),
                fire_at: pending.fire_at,
            })
            .collect();
        scheduled.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.key.cmp(&b.key)));
        scheduled
    }

    /// Number of actions executing right now.
    pub fn running_count(&self) -> usize {
        self.state.pool_size - self.state.permits.available_permits()
    }

    /// Drops every pending action and refuses new ones. Actions already
    /// running are left to finish.
    pub async fn shutdown(&self) {
        self.state.is_shutdown.store(true, Ordering::SeqCst);

        let mut tasks = self.state.tasks.lock().await;
        let dropped = tasks.len();
        for (_, pending) in tasks.drain() {
            pending.handle.abort();
        }

        info!("Deferred task manager shut down, {} pending tasks dropped", dropped);
    }
}
