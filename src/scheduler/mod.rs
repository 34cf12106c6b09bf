use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Periodic work registered with the [`Scheduler`]. An implementation states
/// its own period; the scheduler owns the timer loop and error reporting.
#[async_trait::async_trait]
pub trait BackgroundTask: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &'static str;

    /// Period between runs.
    fn interval(&self) -> Duration;

    /// One run of the task.
    async fn execute(&self, ctx: Context) -> Result<()>;
}

/// Per-run state handed to [`BackgroundTask::execute`].
pub struct Context {
    /// Counts runs of this task, starting at 1.
    pub run_id: u64,
    /// Fires when the scheduler shuts down; a long run may bail out early.
    pub shutdown: broadcast::Receiver<()>,
}

/// Scheduler manages periodic background tasks with broadcast shutdown
pub struct Scheduler {
    tasks: RwLock<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tasks: RwLock::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Register a periodic background task
    pub fn register<T: BackgroundTask + 'static>(&self, task: Arc<T>) -> &Self {
        let handle = self.spawn_timer_loop(task);
        if let Ok(mut tasks) = self.tasks.write() {
            tasks.push(handle);
        }
        self
    }

    fn spawn_timer_loop<T: BackgroundTask + 'static>(&self, task: Arc<T>) -> JoinHandle<()> {
        let period = task.interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut run_id = 0u64;

        tokio::spawn(async move {
            // First tick lands one full period after registration, not
            // immediately.
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_id += 1;
                        let ctx = Context {
                            run_id,
                            shutdown: shutdown_rx.resubscribe(),
                        };

                        if let Err(e) = task.execute(ctx).await {
                            tracing::error!(
                                task = task.name(),
                                error = %e,
                                "Task execution failed"
                            );
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        tracing::info!(task = task.name(), "Task shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Signal all tasks to stop. Tasks observe the signal at their next
    /// scheduling point; an in-flight run completes first.
    pub fn shutdown(&self) {
        self.shutdown_tx.send(()).ok();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
