use std::sync::Weak;
use std::time::Duration;

use crate::error::Result;
use crate::scheduler::{BackgroundTask, Context};

use super::store::Store;

/// Periodic compaction pass over the store's sealed segments.
///
/// Holds a weak handle so a closed and dropped store is not kept alive by its
/// own background task.
pub struct CompactionTask {
    store: Weak<Store>,
    interval: Duration,
}

impl CompactionTask {
    pub fn new(store: Weak<Store>, interval: Duration) -> Self {
        Self { store, interval }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for CompactionTask {
    fn name(&self) -> &'static str {
        "compaction"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, _ctx: Context) -> Result<()> {
        let store = match self.store.upgrade() {
            Some(store) => store,
            None => return Ok(()), // store already dropped
        };

        tracing::info!("starting scheduled compaction");
        store.merge()?;
        tracing::info!("scheduled compaction finished");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;
    use crate::tmpfs::TempDir;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_execute_merges_store() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = Config::new(dir.path()).max_segment_entries(2);
        let store = Store::open(config).expect("Failed to open store");

        for i in 0..5 {
            store
                .set(&format!("key{i}"), "value")
                .expect("Failed to set");
        }

        let task = CompactionTask::new(Arc::downgrade(&store), Duration::from_secs(1));
        let ctx = Context {
            run_id: 1,
            shutdown: tokio::sync::broadcast::channel(1).1,
        };
        task.execute(ctx).await.expect("Task run should succeed");

        for i in 0..5 {
            assert_eq!(
                store.get(&format!("key{i}")).expect("Failed to get"),
                "value"
            );
        }
    }

    #[tokio::test]
    async fn test_execute_after_store_dropped() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::open(Config::new(dir.path())).expect("Failed to open store");

        let task = CompactionTask::new(Arc::downgrade(&store), Duration::from_secs(1));
        store.close().expect("Failed to close");
        drop(store);

        let ctx = Context {
            run_id: 1,
            shutdown: tokio::sync::broadcast::channel(1).1,
        };
        task.execute(ctx)
            .await
            .expect("Task must be a no-op once the store is gone");
    }
}
