//! Keyed task registry.
//!
//! Holds at most one task per key. Spawning under a key that already has a
//! task cancels the old one first, under the same lock, so two tasks for one
//! key are never both registered.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::task::{TaskHandle, TaskKind};

/// Registry of background tasks keyed by entity id.
#[derive(Debug)]
pub struct TaskRegistry {
    kind: TaskKind,
    parent: CancellationToken,
    tasks: Mutex<HashMap<String, TaskHandle>>,
}

impl TaskRegistry {
    pub fn new(kind: TaskKind, parent: CancellationToken) -> Self {
        Self {
            kind,
            parent,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a task for `key`, replacing (and cancelling) any existing one.
    pub fn spawn<F, Fut>(&self, key: &str, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, handle| handle.is_active());
        if let Some(previous) = tasks.remove(key) {
            debug!(kind = %self.kind, key = %key, task_id = %previous.id, "Replacing task");
            previous.cancel();
        }
        let handle = TaskHandle::spawn(self.kind, key, &self.parent, f);
        tasks.insert(key.to_string(), handle);
    }

    /// Schedule a one-shot task for `key` after `delay`, replacing any existing one.
    pub fn schedule<Fut>(&self, key: &str, delay: Duration, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, handle| handle.is_active());
        if let Some(previous) = tasks.remove(key) {
            debug!(kind = %self.kind, key = %key, task_id = %previous.id, "Replacing scheduled task");
            previous.cancel();
        }
        let handle = TaskHandle::delayed(self.kind, key, &self.parent, delay, fut);
        tasks.insert(key.to_string(), handle);
    }

    /// Cancel the task for `key`. Returns whether an active task was cancelled.
    pub fn cancel(&self, key: &str) -> bool {
        match self.tasks.lock().remove(key) {
            Some(handle) => {
                let was_active = handle.is_active();
                handle.cancel();
                was_active
            }
            None => false,
        }
    }

    /// Cancel the task for `key` and wait until it has returned.
    pub async fn cancel_and_wait(&self, key: &str) -> bool {
        let removed = self.tasks.lock().remove(key);
        let Some(handle) = removed else {
            return false;
        };
        let was_active = handle.is_active();
        handle.cancel_and_wait().await;
        was_active
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.tasks
            .lock()
            .get(key)
            .is_some_and(TaskHandle::is_active)
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|handle| handle.is_active())
            .count()
    }

    /// Cancel every task.
    pub fn cancel_all(&self) {
        let drained: Vec<TaskHandle> = self.tasks.lock().drain().map(|(_, handle)| handle).collect();
        if !drained.is_empty() {
            debug!(kind = %self.kind, count = drained.len(), "Cancelling all tasks");
        }
        for handle in drained {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn looping_task(counter: Arc<AtomicUsize>) -> impl FnOnce(CancellationToken) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move |token| {
            Box::pin(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_replaces_existing() {
        let registry = TaskRegistry::new(TaskKind::Collection, CancellationToken::new());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.spawn("s1", looping_task(first.clone()));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        registry.spawn("s1", looping_task(second.clone()));
        assert_eq!(registry.active_count(), 1);

        let first_before = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(first.load(Ordering::SeqCst), first_before);
        assert!(second.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_cancel_all() {
        let registry = TaskRegistry::new(TaskKind::Collection, CancellationToken::new());
        registry.spawn("s1", looping_task(Arc::new(AtomicUsize::new(0))));
        registry.spawn("s2", looping_task(Arc::new(AtomicUsize::new(0))));
        assert_eq!(registry.active_count(), 2);

        assert!(registry.cancel("s1"));
        assert!(!registry.cancel("s1"));
        assert!(!registry.is_active("s1"));
        assert!(registry.is_active("s2"));

        registry.cancel_all();
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_tasks_are_not_active() {
        let registry = TaskRegistry::new(TaskKind::Provisioning, CancellationToken::new());
        registry.schedule("s1", Duration::from_secs(1), async {});
        assert!(registry.is_active("s1"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!registry.is_active("s1"));
        assert_eq!(registry.active_count(), 0);
    }
}
