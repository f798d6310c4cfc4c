//! Task handles.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// What a background task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Periodic metric sampling for one server.
    Collection,
    /// Delayed provisioning completion for one server.
    Provisioning,
    /// Delayed deployment stage.
    DeploymentStage,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Provisioning => "provisioning",
            Self::DeploymentStage => "deployment_stage",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A handle to a spawned background task.
#[derive(Debug)]
pub struct TaskHandle {
    /// Unique task identifier.
    pub id: String,
    /// Entity the task belongs to (server or deployment id).
    pub key: String,
    pub kind: TaskKind,
    /// When the task was created.
    pub created_at: Instant,
    /// Cancellation token for this task.
    pub cancellation_token: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn a task on a child token of `parent`.
    ///
    /// The task is responsible for observing the token it is given.
    pub fn spawn<F, Fut>(kind: TaskKind, key: impl Into<String>, parent: &CancellationToken, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancellation_token = parent.child_token();
        let join = tokio::spawn(f(cancellation_token.clone()));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            kind,
            created_at: Instant::now(),
            cancellation_token,
            join,
        }
    }

    /// Spawn a one-shot task that runs `fut` after `delay`.
    ///
    /// Cancelling before the delay elapses drops `fut` without running it.
    /// Once `fut` has started it runs to completion; callers gate its effects
    /// on entity generations.
    pub fn delayed<Fut>(
        kind: TaskKind,
        key: impl Into<String>,
        parent: &CancellationToken,
        delay: Duration,
        fut: Fut,
    ) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let task_key = key.clone();
        Self::spawn(kind, key, parent, move |token| async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!(kind = %kind, key = %task_key, "Delayed task cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => fut.await,
            }
        })
    }

    /// Cancel this task.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Cancel this task and wait for its body to return.
    pub async fn cancel_and_wait(self) {
        self.cancellation_token.cancel();
        if let Err(e) = self.join.await {
            if e.is_panic() {
                warn!(kind = %self.kind, key = %self.key, "Task panicked before stopping");
            }
        }
    }

    /// Check if this task is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Whether the task body has returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Neither cancelled nor finished.
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_finished()
    }

    /// Get the elapsed time since task creation.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_delayed_task_fires() {
        let root = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let handle = TaskHandle::delayed(
            TaskKind::Provisioning,
            "server-1",
            &root,
            Duration::from_secs(5),
            async move {
                flag.store(true, Ordering::SeqCst);
            },
        );
        assert!(handle.is_active());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_delayed_task_never_fires() {
        let root = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let handle = TaskHandle::delayed(
            TaskKind::DeploymentStage,
            "deployment-1",
            &root,
            Duration::from_secs(5),
            async move {
                flag.store(true, Ordering::SeqCst);
            },
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_wait_lets_started_body_finish() {
        let root = CancellationToken::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        let handle = TaskHandle::spawn(TaskKind::Collection, "server-1", &root, move |_token| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            flag.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        handle.cancel_and_wait().await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_propagates() {
        let root = CancellationToken::new();
        let handle = TaskHandle::delayed(
            TaskKind::Provisioning,
            "server-1",
            &root,
            Duration::from_secs(5),
            async {},
        );

        root.cancel();
        assert!(handle.is_cancelled());
        assert!(!handle.is_active());
    }
}
