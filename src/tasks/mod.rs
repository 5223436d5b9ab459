//! Background task registry.
//!
//! Long-running loops (auto-delete sweep, periodic backup, health server)
//! are spawned through the registry so shutdown can cancel and await them.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Default)]
pub struct TaskRegistry {
    token: CancellationToken,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token every registered task should watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task built from the shared cancellation token.
    pub fn spawn<F, Fut>(&self, name: &str, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(make(self.token.clone()));
        self.handles.lock().push((name.to_string(), handle));
        info!("Started background task: {}", name);
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Cancel every task and wait up to `grace` for each to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.token.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());

        for (name, handle) in handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => info!("Task {} stopped", name),
                Ok(Err(e)) => warn!("Task {} ended abnormally: {}", name, e),
                Err(_) => {
                    warn!("Task {} did not stop within {:?}, aborting", name, grace);
                    abort.abort();
                }
            }
        }
    }
}
