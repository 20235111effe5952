use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::error::SchedulerError;

/// A spawned background loop and the means to stop it.
#[derive(Debug)]
pub(super) struct WorkerHandle<T> {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<Result<T, SchedulerError>>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    pub(super) fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = Result<T, SchedulerError>> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run(stop_rx));
        Self { stop_tx, join }
    }

    pub(super) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub(super) async fn stop(self) -> Result<T, SchedulerError> {
        let _ = self.stop_tx.send(());
        self.join.await?
    }
}
