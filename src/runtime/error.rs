use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("worker already running")]
    AlreadyRunning,
    #[error("workflow queue is full")]
    QueueFull,
    #[error("workflow worker has stopped")]
    QueueClosed,
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
