use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

use super::error::SchedulerError;
use super::worker::WorkerHandle;
use crate::config::{to_chrono, WorkflowConfig};
use crate::conjunction::{
    AlertMonitor, ConjunctionBook, ConjunctionMessage, IngestOutcome, MonitorReport,
    WorkflowSummary,
};
use crate::snapshot::{Publisher, Subscription};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub created: usize,
    pub superseded: usize,
    pub outdated: usize,
    pub duplicate: usize,
    pub rejected: Vec<RejectedMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedMessage {
    pub message_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRefresh {
    pub pruned: usize,
    pub summary: WorkflowSummary,
    pub alerts: MonitorReport,
}

enum WorkflowCommand {
    Ingest {
        messages: Vec<ConjunctionMessage>,
        reply: Option<oneshot::Sender<IngestSummary>>,
    },
    Summary {
        reply: oneshot::Sender<WorkflowSummary>,
    },
    Refresh {
        reply: oneshot::Sender<WorkflowRefresh>,
    },
}

/// Cheap to clone; every clone talks to the same workflow task.
#[derive(Clone)]
pub struct WorkflowHandle {
    commands: mpsc::Sender<WorkflowCommand>,
    summaries: Arc<Publisher<WorkflowSummary>>,
}

impl WorkflowHandle {
    pub async fn ingest(
        &self,
        messages: Vec<ConjunctionMessage>,
    ) -> Result<IngestSummary, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkflowCommand::Ingest {
            messages,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| SchedulerError::QueueClosed)
    }

    /// Queues messages without waiting. Fails rather than blocks when the
    /// queue is full.
    pub fn submit(&self, messages: Vec<ConjunctionMessage>) -> Result<(), SchedulerError> {
        self.commands
            .try_send(WorkflowCommand::Ingest {
                messages,
                reply: None,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => SchedulerError::QueueFull,
                TrySendError::Closed(_) => SchedulerError::QueueClosed,
            })
    }

    pub async fn summary(&self) -> Result<WorkflowSummary, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkflowCommand::Summary { reply }).await?;
        rx.await.map_err(|_| SchedulerError::QueueClosed)
    }

    /// Runs one refresh cycle now instead of waiting for the interval.
    pub async fn refresh(&self) -> Result<WorkflowRefresh, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkflowCommand::Refresh { reply }).await?;
        rx.await.map_err(|_| SchedulerError::QueueClosed)
    }

    pub fn latest(&self) -> Arc<WorkflowSummary> {
        self.summaries.latest()
    }

    pub fn subscribe(&self) -> Subscription<WorkflowSummary> {
        self.summaries.subscribe()
    }

    async fn send(&self, command: WorkflowCommand) -> Result<(), SchedulerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SchedulerError::QueueClosed)
    }
}

/// The conjunction book lives inside this task alone; callers reach it
/// through the command queue.
pub struct ConjunctionWorkflow {
    handle: WorkflowHandle,
    worker: Option<WorkerHandle<usize>>,
}

struct WorkflowState {
    config: WorkflowConfig,
    book: ConjunctionBook,
    monitor: AlertMonitor,
    summaries: Arc<Publisher<WorkflowSummary>>,
}

impl ConjunctionWorkflow {
    pub fn start(config: &WorkflowConfig, subscriber_queue: usize) -> Self {
        let (commands, rx) = mpsc::channel(config.queue_depth.max(1));
        let summaries = Arc::new(Publisher::new(
            WorkflowSummary::empty(Utc::now()),
            subscriber_queue,
        ));
        let state = WorkflowState {
            config: config.clone(),
            book: ConjunctionBook::new(config),
            monitor: AlertMonitor::new(
                config.fire_after,
                config.clear_after,
                to_chrono(config.retention),
            ),
            summaries: summaries.clone(),
        };
        let worker = WorkerHandle::spawn(move |stop_rx| run_workflow_loop(state, rx, stop_rx));

        Self {
            handle: WorkflowHandle {
                commands,
                summaries,
            },
            worker: Some(worker),
        }
    }

    pub fn handle(&self) -> WorkflowHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stops the task and returns the number of commands it handled.
    pub async fn stop(&mut self) -> Result<usize, SchedulerError> {
        match self.worker.take() {
            Some(worker) => worker.stop().await,
            None => Ok(0),
        }
    }
}

async fn run_workflow_loop(
    mut state: WorkflowState,
    mut commands: mpsc::Receiver<WorkflowCommand>,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<usize, SchedulerError> {
    let mut ticker = interval(state.config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut handled = 0;

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                state.refresh(Utc::now());
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                handled += 1;
                state.handle(command, Utc::now());
            }
        }
    }

    log::info!("Conjunction workflow stopped after {} commands", handled);
    Ok(handled)
}

impl WorkflowState {
    fn handle(&mut self, command: WorkflowCommand, now: DateTime<Utc>) {
        match command {
            WorkflowCommand::Ingest { messages, reply } => {
                let summary = self.ingest(messages, now);
                if let Some(reply) = reply {
                    let _ = reply.send(summary);
                }
            }
            WorkflowCommand::Summary { reply } => {
                let _ = reply.send(self.book.summary(now));
            }
            WorkflowCommand::Refresh { reply } => {
                let _ = reply.send(self.refresh(now));
            }
        }
    }

    fn ingest(&mut self, messages: Vec<ConjunctionMessage>, now: DateTime<Utc>) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for message in messages {
            let message_id = message.message_id.clone();
            match self.book.ingest(message, now) {
                Ok(IngestOutcome::Created) => summary.created += 1,
                Ok(IngestOutcome::Superseded) => summary.superseded += 1,
                Ok(IngestOutcome::Outdated) => summary.outdated += 1,
                Ok(IngestOutcome::Duplicate) => summary.duplicate += 1,
                Err(e) => {
                    log::warn!("Rejected conjunction message {}: {}", message_id, e);
                    summary.rejected.push(RejectedMessage {
                        message_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        log::debug!(
            "Conjunction batch: {} new, {} superseded, {} outdated, {} duplicate, {} rejected",
            summary.created,
            summary.superseded,
            summary.outdated,
            summary.duplicate,
            summary.rejected.len()
        );
        summary
    }

    fn refresh(&mut self, now: DateTime<Utc>) -> WorkflowRefresh {
        let pruned = self.book.prune(now);
        let window = to_chrono(self.config.tca_window);
        let alerts = self.monitor.observe(
            self.book.events().filter(|event| event.is_live(now)),
            self.book.thresholds(),
            window,
            now,
        );
        let summary = self.book.summary(now);
        log::debug!(
            "Workflow status {} ({} live, {} mitigate, {} assess)",
            summary.status,
            summary.live,
            summary.counts.mitigate,
            summary.counts.assess
        );
        self.summaries.publish(Arc::new(summary.clone()));
        WorkflowRefresh {
            pruned,
            summary,
            alerts,
        }
    }
}
