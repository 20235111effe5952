use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};

use super::engine::Engine;
use super::error::SchedulerError;
use super::worker::WorkerHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub health_refreshes: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct LoopCounts {
    runs: u64,
    failed: u64,
}

type Job = Arc<dyn Fn(&Engine, DateTime<Utc>) + Send + Sync>;

/// Drives snapshot builds at the configured cadence and fleet health on its
/// own slower cadence. Each runs in its own task, so a slow health pass
/// never delays a snapshot. Ticks that fall behind are skipped, never
/// queued.
pub struct TickScheduler {
    engine: Arc<Engine>,
    refresh_health: Job,
    ticks: Option<WorkerHandle<LoopCounts>>,
    health: Option<WorkerHandle<LoopCounts>>,
}

impl TickScheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            refresh_health: Arc::new(|engine: &Engine, now: DateTime<Utc>| {
                engine.refresh_health(now);
            }),
            ticks: None,
            health: None,
        }
    }

    /// Replaces the fleet health pass run on the health cadence.
    #[cfg(test)]
    pub(crate) fn with_health_refresh(
        mut self,
        refresh: impl Fn(&Engine, DateTime<Utc>) + Send + Sync + 'static,
    ) -> Self {
        self.refresh_health = Arc::new(refresh);
        self
    }

    pub fn is_running(&self) -> bool {
        self.ticks.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.ticks.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        let config = &self.engine.config().engine;

        let engine = self.engine.clone();
        let tick: Job = Arc::new(|engine: &Engine, now: DateTime<Utc>| {
            engine.tick(now);
        });
        let period = config.tick_interval;
        self.ticks = Some(WorkerHandle::spawn(move |stop_rx| {
            run_periodic("snapshot tick", engine, period, tick, stop_rx)
        }));

        let engine = self.engine.clone();
        let refresh = self.refresh_health.clone();
        let period = config.health_interval;
        self.health = Some(WorkerHandle::spawn(move |stop_rx| {
            run_periodic("fleet health refresh", engine, period, refresh, stop_rx)
        }));

        log::info!(
            "Tick scheduler started ({:?} cadence, health every {:?})",
            config.tick_interval,
            config.health_interval
        );
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<TickStats, SchedulerError> {
        let mut stats = TickStats::default();
        if let Some(worker) = self.health.take() {
            stats.health_refreshes = worker.stop().await?.runs;
        }
        if let Some(worker) = self.ticks.take() {
            let counts = worker.stop().await?;
            stats.ticks = counts.runs;
            stats.failed_ticks = counts.failed;
        }
        if stats.ticks > 0 {
            log::info!(
                "Tick scheduler stopped after {} ticks ({} failed), {} health refreshes",
                stats.ticks,
                stats.failed_ticks,
                stats.health_refreshes
            );
        }
        Ok(stats)
    }
}

/// Runs `job` on the blocking pool every `period` until stopped.
async fn run_periodic(
    name: &'static str,
    engine: Arc<Engine>,
    period: Duration,
    job: Job,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<LoopCounts, SchedulerError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut counts = LoopCounts::default();

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let engine = engine.clone();
                let job = job.clone();
                match tokio::task::spawn_blocking(move || job(&engine, Utc::now())).await {
                    Ok(()) => counts.runs += 1,
                    Err(e) => {
                        counts.failed += 1;
                        log::error!("{} failed: {}", name, e);
                    }
                }
            }
        }
    }

    log::debug!("{} loop stopped after {} runs", name, counts.runs);
    Ok(counts)
}
