use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogView, ElementRecord, ElementStore, IngestReport, Lifecycle, TrackedObject};
use crate::config::{to_chrono, Config};
use crate::error::EngineError;
use crate::fleet::{coverage, CoverageReport, FleetAggregator, FleetHealthSnapshot, ManeuverPlan};
use crate::ground::{
    eclipse_windows, link_budget, predict_passes, visibility, visible_stations, EclipseWindow,
    GroundStation, LinkBudget, LowPrecisionSun, Pass, SunEphemeris, VisibilityResult,
};
use crate::propagate::{Propagation, StateVector};
use crate::risk::RiskScorer;
use crate::screening::{
    altitude_distribution, density_at, hotspots, scan_snapshot, screen_neighbors, AltitudeBand,
    CloseApproach, DensityReport, Hotspot, NeighborQuery, ScanSettings,
};
use crate::snapshot::{
    History, ObjectDetail, PublishReport, Publisher, Snapshot, SnapshotBuilder, SnapshotEntry,
    Subscription, Trajectory,
};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickReport {
    pub version: u64,
    pub objects: usize,
    pub decayed: usize,
    pub skipped: usize,
    #[serde(skip)]
    pub published: PublishReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectRisk {
    pub object_id: String,
    pub start: DateTime<Utc>,
    pub horizon_hours: f64,
    pub threshold_km: f64,
    pub approaches: Vec<CloseApproach>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EclipseReport {
    pub object_id: String,
    pub start: DateTime<Utc>,
    pub horizon_hours: f64,
    pub step_seconds: f64,
    pub windows: Vec<EclipseWindow>,
    pub total_shadow_seconds: f64,
}

/// Owns the catalog, the published snapshot and the reference data every
/// query reads. Shared as `Arc<Engine>` between the tick scheduler and
/// on-demand callers.
pub struct Engine {
    config: Config,
    store: ElementStore,
    builder: SnapshotBuilder,
    scorer: RiskScorer,
    fleet: FleetAggregator,
    sun: Box<dyn SunEphemeris>,
    snapshots: Publisher<Snapshot>,
    health: Publisher<FleetHealthSnapshot>,
    history: Mutex<History>,
    version: AtomicU64,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self::with_sun(config, Box::new(LowPrecisionSun))
    }

    pub fn with_sun(config: Config, sun: Box<dyn SunEphemeris>) -> Self {
        Self {
            builder: SnapshotBuilder::from_config(&config),
            scorer: RiskScorer::new(config.risk.clone()),
            fleet: FleetAggregator::new(&config.fleet),
            sun,
            snapshots: Publisher::new(Snapshot::empty(), config.engine.subscriber_queue),
            health: Publisher::new(
                FleetHealthSnapshot::empty(Utc::now()),
                config.engine.subscriber_queue,
            ),
            history: Mutex::new(History::new(config.engine.history_len)),
            store: ElementStore::new(),
            version: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn catalog(&self) -> CatalogView {
        self.store.view()
    }

    pub fn ingest(&self, records: Vec<ElementRecord>, now: DateTime<Utc>) -> IngestReport {
        self.store.ingest(records, now)
    }

    /// Builds and publishes the snapshot for `now`. Objects found decayed are
    /// retired in the store.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        let build = self.builder.build(&self.store.view(), now, version, now);

        for (id, altitude_km) in &build.newly_decayed {
            if self.store.retire(id, *altitude_km, now) {
                log::info!("{} decayed at {:.1} km, retired", id, altitude_km);
            }
        }

        let snapshot = Arc::new(build.snapshot);
        let stride = u64::from(self.config.engine.history_stride.max(1));
        if (version - 1) % stride == 0 {
            let view = self.store.view();
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.record(&snapshot);
            history.prune(|id| view.get(id).is_some_and(|object| object.is_active()));
        }

        let failures = snapshot.failures;
        let report = TickReport {
            version,
            objects: snapshot.len(),
            decayed: build.newly_decayed.len(),
            skipped: failures.data_errors + failures.propagation_errors,
            published: self.snapshots.publish(snapshot),
        };
        log::debug!(
            "Tick {}: {} objects, {} decayed, {} skipped, {} delivered, {} dropped",
            report.version,
            report.objects,
            report.decayed,
            report.skipped,
            report.published.delivered,
            report.published.dropped
        );
        report
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.latest()
    }

    pub fn subscribe(&self) -> Subscription<Snapshot> {
        self.snapshots.subscribe()
    }

    pub fn watch(&self) -> tokio::sync::watch::Receiver<Arc<Snapshot>> {
        self.snapshots.watch()
    }

    pub fn dropped_updates(&self) -> u64 {
        self.snapshots.dropped_total()
    }

    /// Aggregates the latest snapshot and publishes the result.
    pub fn refresh_health(&self, now: DateTime<Utc>) -> Arc<FleetHealthSnapshot> {
        let snapshot = self.snapshot();
        // Aggregate a copy so ticks can keep recording meanwhile.
        let history = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let health = Arc::new(
            self.fleet
                .aggregate(&snapshot, &self.store.view(), &history, now),
        );
        self.health.publish(health.clone());
        health
    }

    pub fn health(&self) -> Arc<FleetHealthSnapshot> {
        self.health.latest()
    }

    pub fn subscribe_health(&self) -> Subscription<FleetHealthSnapshot> {
        self.health.subscribe()
    }

    pub fn coverage(&self) -> CoverageReport {
        coverage(&self.snapshot(), &self.config.fleet.coverage)
    }

    pub fn station(&self, name: &str) -> Result<&GroundStation, EngineError> {
        self.config
            .stations
            .iter()
            .find(|station| station.name == name)
            .ok_or_else(|| EngineError::not_found("station", name))
    }

    /// An active object. Retired objects report `Decayed`.
    pub fn object(&self, id: &str) -> Result<Arc<TrackedObject>, EngineError> {
        let view = self.store.view();
        let object = view
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("object", id))?;
        if let Lifecycle::Decayed { altitude_km, .. } = object.lifecycle {
            return Err(EngineError::Decayed {
                id: id.to_string(),
                altitude_km,
            });
        }
        Ok(object)
    }

    pub fn state_at(
        &self,
        object: &TrackedObject,
        epoch: DateTime<Utc>,
    ) -> Result<StateVector, EngineError> {
        match self
            .builder
            .propagator()
            .propagate(&object.id, &object.elements, epoch)?
        {
            Propagation::State(state) => Ok(state),
            Propagation::Decayed { altitude_km, .. } => Err(EngineError::Decayed {
                id: object.id.clone(),
                altitude_km,
            }),
        }
    }

    /// Detail from the published snapshot, or propagated to `now` when the
    /// object is not in it yet.
    pub fn detail(&self, id: &str, now: DateTime<Utc>) -> Result<ObjectDetail, EngineError> {
        let object = self.object(id)?;
        let snapshot = self.snapshot();
        if let Some(entry) = snapshot.get(id) {
            return Ok(ObjectDetail::new(&object, entry));
        }
        let entry = SnapshotEntry {
            state: self.state_at(&object, now)?,
            freshness: self.builder.freshness().classify(object.refreshed_at, now),
        };
        Ok(ObjectDetail::new(&object, &entry))
    }

    /// Pairs in the latest snapshot at or below the alert threshold.
    pub fn alerts(&self) -> Vec<CloseApproach> {
        scan_snapshot(
            &self.snapshot(),
            &ScanSettings::from(&self.config.screening),
            &self.scorer,
        )
    }

    pub fn hotspots(&self) -> Vec<Hotspot> {
        let snapshot = self.snapshot();
        let approaches = scan_snapshot(
            &snapshot,
            &ScanSettings::from(&self.config.screening),
            &self.scorer,
        );
        hotspots(&snapshot, &approaches, &self.config.screening)
    }

    pub fn density(&self, altitude_km: f64, tolerance_km: f64) -> DensityReport {
        let snapshot = self.snapshot();
        let approaches = scan_snapshot(
            &snapshot,
            &ScanSettings::from(&self.config.screening),
            &self.scorer,
        );
        density_at(&snapshot, &approaches, altitude_km, tolerance_km)
    }

    pub fn distribution(&self) -> Vec<AltitudeBand> {
        altitude_distribution(&self.snapshot())
    }

    /// Runs `query` on the blocking pool under the configured deadline. On
    /// timeout the query is cancelled and nothing it produced is returned.
    pub async fn run_query<T, F>(self: &Arc<Self>, query: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine, &CancellationToken) -> Result<T, EngineError> + Send + 'static,
    {
        let deadline = self.config.engine.query_timeout;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = self.clone();
        let task = tokio::task::spawn_blocking(move || query(engine.as_ref(), &token));

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(EngineError::Worker(e.to_string())),
            Err(_) => {
                cancel.cancel();
                log::warn!("Query abandoned after {:?}", deadline);
                Err(EngineError::ComputationTimeout(deadline))
            }
        }
    }

    pub async fn trajectory(
        self: &Arc<Self>,
        id: &str,
        start: DateTime<Utc>,
        horizon: Option<Duration>,
        step: Option<Duration>,
    ) -> Result<Trajectory, EngineError> {
        let id = id.to_string();
        let horizon = horizon.unwrap_or(to_chrono(self.config.trajectory.default_horizon));
        let step = step.unwrap_or(to_chrono(self.config.trajectory.default_step));
        self.run_query(move |engine, cancel| {
            let object = engine.object(&id)?;
            engine
                .builder
                .trajectory(&object, start, horizon, step, Utc::now(), cancel)
        })
        .await
    }

    /// Objects coming within `threshold_km` of `id` over the horizon.
    pub async fn object_risk(
        self: &Arc<Self>,
        id: &str,
        start: DateTime<Utc>,
        horizon: Option<Duration>,
        threshold_km: Option<f64>,
    ) -> Result<ObjectRisk, EngineError> {
        let id = id.to_string();
        let screening = &self.config.screening;
        let query = NeighborQuery {
            start,
            horizon: horizon.unwrap_or(to_chrono(screening.neighbor_horizon)),
            step: to_chrono(screening.neighbor_step),
            threshold_km: threshold_km.unwrap_or(screening.neighbor_threshold_km),
            tolerance_km: screening.altitude_tolerance_km,
        };
        self.run_query(move |engine, cancel| {
            let target = engine.object(&id)?;
            let others: Vec<Arc<TrackedObject>> = engine
                .store
                .view()
                .active()
                .into_iter()
                .filter(|object| object.id != id)
                .collect();
            let approaches = screen_neighbors(
                &target,
                &others,
                engine.builder.propagator(),
                &query,
                &engine.scorer,
                cancel,
            )?;
            Ok(ObjectRisk {
                object_id: id,
                start,
                horizon_hours: query.horizon.num_seconds() as f64 / 3600.0,
                threshold_km: query.threshold_km,
                approaches,
            })
        })
        .await
    }

    /// Stations that can see the object at `at`, highest first.
    pub async fn visibility(
        self: &Arc<Self>,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<VisibilityResult>, EngineError> {
        let id = id.to_string();
        self.run_query(move |engine, _| {
            let state = engine.state_at(&*engine.object(&id)?, at)?;
            Ok(visible_stations(&engine.config.stations, &state))
        })
        .await
    }

    pub async fn station_visibility(
        self: &Arc<Self>,
        id: &str,
        station: &str,
        at: DateTime<Utc>,
    ) -> Result<VisibilityResult, EngineError> {
        let (id, station) = (id.to_string(), station.to_string());
        self.run_query(move |engine, _| {
            let station = engine.station(&station)?;
            let state = engine.state_at(&*engine.object(&id)?, at)?;
            Ok(visibility(station, &state))
        })
        .await
    }

    pub async fn passes(
        self: &Arc<Self>,
        id: &str,
        station: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_passes: usize,
    ) -> Result<Vec<Pass>, EngineError> {
        let (id, station) = (id.to_string(), station.to_string());
        self.run_query(move |engine, cancel| {
            let station = engine.station(&station)?;
            let object = engine.object(&id)?;
            predict_passes(
                station,
                &object,
                engine.builder.propagator(),
                start,
                end,
                max_passes,
                cancel,
            )
        })
        .await
    }

    pub async fn eclipse(
        self: &Arc<Self>,
        id: &str,
        start: DateTime<Utc>,
        horizon: Option<Duration>,
    ) -> Result<EclipseReport, EngineError> {
        let id = id.to_string();
        let horizon = horizon.unwrap_or(to_chrono(self.config.eclipse.default_horizon));
        let step = to_chrono(self.config.eclipse.step);
        self.run_query(move |engine, cancel| {
            let object = engine.object(&id)?;
            let trajectory = engine
                .builder
                .trajectory(&object, start, horizon, step, Utc::now(), cancel)?;
            let windows = eclipse_windows(&trajectory.samples, engine.sun.as_ref());
            Ok(EclipseReport {
                object_id: id,
                start,
                horizon_hours: horizon.num_seconds() as f64 / 3600.0,
                step_seconds: trajectory.step_seconds,
                total_shadow_seconds: windows.iter().map(|w| w.duration_seconds).sum(),
                windows,
            })
        })
        .await
    }

    pub async fn link_budget(
        self: &Arc<Self>,
        id: &str,
        station: &str,
        band: &str,
        at: DateTime<Utc>,
    ) -> Result<LinkBudget, EngineError> {
        let (id, station, band) = (id.to_string(), station.to_string(), band.to_string());
        self.run_query(move |engine, _| {
            let station = engine.station(&station)?;
            let state = engine.state_at(&*engine.object(&id)?, at)?;
            link_budget(
                station,
                &state,
                &band,
                &engine.config.links.bands,
                &engine.config.links.thresholds,
            )
        })
        .await
    }

    pub async fn maneuver(
        self: &Arc<Self>,
        id: &str,
        target_altitude_km: f64,
        at: DateTime<Utc>,
    ) -> Result<ManeuverPlan, EngineError> {
        let id = id.to_string();
        self.run_query(move |engine, _| {
            let object = engine.object(&id)?;
            let state = engine.state_at(&object, at)?;
            engine
                .config
                .fleet
                .maneuver
                .plan(&state, &object.name, target_altitude_km)
        })
        .await
    }
}
