use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use super::types::{FailureCounts, Snapshot, SnapshotEntry, Trajectory, TrajectoryPoint};
use crate::catalog::{CatalogView, FreshnessPolicy, Lifecycle, TrackedObject};
use crate::config::{to_chrono, Config};
use crate::error::EngineError;
use crate::propagate::{PropagateError, Propagation, Propagator};

#[derive(Debug, Clone, Copy)]
pub struct TrajectoryLimits {
    pub max_horizon: Duration,
    pub min_step: Duration,
    pub max_samples: usize,
}

impl Default for TrajectoryLimits {
    fn default() -> Self {
        Self {
            max_horizon: Duration::days(7),
            min_step: Duration::seconds(10),
            max_samples: 20_000,
        }
    }
}

/// Output of one catalog build. Newly decayed objects are reported so the
/// caller can retire them in the store.
#[derive(Debug)]
pub struct CatalogBuild {
    pub snapshot: Snapshot,
    pub newly_decayed: Vec<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    propagator: Propagator,
    freshness: FreshnessPolicy,
    feed_max_silence: Duration,
    limits: TrajectoryLimits,
}

impl SnapshotBuilder {
    pub fn new(
        propagator: Propagator,
        freshness: FreshnessPolicy,
        feed_max_silence: Duration,
        limits: TrajectoryLimits,
    ) -> Self {
        Self {
            propagator,
            freshness,
            feed_max_silence,
            limits,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Propagator::new(config.elements.limits(), config.elements.decay_floor_km),
            config.elements.freshness(),
            to_chrono(config.engine.feed_max_silence),
            TrajectoryLimits {
                max_horizon: to_chrono(config.trajectory.max_horizon),
                min_step: to_chrono(config.trajectory.min_step),
                max_samples: config.trajectory.max_samples,
            },
        )
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    pub fn freshness(&self) -> &FreshnessPolicy {
        &self.freshness
    }

    /// Propagates every active object to `epoch`. Failures are counted and skipped.
    pub fn build(
        &self,
        catalog: &CatalogView,
        epoch: DateTime<Utc>,
        version: u64,
        now: DateTime<Utc>,
    ) -> CatalogBuild {
        let active = catalog.active();
        let results = self.propagator.propagate_all(&active, epoch);

        let mut failures = FailureCounts {
            retired: catalog.len() - active.len(),
            ..FailureCounts::default()
        };
        let mut entries = Vec::with_capacity(active.len());
        let mut newly_decayed = Vec::new();

        for (object, result) in active.iter().zip(results) {
            match result {
                Ok(Propagation::State(state)) => entries.push(SnapshotEntry {
                    state,
                    freshness: self.freshness.classify(object.refreshed_at, now),
                }),
                Ok(Propagation::Decayed { altitude_km, .. }) => {
                    failures.decayed += 1;
                    newly_decayed.push((object.id.clone(), altitude_km));
                }
                Err(PropagateError::Data(e)) => {
                    failures.data_errors += 1;
                    log::debug!("Skipping {} at {}: {}", object.id, epoch, e);
                }
                Err(PropagateError::Numerical(e)) => {
                    failures.propagation_errors += 1;
                    log::warn!("Propagation failed for {} at {}: {}", object.id, epoch, e);
                }
            }
        }

        CatalogBuild {
            snapshot: Snapshot {
                version,
                epoch,
                feed: catalog.feed_state(now, self.feed_max_silence),
                entries,
                failures,
            },
            newly_decayed,
        }
    }

    pub fn check_window(&self, horizon: Duration, step: Duration) -> Result<usize, EngineError> {
        if step < self.limits.min_step || step <= Duration::zero() {
            return Err(EngineError::Rejected(format!(
                "step must be at least {}s",
                self.limits.min_step.num_seconds()
            )));
        }
        if horizon <= Duration::zero() || horizon > self.limits.max_horizon {
            return Err(EngineError::Rejected(format!(
                "horizon must be within (0, {}h]",
                self.limits.max_horizon.num_hours()
            )));
        }
        let step_ms = step.num_milliseconds();
        let count = ((horizon.num_milliseconds() + step_ms - 1) / step_ms) as usize;
        if count > self.limits.max_samples {
            return Err(EngineError::Rejected(format!(
                "{} samples exceeds the limit of {}",
                count, self.limits.max_samples
            )));
        }
        Ok(count)
    }

    /// Samples one object over `[start, start + horizon)` at `step`.
    pub fn trajectory(
        &self,
        object: &TrackedObject,
        start: DateTime<Utc>,
        horizon: Duration,
        step: Duration,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Trajectory, EngineError> {
        if let Lifecycle::Decayed { altitude_km, .. } = object.lifecycle {
            return Err(EngineError::Decayed {
                id: object.id.clone(),
                altitude_km,
            });
        }
        let count = self.check_window(horizon, step)?;

        let mut samples = Vec::with_capacity(count);
        let mut decayed_at = None;
        for k in 0..count {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let epoch = start + step * k as i32;
            match self.propagator.propagate(&object.id, &object.elements, epoch)? {
                Propagation::State(state) => samples.push(state),
                Propagation::Decayed { altitude_km, .. } => {
                    if k == 0 {
                        return Err(EngineError::Decayed {
                            id: object.id.clone(),
                            altitude_km,
                        });
                    }
                    decayed_at = Some(epoch);
                    break;
                }
            }
        }

        Ok(Trajectory {
            object_id: object.id.clone(),
            start,
            step_seconds: step.num_milliseconds() as f64 / 1000.0,
            freshness: self.freshness.classify(object.refreshed_at, now),
            points: samples.iter().map(TrajectoryPoint::from).collect(),
            decayed_at,
            samples,
        })
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use crate::catalog::{ElementRecord, ElementSource, ElementStore, Freshness};

    fn catalog_at(now: DateTime<Utc>) -> ElementStore {
        let store = ElementStore::new();
        let mut low = leo_set(3, now, 0.0);
        low.mean_motion_rev_day = 16.9;
        let records = vec![
            ElementRecord {
                id: "sat-a".into(),
                name: "SAT-A".into(),
                tag: String::new(),
                elements: ElementSource::Mean(leo_set(1, now, 0.0)),
            },
            ElementRecord {
                id: "sat-b".into(),
                name: "SAT-B".into(),
                tag: String::new(),
                elements: ElementSource::Mean(leo_set(2, now, 90.0)),
            },
            ElementRecord {
                id: "sat-low".into(),
                name: "SAT-LOW".into(),
                tag: String::new(),
                elements: ElementSource::Mean(low),
            },
        ];
        store.ingest(records, now);
        store
    }

    #[test]
    fn build_skips_and_counts_decayed() {
        let now = Utc::now();
        let store = catalog_at(now);
        let build = SnapshotBuilder::default().build(&store.view(), now, 7, now);

        assert_eq!(build.snapshot.version, 7);
        assert_eq!(build.snapshot.len(), 2);
        assert_eq!(build.snapshot.failures.decayed, 1);
        assert_eq!(build.newly_decayed.len(), 1);
        assert_eq!(build.newly_decayed[0].0, "sat-low");
        assert!(build.snapshot.get("sat-a").is_some());
        assert!(build.snapshot.get("sat-low").is_none());
        assert_eq!(build.snapshot.get("sat-b").unwrap().freshness, Freshness::Fresh);

        store.retire("sat-low", build.newly_decayed[0].1, now);
        let rebuilt = SnapshotBuilder::default().build(&store.view(), now, 8, now);
        assert_eq!(rebuilt.snapshot.failures.retired, 1);
        assert_eq!(rebuilt.snapshot.failures.decayed, 0);
    }

    #[test]
    fn trajectory_is_half_open() {
        let now = Utc::now();
        let store = catalog_at(now);
        let view = store.view();
        let object = view.get("sat-a").unwrap();

        let trajectory = SnapshotBuilder::default()
            .trajectory(
                object,
                now,
                Duration::hours(2),
                Duration::minutes(2),
                now,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(trajectory.points.len(), 60);
        assert_eq!(trajectory.points[0].timestamp, now);
        assert_eq!(trajectory.points[59].timestamp, now + Duration::minutes(118));
        assert!(trajectory.decayed_at.is_none());
    }

    #[test]
    fn trajectory_bounds_are_enforced() {
        let now = Utc::now();
        let store = catalog_at(now);
        let view = store.view();
        let object = view.get("sat-a").unwrap();
        let builder = SnapshotBuilder::default();
        let cancel = CancellationToken::new();

        let too_fine = builder.trajectory(object, now, Duration::hours(1), Duration::seconds(1), now, &cancel);
        assert!(matches!(too_fine, Err(EngineError::Rejected(_))));

        let too_long = builder.trajectory(object, now, Duration::days(8), Duration::minutes(5), now, &cancel);
        assert!(matches!(too_long, Err(EngineError::Rejected(_))));
    }

    #[test]
    fn cancelled_trajectory_returns_nothing() {
        let now = Utc::now();
        let store = catalog_at(now);
        let view = store.view();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = SnapshotBuilder::default().trajectory(
            view.get("sat-a").unwrap(),
            now,
            Duration::hours(1),
            Duration::minutes(1),
            now,
            &cancel,
        );
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
