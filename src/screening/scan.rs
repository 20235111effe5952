use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use super::grid::ScreeningGrid;
use crate::config::ScreeningConfig;
use crate::propagate::StateVector;
use crate::risk::{RiskAssessment, RiskScorer};
use crate::snapshot::Snapshot;

/// Below this many objects the exhaustive scan is cheaper than building a grid.
pub const EXHAUSTIVE_LIMIT: usize = 64;

/// Unordered object pair, stored with the lexicographically smaller id first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PairKey {
    pub primary: String,
    pub secondary: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (primary, secondary) = if a <= b { (a, b) } else { (b, a) };
        Self {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.primary == id || self.secondary == id
    }

    pub fn other(&self, id: &str) -> Option<&str> {
        if self.primary == id {
            Some(&self.secondary)
        } else if self.secondary == id {
            Some(&self.primary)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.primary, self.secondary)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseApproach {
    pub pair: PairKey,
    pub tca: DateTime<Utc>,
    pub distance_km: f64,
    pub closing_speed_km_s: f64,
    pub risk: RiskAssessment,
}

impl CloseApproach {
    pub fn between(a: &StateVector, b: &StateVector, scorer: &RiskScorer) -> Self {
        let distance_km = a.distance_km(b);
        let closing_speed_km_s = a.closing_speed_km_s(b);
        Self {
            pair: PairKey::new(&a.object_id, &b.object_id),
            tca: a.epoch,
            distance_km,
            closing_speed_km_s,
            risk: scorer.score_geometry(distance_km, closing_speed_km_s),
        }
    }
}

/// Distance, then TCA, then pair ids.
pub fn sort_approaches(approaches: &mut [CloseApproach]) {
    approaches.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.tca.cmp(&b.tca))
            .then_with(|| a.pair.cmp(&b.pair))
    });
}

#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub threshold_km: f64,
    pub tolerance_km: f64,
    pub cell_deg: f64,
}

impl From<&ScreeningConfig> for ScanSettings {
    fn from(config: &ScreeningConfig) -> Self {
        Self {
            threshold_km: config.alert_threshold_km,
            tolerance_km: config.altitude_tolerance_km,
            cell_deg: config.cell_deg,
        }
    }
}

/// All pairs in the snapshot at or below the threshold, ordered.
pub fn scan_snapshot(
    snapshot: &Snapshot,
    settings: &ScanSettings,
    scorer: &RiskScorer,
) -> Vec<CloseApproach> {
    if snapshot.len() <= EXHAUSTIVE_LIMIT {
        scan_exhaustive(snapshot, settings.threshold_km, scorer)
    } else {
        scan_partitioned(snapshot, settings, scorer)
    }
}

pub fn scan_exhaustive(
    snapshot: &Snapshot,
    threshold_km: f64,
    scorer: &RiskScorer,
) -> Vec<CloseApproach> {
    let states: Vec<&StateVector> = snapshot.states().collect();
    let mut approaches: Vec<CloseApproach> = (0..states.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let a = states[i];
            states[i + 1..]
                .iter()
                .filter(move |b| a.distance_km(b) <= threshold_km)
                .map(move |b| CloseApproach::between(a, b, scorer))
                .collect::<Vec<_>>()
        })
        .collect();
    sort_approaches(&mut approaches);
    approaches
}

pub fn scan_partitioned(
    snapshot: &Snapshot,
    settings: &ScanSettings,
    scorer: &RiskScorer,
) -> Vec<CloseApproach> {
    let states: Vec<&StateVector> = snapshot.states().collect();
    let points: Vec<[f64; 3]> = states.iter().map(|s| s.position_km).collect();
    let grid = ScreeningGrid::build(
        &points,
        settings.threshold_km,
        settings.tolerance_km,
        settings.cell_deg,
    );
    log::debug!(
        "Screening {} objects across {} occupied cells",
        states.len(),
        grid.occupied_cells()
    );

    let mut approaches: Vec<CloseApproach> = (0..states.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let mut candidates = Vec::new();
            grid.candidates(i, &mut candidates);
            let a = states[i];
            candidates
                .into_iter()
                .filter(|&j| a.distance_km(states[j]) <= settings.threshold_km)
                .map(|j| CloseApproach::between(a, states[j], scorer))
                .collect::<Vec<_>>()
        })
        .collect();
    sort_approaches(&mut approaches);
    approaches
}

/// Orders risk figures by score; used to pick the peak of a group.
pub fn compare_risk(a: &RiskAssessment, b: &RiskAssessment) -> Ordering {
    a.score.total_cmp(&b.score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FeedState, Freshness};
    use crate::snapshot::{FailureCounts, SnapshotEntry};

    /// Deterministic pseudo-random generator for synthetic catalogs.
    struct Lcg(u64);

    impl Lcg {
        fn next_f64(&mut self) -> f64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    fn state(id: String, position_km: [f64; 3], velocity_km_s: [f64; 3], epoch: DateTime<Utc>) -> StateVector {
        StateVector {
            object_id: id,
            epoch,
            position_km,
            velocity_km_s,
            position_ecef_km: position_km,
            latitude_deg: 0.0,
            longitude_deg: 0.0,
            altitude_km: crate::propagate::frames::norm(position_km) - 6378.137,
            speed_km_s: crate::propagate::frames::norm(velocity_km_s),
        }
    }

    fn snapshot_of(mut states: Vec<StateVector>, epoch: DateTime<Utc>) -> Snapshot {
        states.sort_by(|a, b| a.object_id.cmp(&b.object_id));
        Snapshot {
            version: 1,
            epoch,
            feed: FeedState::Live,
            entries: states
                .into_iter()
                .map(|state| SnapshotEntry {
                    state,
                    freshness: Freshness::Fresh,
                })
                .collect(),
            failures: FailureCounts::default(),
        }
    }

    /// Objects clustered in a few shells and a polar cap, so many pairs fall
    /// near the threshold and near the poles and the date line.
    fn synthetic(count: usize, seed: u64) -> Snapshot {
        let epoch = Utc::now();
        let mut rng = Lcg(seed);
        let mut states = Vec::with_capacity(count);
        for i in 0..count {
            let radius = 6378.137 + [400.0, 550.0, 551.0, 800.0][i % 4] + rng.next_f64() * 30.0;
            let lat = if i % 5 == 0 {
                85.0 + rng.next_f64() * 5.0
            } else {
                -60.0 + rng.next_f64() * 120.0
            };
            let lon = if i % 7 == 0 {
                179.0 + rng.next_f64() * 2.0
            } else {
                rng.next_f64() * 360.0 - 180.0
            };
            let (lat, lon) = (f64::to_radians(lat), f64::to_radians(lon));
            let position = [
                radius * lat.cos() * lon.cos(),
                radius * lat.cos() * lon.sin(),
                radius * lat.sin(),
            ];
            let velocity = [rng.next_f64() * 7.0, rng.next_f64() * 7.0, rng.next_f64()];
            states.push(state(format!("obj-{:04}", i), position, velocity, epoch));
        }
        snapshot_of(states, epoch)
    }

    fn keys(approaches: &[CloseApproach]) -> Vec<(PairKey, u64)> {
        approaches
            .iter()
            .map(|a| (a.pair.clone(), a.distance_km.to_bits()))
            .collect()
    }

    #[test]
    fn partitioned_scan_equals_exhaustive() {
        let scorer = RiskScorer::default();
        for (count, seed, threshold) in [(500, 7, 150.0), (500, 11, 40.0), (300, 3, 400.0)] {
            let snapshot = synthetic(count, seed);
            let settings = ScanSettings {
                threshold_km: threshold,
                tolerance_km: 25.0,
                cell_deg: 2.0,
            };
            let exhaustive = scan_exhaustive(&snapshot, threshold, &scorer);
            let partitioned = scan_partitioned(&snapshot, &settings, &scorer);
            if threshold >= 150.0 {
                assert!(!exhaustive.is_empty());
            }
            assert_eq!(keys(&exhaustive), keys(&partitioned));
        }
    }

    #[test]
    fn ties_break_by_tca_then_pair() {
        let epoch = Utc::now();
        let scorer = RiskScorer::default();
        let a = state("c".into(), [7000.0, 0.0, 0.0], [0.0, 7.5, 0.0], epoch);
        let b = state("a".into(), [7010.0, 0.0, 0.0], [0.0, 7.5, 0.0], epoch);
        let c = state("b".into(), [7000.0, 10.0, 0.0], [0.0, 7.5, 0.0], epoch);
        let mut approaches = vec![
            CloseApproach::between(&a, &c, &scorer),
            CloseApproach::between(&a, &b, &scorer),
        ];
        sort_approaches(&mut approaches);
        assert_eq!(approaches[0].pair, PairKey::new("a", "c"));
        assert_eq!(approaches[1].pair, PairKey::new("b", "c"));
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(PairKey::new("b", "a"), PairKey::new("a", "b"));
        assert_eq!(PairKey::new("b", "a").primary, "a");
        assert_eq!(PairKey::new("a", "b").other("a"), Some("b"));
        assert_eq!(PairKey::new("a", "b").to_string(), "a|b");
    }
}
