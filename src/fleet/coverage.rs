use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::propagate::frames::round2;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageBand {
    pub name: String,
    pub min_latitude_deg: f64,
    pub max_latitude_deg: f64,
    /// Member count that scores 100.
    pub target: usize,
}

impl CoverageBand {
    fn new(name: &str, min_latitude_deg: f64, max_latitude_deg: f64, target: usize) -> Self {
        Self {
            name: name.to_string(),
            min_latitude_deg,
            max_latitude_deg,
            target,
        }
    }

    /// Half-open in latitude, except that the band reaching the north pole
    /// includes it.
    pub fn contains(&self, latitude_deg: f64) -> bool {
        latitude_deg >= self.min_latitude_deg
            && (latitude_deg < self.max_latitude_deg
                || (self.max_latitude_deg >= 90.0 && latitude_deg <= 90.0))
    }
}

pub fn default_coverage_bands() -> Vec<CoverageBand> {
    vec![
        CoverageBand::new("polar_north", 60.0, 90.0, 500),
        CoverageBand::new("mid_north", 30.0, 60.0, 1500),
        CoverageBand::new("tropical_north", 0.0, 30.0, 1500),
        CoverageBand::new("tropical_south", -30.0, 0.0, 1500),
        CoverageBand::new("mid_south", -60.0, -30.0, 1000),
        CoverageBand::new("polar_south", -90.0, -60.0, 300),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageRating {
    Optimal,
    Adequate,
    NeedsAttention,
}

impl CoverageRating {
    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            CoverageRating::Optimal
        } else if score >= 70.0 {
            CoverageRating::Adequate
        } else {
            CoverageRating::NeedsAttention
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionCoverage {
    pub region: String,
    pub latitude_range: [f64; 2],
    pub count: usize,
    pub target: usize,
    pub score: f64,
    pub rating: CoverageRating,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub epoch: DateTime<Utc>,
    pub total: usize,
    pub global_score: f64,
    pub regions: Vec<RegionCoverage>,
    /// Regions rated NEEDS_ATTENTION.
    pub needs_attention: Vec<String>,
}

/// Counts snapshot members per latitude band. Each member lands in the first
/// band containing it.
pub fn coverage(snapshot: &Snapshot, bands: &[CoverageBand]) -> CoverageReport {
    let mut counts = vec![0usize; bands.len()];
    for state in snapshot.states() {
        if let Some(index) = bands.iter().position(|b| b.contains(state.latitude_deg)) {
            counts[index] += 1;
        }
    }

    let regions: Vec<RegionCoverage> = bands
        .iter()
        .zip(&counts)
        .map(|(band, &count)| {
            let score = if band.target == 0 {
                100.0
            } else {
                (count as f64 / band.target as f64 * 100.0).min(100.0)
            };
            RegionCoverage {
                region: band.name.clone(),
                latitude_range: [band.min_latitude_deg, band.max_latitude_deg],
                count,
                target: band.target,
                score: round2(score),
                rating: CoverageRating::for_score(score),
            }
        })
        .collect();

    let global_score = if regions.is_empty() {
        0.0
    } else {
        regions.iter().map(|r| r.score).sum::<f64>() / regions.len() as f64
    };

    CoverageReport {
        epoch: snapshot.epoch,
        total: snapshot.len(),
        global_score: round2(global_score),
        needs_attention: regions
            .iter()
            .filter(|r| r.rating == CoverageRating::NeedsAttention)
            .map(|r| r.region.clone())
            .collect(),
        regions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FeedState, Freshness};
    use crate::propagate::StateVector;
    use crate::snapshot::{FailureCounts, SnapshotEntry};

    fn snapshot_with_latitudes(latitudes: &[f64]) -> Snapshot {
        let entries = latitudes
            .iter()
            .enumerate()
            .map(|(k, &lat)| {
                let mut state = StateVector::from_teme(
                    &format!("obj-{k:04}"),
                    Utc::now(),
                    [6928.0, 0.0, 0.0],
                    [0.0, 7.6, 0.0],
                );
                state.latitude_deg = lat;
                SnapshotEntry {
                    state,
                    freshness: Freshness::Fresh,
                }
            })
            .collect();
        Snapshot {
            version: 1,
            epoch: Utc::now(),
            feed: FeedState::Live,
            entries,
            failures: FailureCounts::default(),
        }
    }

    #[test]
    fn scores_are_capped_and_rated() {
        let bands = vec![
            CoverageBand::new("north", 0.0, 90.0, 4),
            CoverageBand::new("south", -90.0, 0.0, 10),
        ];
        let snapshot = snapshot_with_latitudes(&[10.0, 20.0, 45.0, 90.0, 60.0, -10.0, -80.0]);
        let report = coverage(&snapshot, &bands);

        assert_eq!(report.regions[0].count, 5);
        assert_eq!(report.regions[0].score, 100.0);
        assert_eq!(report.regions[0].rating, CoverageRating::Optimal);
        assert_eq!(report.regions[1].count, 2);
        assert_eq!(report.regions[1].score, 20.0);
        assert_eq!(report.needs_attention, vec!["south".to_string()]);
        assert_eq!(report.global_score, 60.0);
    }

    #[test]
    fn rating_boundaries() {
        assert_eq!(CoverageRating::for_score(90.0), CoverageRating::Optimal);
        assert_eq!(CoverageRating::for_score(70.0), CoverageRating::Adequate);
        assert_eq!(CoverageRating::for_score(69.9), CoverageRating::NeedsAttention);
    }

    #[test]
    fn equator_belongs_to_the_northern_band() {
        let bands = default_coverage_bands();
        assert!(bands[2].contains(0.0));
        assert!(!bands[3].contains(0.0));
        assert!(bands[0].contains(90.0));
    }
}
