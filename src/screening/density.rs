use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;

use super::scan::{compare_risk, CloseApproach};
use crate::config::ScreeningConfig;
use crate::risk::RiskAssessment;
use crate::snapshot::Snapshot;

const MEAN_EARTH_RADIUS_KM: f64 = 6371.0;
const SAMPLE_IDS: usize = 5;
const MAX_DENSITY_MEMBERS: usize = 100;

/// Altitude bands reported by [`altitude_distribution`].
const DISTRIBUTION_BANDS: [(f64, f64, &str); 5] = [
    (200.0, 400.0, "LEO-Low"),
    (400.0, 600.0, "LEO-Mid"),
    (600.0, 800.0, "LEO-High"),
    (800.0, 1200.0, "LEO-Upper"),
    (1200.0, 2000.0, "MEO-Low"),
];

#[derive(Debug, Clone, Serialize)]
pub struct Hotspot {
    pub latitude_zone_deg: f64,
    pub altitude_band_km: f64,
    pub count: usize,
    /// A few member ids, in id order.
    pub sample_ids: Vec<String>,
    /// Screened pairs with at least one member in this cell.
    pub close_pairs: usize,
    pub peak_risk: Option<RiskAssessment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DensityMember {
    pub id: String,
    pub altitude_km: f64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub peak_risk: Option<RiskAssessment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DensityReport {
    pub altitude_km: f64,
    pub tolerance_km: f64,
    pub count: usize,
    /// Objects per million square kilometres of the shell at `altitude_km`.
    pub per_million_km2: f64,
    pub peak_risk: Option<RiskAssessment>,
    pub members: Vec<DensityMember>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AltitudeBand {
    pub name: &'static str,
    pub min_km: f64,
    pub max_km: f64,
    pub count: usize,
    pub percentage: f64,
}

/// Highest risk seen by each object across the screened pairs.
fn peak_risk_by_object(approaches: &[CloseApproach]) -> HashMap<&str, RiskAssessment> {
    let mut peaks: HashMap<&str, RiskAssessment> = HashMap::new();
    for approach in approaches {
        for id in [&approach.pair.primary, &approach.pair.secondary] {
            peaks
                .entry(id.as_str())
                .and_modify(|peak| {
                    if compare_risk(&approach.risk, peak).is_gt() {
                        *peak = approach.risk;
                    }
                })
                .or_insert(approach.risk);
        }
    }
    peaks
}

/// Cells of latitude zone by altitude band holding at least
/// `hotspot_min_count` objects, busiest first.
pub fn hotspots(
    snapshot: &Snapshot,
    approaches: &[CloseApproach],
    config: &ScreeningConfig,
) -> Vec<Hotspot> {
    let mut cells: BTreeMap<(i64, i64), Vec<&str>> = BTreeMap::new();
    for state in snapshot.states() {
        let key = (
            (state.latitude_deg / config.hotspot_lat_zone_deg).round() as i64,
            (state.altitude_km / config.hotspot_alt_band_km).round() as i64,
        );
        cells.entry(key).or_default().push(&state.object_id);
    }

    let mut cell_of: HashMap<&str, (i64, i64)> = HashMap::new();
    for (key, members) in &cells {
        for &id in members {
            cell_of.insert(id, *key);
        }
    }

    let mut pairs: HashMap<(i64, i64), (usize, Option<RiskAssessment>)> = HashMap::new();
    for approach in approaches {
        let a = cell_of.get(approach.pair.primary.as_str());
        let b = cell_of.get(approach.pair.secondary.as_str());
        let mut touched = Vec::with_capacity(2);
        touched.extend(a.copied());
        if b != a {
            touched.extend(b.copied());
        }
        for key in touched {
            let slot = pairs.entry(key).or_insert((0, None));
            slot.0 += 1;
            if slot.1.map_or(true, |peak| compare_risk(&approach.risk, &peak).is_gt()) {
                slot.1 = Some(approach.risk);
            }
        }
    }

    let mut spots: Vec<Hotspot> = cells
        .into_iter()
        .filter(|(_, members)| members.len() >= config.hotspot_min_count)
        .map(|(key, members)| {
            let (close_pairs, peak_risk) = pairs.get(&key).copied().unwrap_or((0, None));
            Hotspot {
                latitude_zone_deg: key.0 as f64 * config.hotspot_lat_zone_deg,
                altitude_band_km: key.1 as f64 * config.hotspot_alt_band_km,
                count: members.len(),
                sample_ids: members
                    .iter()
                    .take(SAMPLE_IDS)
                    .map(|id| id.to_string())
                    .collect(),
                close_pairs,
                peak_risk,
            }
        })
        .collect();

    // Stable sort keeps cell order for equal counts.
    spots.sort_by(|a, b| b.count.cmp(&a.count));
    spots.truncate(config.max_hotspots);
    spots
}

/// Objects within `tolerance_km` of `altitude_km`.
pub fn density_at(
    snapshot: &Snapshot,
    approaches: &[CloseApproach],
    altitude_km: f64,
    tolerance_km: f64,
) -> DensityReport {
    let peaks = peak_risk_by_object(approaches);
    let members: Vec<DensityMember> = snapshot
        .states()
        .filter(|state| (state.altitude_km - altitude_km).abs() <= tolerance_km)
        .map(|state| DensityMember {
            id: state.object_id.clone(),
            altitude_km: state.altitude_km,
            latitude_deg: state.latitude_deg,
            longitude_deg: state.longitude_deg,
            peak_risk: peaks.get(state.object_id.as_str()).copied(),
        })
        .collect();

    let radius = MEAN_EARTH_RADIUS_KM + altitude_km;
    let area_million_km2 = 4.0 * PI * radius * radius / 1e6;
    let peak_risk = members
        .iter()
        .filter_map(|member| member.peak_risk)
        .max_by(compare_risk);

    DensityReport {
        altitude_km,
        tolerance_km,
        count: members.len(),
        per_million_km2: members.len() as f64 / area_million_km2,
        peak_risk,
        members: members.into_iter().take(MAX_DENSITY_MEMBERS).collect(),
    }
}

pub fn altitude_distribution(snapshot: &Snapshot) -> Vec<AltitudeBand> {
    let total = snapshot.len();
    DISTRIBUTION_BANDS
        .iter()
        .map(|&(min_km, max_km, name)| {
            let count = snapshot
                .states()
                .filter(|state| state.altitude_km >= min_km && state.altitude_km < max_km)
                .count();
            AltitudeBand {
                name,
                min_km,
                max_km,
                count,
                percentage: if total > 0 {
                    count as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FeedState, Freshness};
    use crate::propagate::StateVector;
    use crate::risk::{RiskScorer, Severity};
    use crate::screening::PairKey;
    use crate::snapshot::{FailureCounts, SnapshotEntry};
    use chrono::Utc;

    fn entry(id: &str, lat: f64, alt: f64) -> SnapshotEntry {
        SnapshotEntry {
            state: StateVector {
                object_id: id.to_string(),
                epoch: Utc::now(),
                position_km: [6378.137 + alt, 0.0, 0.0],
                velocity_km_s: [0.0, 7.5, 0.0],
                position_ecef_km: [6378.137 + alt, 0.0, 0.0],
                latitude_deg: lat,
                longitude_deg: 0.0,
                altitude_km: alt,
                speed_km_s: 7.5,
            },
            freshness: Freshness::Fresh,
        }
    }

    fn snapshot(mut entries: Vec<SnapshotEntry>) -> Snapshot {
        entries.sort_by(|a, b| a.state.object_id.cmp(&b.state.object_id));
        Snapshot {
            version: 1,
            epoch: Utc::now(),
            feed: FeedState::Live,
            entries,
            failures: FailureCounts::default(),
        }
    }

    fn approach(a: &str, b: &str, distance_km: f64) -> CloseApproach {
        CloseApproach {
            pair: PairKey::new(a, b),
            tca: Utc::now(),
            distance_km,
            closing_speed_km_s: 1.0,
            risk: RiskScorer::default().score_geometry(distance_km, 1.0),
        }
    }

    #[test]
    fn hotspots_need_minimum_membership() {
        let mut entries: Vec<SnapshotEntry> = (0..12)
            .map(|i| entry(&format!("dense-{:02}", i), 51.0 + i as f64 * 0.1, 548.0))
            .collect();
        entries.extend((0..3).map(|i| entry(&format!("sparse-{}", i), -20.0, 800.0)));
        let snapshot = snapshot(entries);
        let approaches = vec![approach("dense-00", "dense-01", 0.5)];

        let spots = hotspots(&snapshot, &approaches, &ScreeningConfig::default());
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].count, 12);
        assert_eq!(spots[0].latitude_zone_deg, 50.0);
        assert_eq!(spots[0].altitude_band_km, 550.0);
        assert_eq!(spots[0].sample_ids.len(), 5);
        assert_eq!(spots[0].close_pairs, 1);
        assert_eq!(spots[0].peak_risk.map(|r| r.severity), Some(Severity::High));
    }

    #[test]
    fn density_counts_shell_members_and_attaches_risk() {
        let snapshot = snapshot(vec![
            entry("a", 0.0, 540.0),
            entry("b", 0.0, 560.0),
            entry("c", 0.0, 700.0),
        ]);
        let approaches = vec![approach("a", "c", 3.0), approach("a", "b", 20.0)];
        let report = density_at(&snapshot, &approaches, 550.0, 50.0);

        assert_eq!(report.count, 2);
        let expected = 2.0 / (4.0 * PI * (6371.0f64 + 550.0).powi(2) / 1e6);
        assert!((report.per_million_km2 - expected).abs() < 1e-12);
        assert_eq!(report.peak_risk.map(|r| r.severity), Some(Severity::Medium));
        assert_eq!(report.members[1].peak_risk.map(|r| r.severity), Some(Severity::Low));
    }

    #[test]
    fn distribution_is_half_open() {
        let snapshot = snapshot(vec![
            entry("a", 0.0, 400.0),
            entry("b", 0.0, 399.9),
            entry("c", 0.0, 5000.0),
        ]);
        let bands = altitude_distribution(&snapshot);
        assert_eq!(bands.len(), 5);
        assert_eq!(bands[0].count, 1);
        assert_eq!(bands[1].count, 1);
        assert!((bands[1].percentage - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(bands.iter().map(|b| b.count).sum::<usize>(), 2);
    }
}
