use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use super::shells::{assign_shell, ShellDefinition};
use super::trend::{AltitudeTrend, TrendEstimate, TrendThresholds};
use crate::catalog::{CatalogView, FeedState, Freshness};
use crate::config::FleetConfig;
use crate::propagate::frames::round2;
use crate::snapshot::{History, Snapshot};

#[derive(Debug, Clone, Serialize)]
pub struct ShellHealth {
    pub name: String,
    pub target_altitude_km: f64,
    pub target_inclination_deg: f64,
    pub members: usize,
    pub within_tolerance: usize,
    pub mean_altitude_km: f64,
    pub altitude_std_km: f64,
    /// Percentage of members within the altitude tolerance.
    pub health_score: f64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalySeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub id: String,
    pub name: String,
    pub altitude_km: f64,
    pub trend: AltitudeTrend,
    pub rate_km_day: Option<f64>,
    pub severity: AnomalySeverity,
    pub action: &'static str,
}

/// Operational state inferred from altitude alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FleetStatus {
    Critical,
    Warning,
    Raising,
    Operational,
    Parking,
    Anomalous,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub critical: usize,
    pub warning: usize,
    pub raising: usize,
    pub operational: usize,
    pub parking: usize,
    pub anomalous: usize,
}

impl StatusCounts {
    fn add(&mut self, status: FleetStatus) {
        let slot = match status {
            FleetStatus::Critical => &mut self.critical,
            FleetStatus::Warning => &mut self.warning,
            FleetStatus::Raising => &mut self.raising,
            FleetStatus::Operational => &mut self.operational,
            FleetStatus::Parking => &mut self.parking,
            FleetStatus::Anomalous => &mut self.anomalous,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrendCounts {
    pub raising: usize,
    pub stable: usize,
    pub decaying: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FreshnessSummary {
    pub feed: FeedState,
    pub last_refresh: Option<DateTime<Utc>>,
    pub fresh: usize,
    pub stale: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetHealthSnapshot {
    pub generated_at: DateTime<Utc>,
    pub snapshot_version: u64,
    pub epoch: DateTime<Utc>,
    pub tracked: usize,
    pub retired: usize,
    pub shells: Vec<ShellHealth>,
    /// Active objects matching no shell's inclination.
    pub unassigned: usize,
    pub overall_score: f64,
    pub status: StatusCounts,
    pub trends: TrendCounts,
    /// Most urgent first.
    pub anomalies: Vec<Anomaly>,
    pub freshness: FreshnessSummary,
}

impl FleetHealthSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            snapshot_version: 0,
            epoch: now,
            tracked: 0,
            retired: 0,
            shells: Vec::new(),
            unassigned: 0,
            overall_score: 0.0,
            status: StatusCounts::default(),
            trends: TrendCounts::default(),
            anomalies: Vec::new(),
            freshness: FreshnessSummary {
                feed: FeedState::Stale,
                last_refresh: None,
                fresh: 0,
                stale: 0,
                expired: 0,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FleetAggregator {
    shells: Vec<ShellDefinition>,
    warning_altitude_km: f64,
    critical_altitude_km: f64,
    trend: TrendThresholds,
}

#[derive(Default)]
struct ShellAccumulator {
    altitudes: Vec<f64>,
    within: usize,
}

impl FleetAggregator {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            shells: config.shells.clone(),
            warning_altitude_km: config.warning_altitude_km,
            critical_altitude_km: config.critical_altitude_km,
            trend: config.trend.clone(),
        }
    }

    pub fn status_for(&self, altitude_km: f64) -> FleetStatus {
        if altitude_km < self.critical_altitude_km {
            FleetStatus::Critical
        } else if altitude_km < self.warning_altitude_km {
            FleetStatus::Warning
        } else if altitude_km < 520.0 {
            FleetStatus::Raising
        } else if altitude_km <= 570.0 {
            FleetStatus::Operational
        } else if altitude_km <= 600.0 {
            FleetStatus::Parking
        } else {
            FleetStatus::Anomalous
        }
    }

    /// Decaying objects below the warning altitude.
    fn anomaly(&self, altitude_km: f64, estimate: TrendEstimate) -> Option<AnomalySeverity> {
        if altitude_km >= self.warning_altitude_km || estimate.trend != AltitudeTrend::Decaying {
            return None;
        }
        if altitude_km < self.critical_altitude_km {
            Some(AnomalySeverity::Critical)
        } else {
            Some(AnomalySeverity::Warning)
        }
    }

    /// Rolls one snapshot up into shell, status and anomaly views. Decayed
    /// objects are absent from the snapshot and only show up as `retired`.
    pub fn aggregate(
        &self,
        snapshot: &Snapshot,
        catalog: &CatalogView,
        history: &History,
        now: DateTime<Utc>,
    ) -> FleetHealthSnapshot {
        let mut shells: Vec<ShellAccumulator> =
            self.shells.iter().map(|_| ShellAccumulator::default()).collect();
        let mut unassigned = 0;
        let mut status = StatusCounts::default();
        let mut trends = TrendCounts::default();
        let mut anomalies = Vec::new();
        let mut freshness = FreshnessSummary {
            feed: snapshot.feed,
            last_refresh: catalog.last_refresh(),
            fresh: 0,
            stale: 0,
            expired: 0,
        };

        for entry in &snapshot.entries {
            let state = &entry.state;
            match entry.freshness {
                Freshness::Fresh => freshness.fresh += 1,
                Freshness::Stale => freshness.stale += 1,
                Freshness::Expired => freshness.expired += 1,
            }
            status.add(self.status_for(state.altitude_km));

            let object = catalog.get(&state.object_id);
            if let Some(object) = object {
                match assign_shell(&self.shells, object.elements.set.inclination_deg) {
                    Some(index) => {
                        let acc = &mut shells[index];
                        acc.altitudes.push(state.altitude_km);
                        if self.shells[index].within_tolerance(state.altitude_km) {
                            acc.within += 1;
                        }
                    }
                    None => unassigned += 1,
                }
            }

            let estimate = match history.track(&state.object_id) {
                Some(track) => self.trend.estimate(track),
                None => TrendEstimate {
                    trend: AltitudeTrend::Unknown,
                    rate_km_day: None,
                },
            };
            match estimate.trend {
                AltitudeTrend::Raising => trends.raising += 1,
                AltitudeTrend::Stable => trends.stable += 1,
                AltitudeTrend::Decaying => trends.decaying += 1,
                AltitudeTrend::Unknown => trends.unknown += 1,
            }

            if let Some(severity) = self.anomaly(state.altitude_km, estimate) {
                anomalies.push(Anomaly {
                    id: state.object_id.clone(),
                    name: object.map(|o| o.name.clone()).unwrap_or_default(),
                    altitude_km: round2(state.altitude_km),
                    trend: estimate.trend,
                    rate_km_day: estimate.rate_km_day.map(round2),
                    severity,
                    action: match severity {
                        AnomalySeverity::Critical => "Deorbit imminent, plan disposal",
                        AnomalySeverity::Warning => "Monitor decay",
                    },
                });
            }
        }

        anomalies.sort_by(rank_anomalies);

        let shell_health: Vec<ShellHealth> = self
            .shells
            .iter()
            .zip(&shells)
            .map(|(shell, acc)| shell_health(shell, acc))
            .collect();
        let members: usize = shell_health.iter().map(|s| s.members).sum();
        let within: usize = shell_health.iter().map(|s| s.within_tolerance).sum();

        FleetHealthSnapshot {
            generated_at: now,
            snapshot_version: snapshot.version,
            epoch: snapshot.epoch,
            tracked: snapshot.len(),
            retired: catalog.retired_count(),
            shells: shell_health,
            unassigned,
            overall_score: percentage(within, members),
            status,
            trends,
            anomalies,
            freshness,
        }
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

fn shell_health(shell: &ShellDefinition, acc: &ShellAccumulator) -> ShellHealth {
    let members = acc.altitudes.len();
    let (mean, std) = if members == 0 {
        (0.0, 0.0)
    } else {
        let n = members as f64;
        let mean = acc.altitudes.iter().sum::<f64>() / n;
        let variance = acc.altitudes.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
        (mean, variance.sqrt())
    };
    ShellHealth {
        name: shell.name.clone(),
        target_altitude_km: shell.altitude_km,
        target_inclination_deg: shell.inclination_deg,
        members,
        within_tolerance: acc.within,
        mean_altitude_km: round2(mean),
        altitude_std_km: round2(std),
        health_score: percentage(acc.within, members),
    }
}

/// Severity first, then lowest altitude, fastest decay and id.
fn rank_anomalies(a: &Anomaly, b: &Anomaly) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| {
            a.altitude_km
                .partial_cmp(&b.altitude_km)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| {
            let rate = |x: &Anomaly| x.rate_km_day.unwrap_or(f64::INFINITY);
            rate(a).partial_cmp(&rate(b)).unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}
