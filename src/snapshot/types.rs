use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{FeedState, Freshness, OrbitRegime, TrackedObject};
use crate::propagate::StateVector;

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub state: StateVector,
    pub freshness: Freshness,
}

/// Per-object failures skipped while building a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub decayed: usize,
    pub data_errors: usize,
    pub propagation_errors: usize,
    /// Objects already retired before this build.
    pub retired: usize,
}

/// Positions of the whole active catalog at one epoch. Entries are sorted by id.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub epoch: DateTime<Utc>,
    pub feed: FeedState,
    pub entries: Vec<SnapshotEntry>,
    pub failures: FailureCounts,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            epoch: DateTime::<Utc>::default(),
            feed: FeedState::Stale,
            entries: Vec::new(),
            failures: FailureCounts::default(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&SnapshotEntry> {
        self.entries
            .binary_search_by(|entry| entry.state.object_id.as_str().cmp(id))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn states(&self) -> impl Iterator<Item = &StateVector> {
        self.entries.iter().map(|entry| &entry.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose elements are no longer fresh.
    pub fn degraded_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.freshness != Freshness::Fresh)
            .count()
    }

    pub fn live_positions(&self) -> Vec<LivePosition> {
        self.entries
            .iter()
            .map(|entry| LivePosition {
                id: entry.state.object_id.clone(),
                lat: entry.state.latitude_deg,
                lon: entry.state.longitude_deg,
                alt: entry.state.altitude_km,
                speed: entry.state.speed_km_s,
            })
            .collect()
    }
}

/// Compact per-object position for live subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct LivePosition {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Cartesian {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<[f64; 3]> for Cartesian {
    fn from(v: [f64; 3]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Geographic {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrbitSummary {
    pub regime: OrbitRegime,
    pub period_minutes: f64,
    pub inclination_deg: f64,
    pub eccentricity: f64,
    pub perigee_km: f64,
    pub apogee_km: f64,
    pub element_epoch: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectDetail {
    pub id: String,
    pub name: String,
    pub tag: String,
    pub timestamp: DateTime<Utc>,
    pub position: Cartesian,
    pub velocity: Cartesian,
    pub geographic: Geographic,
    pub speed_km_s: f64,
    pub freshness: Freshness,
    pub orbit: OrbitSummary,
}

impl ObjectDetail {
    pub fn new(object: &TrackedObject, entry: &SnapshotEntry) -> Self {
        let set = &object.elements.set;
        Self {
            id: object.id.clone(),
            name: object.name.clone(),
            tag: object.tag.clone(),
            timestamp: entry.state.epoch,
            position: entry.state.position_km.into(),
            velocity: entry.state.velocity_km_s.into(),
            geographic: Geographic {
                latitude_deg: entry.state.latitude_deg,
                longitude_deg: entry.state.longitude_deg,
                altitude_km: entry.state.altitude_km,
            },
            speed_km_s: entry.state.speed_km_s,
            freshness: entry.freshness,
            orbit: OrbitSummary {
                regime: set.regime(),
                period_minutes: set.period_minutes(),
                inclination_deg: set.inclination_deg,
                eccentricity: set.eccentricity,
                perigee_km: set.perigee_altitude_km(),
                apogee_km: set.apogee_altitude_km(),
                element_epoch: set.epoch,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "lat")]
    pub latitude_deg: f64,
    #[serde(rename = "lon")]
    pub longitude_deg: f64,
    #[serde(rename = "alt")]
    pub altitude_km: f64,
}

impl From<&StateVector> for TrajectoryPoint {
    fn from(state: &StateVector) -> Self {
        Self {
            timestamp: state.epoch,
            latitude_deg: state.latitude_deg,
            longitude_deg: state.longitude_deg,
            altitude_km: state.altitude_km,
        }
    }
}

/// Samples over `[start, start + horizon)`.
#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    pub object_id: String,
    pub start: DateTime<Utc>,
    pub step_seconds: f64,
    pub freshness: Freshness,
    pub points: Vec<TrajectoryPoint>,
    /// Set when the object fell below the decay floor inside the window.
    pub decayed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub samples: Vec<StateVector>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trajectory_points_serialize_with_short_keys() {
        let epoch = "2024-03-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let point = TrajectoryPoint {
            timestamp: epoch,
            latitude_deg: 12.5,
            longitude_deg: -45.25,
            altitude_km: 550.0,
        };
        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "timestamp": "2024-03-01T00:00:00Z",
                "lat": 12.5,
                "lon": -45.25,
                "alt": 550.0,
            })
        );
    }
}
