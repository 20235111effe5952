use chrono::{DateTime, Utc};
use serde::Serialize;

use super::frames::{distance, ecef_to_geodetic, norm, sidereal_time, sub, teme_to_ecef_position};

/// Position and velocity of one object at one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateVector {
    pub object_id: String,
    pub epoch: DateTime<Utc>,
    /// TEME, km.
    pub position_km: [f64; 3],
    /// TEME, km/s.
    pub velocity_km_s: [f64; 3],
    pub position_ecef_km: [f64; 3],
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub speed_km_s: f64,
}

impl StateVector {
    pub fn from_teme(
        object_id: &str,
        epoch: DateTime<Utc>,
        position_km: [f64; 3],
        velocity_km_s: [f64; 3],
    ) -> Self {
        let position_ecef_km = teme_to_ecef_position(position_km, sidereal_time(epoch));
        let (latitude_deg, longitude_deg, altitude_km) = ecef_to_geodetic(position_ecef_km);
        Self {
            object_id: object_id.to_string(),
            epoch,
            position_km,
            velocity_km_s,
            position_ecef_km,
            latitude_deg,
            longitude_deg,
            altitude_km,
            speed_km_s: norm(velocity_km_s),
        }
    }

    pub fn distance_km(&self, other: &StateVector) -> f64 {
        distance(self.position_km, other.position_km)
    }

    /// Magnitude of the relative velocity.
    pub fn closing_speed_km_s(&self, other: &StateVector) -> f64 {
        norm(sub(self.velocity_km_s, other.velocity_km_s))
    }

    pub fn radius_km(&self) -> f64 {
        norm(self.position_km)
    }
}
