use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use super::station::GroundStation;
use crate::propagate::frames::{
    dot, ecef_to_enu, norm, round2, sidereal_time, sub, teme_to_ecef_velocity,
};
use crate::propagate::StateVector;

/// Topocentric geometry of one object seen from one station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LookAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    /// Positive when the object recedes.
    pub range_rate_km_s: f64,
}

/// Look angles rounded for reporting.
pub fn look_angles(station: &GroundStation, state: &StateVector) -> LookAngles {
    exact_look_angles(station, state).rounded()
}

/// Unrounded look angles; mask and horizon decisions use these.
pub(crate) fn exact_look_angles(station: &GroundStation, state: &StateVector) -> LookAngles {
    let sta_ecef = station.position_ecef_km();
    let dr = sub(state.position_ecef_km, sta_ecef);
    let range_km = norm(dr);

    let (east, north, up) = ecef_to_enu(dr, station.lat_rad(), station.lon_rad());
    let azimuth = east.atan2(north).to_degrees().rem_euclid(360.0);
    let elevation = if range_km > 0.0 {
        (up / range_km).clamp(-1.0, 1.0).asin().to_degrees()
    } else {
        90.0
    };

    let sat_vel_ecef = teme_to_ecef_velocity(
        state.position_km,
        state.velocity_km_s,
        sidereal_time(state.epoch),
    );
    let range_rate_km_s = if range_km > 0.0 {
        dot(sat_vel_ecef, dr) / range_km
    } else {
        0.0
    };

    LookAngles {
        azimuth_deg: azimuth,
        elevation_deg: elevation,
        range_km,
        range_rate_km_s,
    }
}

impl LookAngles {
    fn rounded(self) -> Self {
        Self {
            azimuth_deg: round2(self.azimuth_deg),
            elevation_deg: round2(self.elevation_deg),
            range_km: round2(self.range_km),
            range_rate_km_s: round2(self.range_rate_km_s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibilityResult {
    pub station: String,
    pub object_id: String,
    pub epoch: DateTime<Utc>,
    pub visible: bool,
    /// Present only when the object is at or above the station mask.
    pub look: Option<LookAngles>,
}

impl VisibilityResult {
    pub fn elevation_deg(&self) -> Option<f64> {
        self.look.map(|look| look.elevation_deg)
    }
}

pub fn visibility(station: &GroundStation, state: &StateVector) -> VisibilityResult {
    let look = exact_look_angles(station, state);
    let visible = look.elevation_deg >= station.min_elevation_deg;
    VisibilityResult {
        station: station.name.clone(),
        object_id: state.object_id.clone(),
        epoch: state.epoch,
        visible,
        look: visible.then(|| look.rounded()),
    }
}

/// Stations that can see the object, highest elevation first.
pub fn visible_stations(stations: &[GroundStation], state: &StateVector) -> Vec<VisibilityResult> {
    let mut visible: Vec<VisibilityResult> = stations
        .iter()
        .map(|station| visibility(station, state))
        .filter(|result| result.visible)
        .collect();
    visible.sort_by(|a, b| {
        b.elevation_deg()
            .partial_cmp(&a.elevation_deg())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.station.cmp(&b.station))
    });
    visible
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::propagate::frames::ecef_to_geodetic;

    /// A state whose Earth-fixed position is `ecef`; the inertial fields are
    /// placeholders.
    pub fn state_at(id: &str, ecef: [f64; 3]) -> StateVector {
        let (latitude_deg, longitude_deg, altitude_km) = ecef_to_geodetic(ecef);
        StateVector {
            object_id: id.to_string(),
            epoch: Utc::now(),
            position_km: ecef,
            velocity_km_s: [0.0, 7.5, 0.0],
            position_ecef_km: ecef,
            latitude_deg,
            longitude_deg,
            altitude_km,
            speed_km_s: 7.5,
        }
    }

    /// A point `height_km` straight above the station along its local vertical.
    pub fn above(station: &GroundStation, height_km: f64) -> [f64; 3] {
        let (lat, lon) = (station.lat_rad(), station.lon_rad());
        let up = [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()];
        let base = station.position_ecef_km();
        [
            base[0] + up[0] * height_km,
            base[1] + up[1] * height_km,
            base[2] + up[2] * height_km,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::ground::default_stations;

    #[test]
    fn overhead_object_is_at_zenith() {
        let station = GroundStation::new("Svalbard", 78.23, 15.39, 5.0);
        let state = state_at("sat", above(&station, 550.0));
        let result = visibility(&station, &state);
        assert!(result.visible);
        assert_eq!(result.elevation_deg(), Some(90.0));
        assert!((result.look.unwrap().range_km - 550.0).abs() < 0.01);
    }

    #[test]
    fn object_below_horizon_has_no_elevation() {
        let station = GroundStation::new("Guam", 13.44, 144.79, 10.0);
        let antipode = GroundStation::new("opposite", -13.44, -35.21, 0.0);
        let state = state_at("sat", above(&antipode, 550.0));
        let result = visibility(&station, &state);
        assert!(!result.visible);
        assert_eq!(result.elevation_deg(), None);
        assert!(look_angles(&station, &state).elevation_deg < 0.0);
    }

    #[test]
    fn mask_applies_per_station() {
        let low_mask = GroundStation::new("low", 0.0, 0.0, 0.0);
        let high_mask = GroundStation::new("high", 0.0, 0.0, 60.0);
        // About 450 km east of the station at 550 km altitude.
        let state = state_at("sat", crate::propagate::frames::geodetic_to_ecef(0.0, 4.0, 550.0));
        let elevation = look_angles(&low_mask, &state).elevation_deg;
        assert!(elevation > 0.0 && elevation < 60.0);
        assert!(visibility(&low_mask, &state).visible);
        assert!(!visibility(&high_mask, &state).visible);
    }

    fn state_at_elevation(station: &GroundStation, target_deg: f64) -> StateVector {
        let (mut near, mut far) = (0.0, 30.0);
        for _ in 0..80 {
            let mid = 0.5 * (near + far);
            let state = state_at(
                "sat",
                crate::propagate::frames::geodetic_to_ecef(0.0, mid, 550.0),
            );
            if exact_look_angles(station, &state).elevation_deg > target_deg {
                near = mid;
            } else {
                far = mid;
            }
        }
        state_at("sat", crate::propagate::frames::geodetic_to_ecef(0.0, near, 550.0))
    }

    #[test]
    fn mask_compares_unrounded_elevation() {
        let station = GroundStation::new("Null Island", 0.0, 0.0, 5.0);

        let below = state_at_elevation(&station, 4.997);
        assert!((exact_look_angles(&station, &below).elevation_deg - 4.997).abs() < 1e-6);
        assert_eq!(look_angles(&station, &below).elevation_deg, 5.0);
        let result = visibility(&station, &below);
        assert!(!result.visible);
        assert_eq!(result.elevation_deg(), None);

        let above_mask = state_at_elevation(&station, 5.003);
        let result = visibility(&station, &above_mask);
        assert!(result.visible);
        assert_eq!(result.elevation_deg(), Some(5.0));
    }

    #[test]
    fn batch_is_sorted_by_elevation() {
        let stations = default_stations();
        let canaveral = &stations[6];
        let state = state_at("sat", above(canaveral, 1200.0));
        let visible = visible_stations(&stations, &state);
        assert!(!visible.is_empty());
        assert_eq!(visible[0].station, "Cape Canaveral");
        assert!(visible
            .windows(2)
            .all(|w| w[0].elevation_deg() >= w[1].elevation_deg()));
        assert!(visible.iter().all(|r| r.visible && r.look.is_some()));
    }
}
