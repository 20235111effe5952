use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::propagate::frames::{dot, norm, WGS84_A_KM};
use crate::propagate::StateVector;

const UNIX_EPOCH_JULIAN_DATE: f64 = 2_440_587.5;
const J2000_JULIAN_DATE: f64 = 2_451_545.0;

/// Unit vector from the Earth's centre towards the Sun, in the equatorial
/// frame the propagator reports positions in.
pub trait SunEphemeris: Send + Sync {
    fn direction(&self, epoch: DateTime<Utc>) -> [f64; 3];
}

/// Low-precision solar position (about 0.01 deg over 1950-2050).
#[derive(Debug, Clone, Copy, Default)]
pub struct LowPrecisionSun;

impl SunEphemeris for LowPrecisionSun {
    fn direction(&self, epoch: DateTime<Utc>) -> [f64; 3] {
        let julian_date =
            epoch.timestamp_millis() as f64 / 86_400_000.0 + UNIX_EPOCH_JULIAN_DATE;
        let n = julian_date - J2000_JULIAN_DATE;
        let mean_longitude = 280.460 + 0.985_647_4 * n;
        let mean_anomaly = (357.528 + 0.985_600_3 * n).to_radians();
        let ecliptic_longitude = (mean_longitude
            + 1.915 * mean_anomaly.sin()
            + 0.020 * (2.0 * mean_anomaly).sin())
        .rem_euclid(360.0)
        .to_radians();
        let obliquity = (23.439 - 0.000_000_4 * n).to_radians();
        [
            ecliptic_longitude.cos(),
            obliquity.cos() * ecliptic_longitude.sin(),
            obliquity.sin() * ecliptic_longitude.sin(),
        ]
    }
}

/// Cylindrical shadow test: behind the Earth and within one Earth radius of
/// the Earth-Sun line.
pub fn in_shadow(position_km: [f64; 3], sun_direction: [f64; 3]) -> bool {
    let along = dot(position_km, sun_direction);
    if along >= 0.0 {
        return false;
    }
    let perpendicular = [
        position_km[0] - along * sun_direction[0],
        position_km[1] - along * sun_direction[1],
        position_km[2] - along * sun_direction[2],
    ];
    norm(perpendicular) < WGS84_A_KM
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EclipseWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl EclipseWindow {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            duration_seconds: (end - start).num_milliseconds() as f64 / 1000.0,
        }
    }
}

/// Contiguous shadowed stretches of a sampled trajectory. Each window runs
/// from the first shadowed sample to the first lit sample after it; a window
/// still open at the last sample ends there.
pub fn eclipse_windows(samples: &[StateVector], sun: &dyn SunEphemeris) -> Vec<EclipseWindow> {
    let mut windows = Vec::new();
    let mut open: Option<DateTime<Utc>> = None;

    for sample in samples {
        let shadowed = in_shadow(sample.position_km, sun.direction(sample.epoch));
        match (shadowed, open) {
            (true, None) => open = Some(sample.epoch),
            (false, Some(start)) => {
                windows.push(EclipseWindow::new(start, sample.epoch));
                open = None;
            }
            _ => {}
        }
    }

    if let (Some(start), Some(last)) = (open, samples.last()) {
        windows.push(EclipseWindow::new(start, last.epoch));
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    struct FixedSun([f64; 3]);

    impl SunEphemeris for FixedSun {
        fn direction(&self, _: DateTime<Utc>) -> [f64; 3] {
            self.0
        }
    }

    fn ring(start: DateTime<Utc>, angles_deg: impl Iterator<Item = f64>) -> Vec<StateVector> {
        angles_deg
            .enumerate()
            .map(|(k, angle)| {
                let (sin, cos) = angle.to_radians().sin_cos();
                let position = [7000.0 * cos, 7000.0 * sin, 0.0];
                StateVector {
                    object_id: "sat".into(),
                    epoch: start + Duration::seconds(60 * k as i64),
                    position_km: position,
                    velocity_km_s: [-7.5 * sin, 7.5 * cos, 0.0],
                    position_ecef_km: position,
                    latitude_deg: 0.0,
                    longitude_deg: angle,
                    altitude_km: 621.863,
                    speed_km_s: 7.5,
                }
            })
            .collect()
    }

    #[test]
    fn single_window_behind_the_earth() {
        let start = Utc::now();
        let samples = ring(start, (0..36).map(|k| k as f64 * 10.0));
        let windows = eclipse_windows(&samples, &FixedSun([1.0, 0.0, 0.0]));
        assert_eq!(windows.len(), 1);
        // Shadowed from 120 deg, lit again at 250 deg.
        assert_eq!(windows[0].start, start + Duration::seconds(60 * 12));
        assert_eq!(windows[0].end, start + Duration::seconds(60 * 25));
        assert_eq!(windows[0].duration_seconds, 13.0 * 60.0);
    }

    #[test]
    fn open_window_is_clipped_to_last_sample() {
        let start = Utc::now();
        let samples = ring(start, (0..20).map(|k| k as f64 * 10.0));
        let windows = eclipse_windows(&samples, &FixedSun([1.0, 0.0, 0.0]));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].end, samples[19].epoch);
    }

    #[test]
    fn sunward_orbit_has_no_eclipse() {
        let samples = ring(Utc::now(), (0..10).map(|k| k as f64 * 5.0 - 20.0));
        assert!(eclipse_windows(&samples, &FixedSun([1.0, 0.0, 0.0])).is_empty());
        assert!(eclipse_windows(&[], &LowPrecisionSun).is_empty());
    }

    #[test]
    fn sun_direction_at_equinox_and_solstice() {
        let sun = LowPrecisionSun;
        let equinox = sun.direction(Utc.with_ymd_and_hms(2024, 3, 20, 3, 6, 0).unwrap());
        assert!((equinox[0] - 1.0).abs() < 1e-3);
        assert!(equinox[2].abs() < 5e-3);

        let solstice = sun.direction(Utc.with_ymd_and_hms(2024, 6, 20, 20, 51, 0).unwrap());
        assert!(solstice[0].abs() < 5e-3);
        assert!((solstice[2] - 23.44f64.to_radians().sin()).abs() < 5e-3);
    }
}
