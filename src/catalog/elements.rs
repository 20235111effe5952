use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sgp4::{Constants, Elements};
use std::f64::consts::PI;

use super::error::DataError;
use super::tle::format_tle;

pub const MU_KM3_S2: f64 = 398_600.4418;
pub const EARTH_EQUATORIAL_RADIUS_KM: f64 = 6378.137;
/// Orbits with a longer period use the deep-space (SDP4) branch.
pub const DEEP_SPACE_PERIOD_MINUTES: f64 = 225.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrbitRegime {
    NearEarth,
    DeepSpace,
}

/// Mean orbital elements for one object, angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSet {
    pub catalog_number: u32,
    pub epoch: DateTime<Utc>,
    pub mean_motion_rev_day: f64,
    pub eccentricity: f64,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    /// B* drag term, 1/earth radii.
    #[serde(default)]
    pub drag_term: f64,
    /// First derivative of mean motion as carried in the two-line layout.
    #[serde(default)]
    pub mean_motion_dot: f64,
}

impl ElementSet {
    pub fn from_elements(elements: &Elements) -> Self {
        Self {
            catalog_number: elements.norad_id as u32,
            epoch: DateTime::from_naive_utc_and_offset(elements.datetime, Utc),
            mean_motion_rev_day: elements.mean_motion,
            eccentricity: elements.eccentricity,
            inclination_deg: elements.inclination,
            raan_deg: elements.right_ascension,
            arg_perigee_deg: elements.argument_of_perigee,
            mean_anomaly_deg: elements.mean_anomaly,
            drag_term: elements.drag_term,
            mean_motion_dot: elements.mean_motion_dot,
        }
    }

    /// Checks the orbit shape. Epoch checks live in [`ElementLimits`].
    pub fn validate(&self) -> Result<(), DataError> {
        let fields = [
            ("mean_motion_rev_day", self.mean_motion_rev_day),
            ("eccentricity", self.eccentricity),
            ("inclination_deg", self.inclination_deg),
            ("raan_deg", self.raan_deg),
            ("arg_perigee_deg", self.arg_perigee_deg),
            ("mean_anomaly_deg", self.mean_anomaly_deg),
            ("drag_term", self.drag_term),
            ("mean_motion_dot", self.mean_motion_dot),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(DataError::NonFinite(name));
            }
        }
        if !(0.0..1.0).contains(&self.eccentricity) {
            return Err(DataError::Eccentricity(self.eccentricity));
        }
        if self.mean_motion_rev_day <= 0.0 {
            return Err(DataError::MeanMotion(self.mean_motion_rev_day));
        }
        Ok(())
    }

    pub fn period_minutes(&self) -> f64 {
        1440.0 / self.mean_motion_rev_day
    }

    pub fn regime(&self) -> OrbitRegime {
        if self.period_minutes() >= DEEP_SPACE_PERIOD_MINUTES {
            OrbitRegime::DeepSpace
        } else {
            OrbitRegime::NearEarth
        }
    }

    pub fn semi_major_axis_km(&self) -> f64 {
        let n_rad_s = self.mean_motion_rev_day * 2.0 * PI / 86_400.0;
        (MU_KM3_S2 / (n_rad_s * n_rad_s)).cbrt()
    }

    pub fn perigee_altitude_km(&self) -> f64 {
        self.semi_major_axis_km() * (1.0 - self.eccentricity) - EARTH_EQUATORIAL_RADIUS_KM
    }

    pub fn apogee_altitude_km(&self) -> f64 {
        self.semi_major_axis_km() * (1.0 + self.eccentricity) - EARTH_EQUATORIAL_RADIUS_KM
    }
}

/// Bounds on how far from its epoch an element set may be propagated.
#[derive(Debug, Clone, Copy)]
pub struct ElementLimits {
    pub max_age: Duration,
    pub backward_tolerance: Duration,
}

impl Default for ElementLimits {
    fn default() -> Self {
        Self {
            max_age: Duration::days(30),
            backward_tolerance: Duration::days(1),
        }
    }
}

impl ElementLimits {
    pub fn check(&self, epoch: DateTime<Utc>, requested: DateTime<Utc>) -> Result<(), DataError> {
        if requested < epoch - self.backward_tolerance {
            return Err(DataError::BeforeEpoch { requested, epoch });
        }
        let age = (requested - epoch).abs();
        if age > self.max_age {
            return Err(DataError::Expired {
                age_hours: age.num_seconds() as f64 / 3600.0,
                limit_hours: self.max_age.num_seconds() as f64 / 3600.0,
            });
        }
        Ok(())
    }
}

/// How an element set arrives from the refresh feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ElementSource {
    Tle { line1: String, line2: String },
    Mean(ElementSet),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tag: String,
    pub elements: ElementSource,
}

impl ElementRecord {
    pub fn validate(&self) -> Result<(), DataError> {
        if self.id.trim().is_empty() {
            return Err(DataError::Record("empty object id".to_string()));
        }
        if let ElementSource::Mean(set) = &self.elements {
            set.validate()?;
        }
        Ok(())
    }
}

/// An element set with its SGP4 state initialised.
pub struct CompiledElements {
    pub set: ElementSet,
    pub elements: Elements,
    pub constants: Constants,
}

impl std::fmt::Debug for CompiledElements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledElements")
            .field("set", &self.set)
            .finish_non_exhaustive()
    }
}

impl CompiledElements {
    pub fn compile(name: &str, source: &ElementSource) -> Result<Self, DataError> {
        let elements = match source {
            ElementSource::Tle { line1, line2 } => Elements::from_tle(
                Some(name.to_string()),
                line1.trim().as_bytes(),
                line2.trim().as_bytes(),
            )
            .map_err(|e| DataError::Tle(e.to_string()))?,
            ElementSource::Mean(set) => {
                set.validate()?;
                let (line1, line2) = format_tle(set)?;
                Elements::from_tle(Some(name.to_string()), line1.as_bytes(), line2.as_bytes())
                    .map_err(|e| DataError::Tle(e.to_string()))?
            }
        };

        let set = ElementSet::from_elements(&elements);
        set.validate()?;
        let constants =
            Constants::from_elements(&elements).map_err(|e| DataError::Tle(e.to_string()))?;

        Ok(Self {
            set,
            elements,
            constants,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn compiles_tle_and_reports_regime() {
        let iss = iss();
        assert_eq!(iss.set.catalog_number, 25544);
        assert_eq!(iss.set.regime(), OrbitRegime::NearEarth);
        assert!((iss.set.inclination_deg - 51.6416).abs() < 1e-9);

        let vanguard = vanguard();
        assert_eq!(vanguard.set.regime(), OrbitRegime::NearEarth);
        assert!(vanguard.set.period_minutes() > 130.0);
    }

    #[test]
    fn rejects_bad_shape() {
        let mut set = leo_set(1, Utc::now(), 0.0);
        set.eccentricity = 1.2;
        assert_eq!(set.validate(), Err(DataError::Eccentricity(1.2)));

        let mut set = leo_set(1, Utc::now(), 0.0);
        set.mean_motion_rev_day = 0.0;
        assert_eq!(set.validate(), Err(DataError::MeanMotion(0.0)));

        let mut set = leo_set(1, Utc::now(), 0.0);
        set.raan_deg = f64::NAN;
        assert_eq!(set.validate(), Err(DataError::NonFinite("raan_deg")));
    }

    #[test]
    fn geostationary_is_deep_space() {
        let mut set = leo_set(1, Utc::now(), 0.0);
        set.mean_motion_rev_day = 1.0027;
        assert_eq!(set.regime(), OrbitRegime::DeepSpace);
        assert!((set.semi_major_axis_km() - 42_164.0).abs() < 10.0);
    }

    #[test]
    fn epoch_limits() {
        let limits = ElementLimits::default();
        let epoch = Utc::now();
        assert!(limits.check(epoch, epoch + Duration::days(3)).is_ok());
        assert!(limits.check(epoch, epoch - Duration::hours(12)).is_ok());
        assert!(matches!(
            limits.check(epoch, epoch - Duration::days(2)),
            Err(DataError::BeforeEpoch { .. })
        ));
        assert!(matches!(
            limits.check(epoch, epoch + Duration::days(31)),
            Err(DataError::Expired { .. })
        ));
    }

    #[test]
    fn mean_elements_compile_through_two_line_layout() {
        let epoch = DateTime::parse_from_rfc3339("2024-03-01T06:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let set = leo_set(44_713, epoch, 42.5);
        let compiled = CompiledElements::compile("SAT", &ElementSource::Mean(set.clone())).unwrap();

        assert_eq!(compiled.set.catalog_number, 44_713);
        assert!((compiled.set.epoch - epoch).num_milliseconds().abs() < 5);
        assert!((compiled.set.mean_anomaly_deg - 42.5).abs() < 1e-4);
        assert!((compiled.set.mean_motion_rev_day - 15.05).abs() < 1e-8);
        assert!((compiled.set.eccentricity - 0.0001).abs() < 1e-7);
    }
}
