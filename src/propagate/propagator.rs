use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::sync::Arc;

use super::error::PropagateError;
use super::state::StateVector;
use crate::catalog::{CompiledElements, ElementLimits, TrackedObject};

pub const DEFAULT_DECAY_FLOOR_KM: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Propagation {
    State(StateVector),
    /// The object is below the decay floor; not an error.
    Decayed {
        epoch: DateTime<Utc>,
        altitude_km: f64,
    },
}

impl Propagation {
    pub fn state(self) -> Option<StateVector> {
        match self {
            Propagation::State(state) => Some(state),
            Propagation::Decayed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Propagator {
    limits: ElementLimits,
    decay_floor_km: f64,
}

impl Default for Propagator {
    fn default() -> Self {
        Self::new(ElementLimits::default(), DEFAULT_DECAY_FLOOR_KM)
    }
}

impl Propagator {
    pub fn new(limits: ElementLimits, decay_floor_km: f64) -> Self {
        Self {
            limits,
            decay_floor_km,
        }
    }

    pub fn decay_floor_km(&self) -> f64 {
        self.decay_floor_km
    }

    pub fn propagate(
        &self,
        object_id: &str,
        compiled: &CompiledElements,
        epoch: DateTime<Utc>,
    ) -> Result<Propagation, PropagateError> {
        compiled.set.validate()?;
        self.limits.check(compiled.set.epoch, epoch)?;

        let minutes = compiled
            .elements
            .datetime_to_minutes_since_epoch(&epoch.naive_utc())
            .map_err(|e| PropagateError::Numerical(e.to_string()))?;

        let prediction = match compiled.constants.propagate(minutes) {
            Ok(prediction) => prediction,
            Err(e) => {
                let perigee_km = compiled.set.perigee_altitude_km();
                if perigee_km < self.decay_floor_km {
                    return Ok(Propagation::Decayed {
                        epoch,
                        altitude_km: perigee_km,
                    });
                }
                return Err(e.into());
            }
        };

        let state =
            StateVector::from_teme(object_id, epoch, prediction.position, prediction.velocity);
        if !state.altitude_km.is_finite() || !state.speed_km_s.is_finite() {
            return Err(PropagateError::Numerical(format!(
                "non-finite state for {} at {}",
                object_id, epoch
            )));
        }
        if state.altitude_km < self.decay_floor_km {
            return Ok(Propagation::Decayed {
                epoch,
                altitude_km: state.altitude_km,
            });
        }
        Ok(Propagation::State(state))
    }

    /// One element set, many epochs.
    pub fn propagate_epochs(
        &self,
        object_id: &str,
        compiled: &CompiledElements,
        epochs: &[DateTime<Utc>],
    ) -> Vec<Result<Propagation, PropagateError>> {
        epochs
            .iter()
            .map(|epoch| self.propagate(object_id, compiled, *epoch))
            .collect()
    }

    /// Many objects, one epoch. Results keep the input order.
    pub fn propagate_all(
        &self,
        objects: &[Arc<TrackedObject>],
        epoch: DateTime<Utc>,
    ) -> Vec<Result<Propagation, PropagateError>> {
        objects
            .par_iter()
            .map(|object| self.propagate(&object.id, &object.elements, epoch))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use crate::catalog::{DataError, ElementSource};
    use chrono::Duration;

    #[test]
    fn matches_reference_vectors() {
        let vanguard = vanguard();
        let propagator = Propagator::default();
        let epoch = vanguard.set.epoch;

        let state = propagator
            .propagate("5", &vanguard, epoch)
            .unwrap()
            .state()
            .unwrap();
        let expected = [7022.465_292_66, -1400.082_967_55, 0.039_951_55];
        for axis in 0..3 {
            assert!((state.position_km[axis] - expected[axis]).abs() < 1.0);
        }
        assert!((state.velocity_km_s[0] - 1.893_841_015).abs() < 1e-3);

        let later = propagator
            .propagate("5", &vanguard, epoch + Duration::minutes(360))
            .unwrap()
            .state()
            .unwrap();
        let expected = [-7154.031_202_02, -3783.176_825_04, -3536.194_122_94];
        for axis in 0..3 {
            assert!((later.position_km[axis] - expected[axis]).abs() < 1.0);
        }
    }

    #[test]
    fn batch_epochs_keep_order() {
        let iss = iss();
        let epoch = iss.set.epoch;
        let epochs: Vec<_> = (0..5).map(|i| epoch + Duration::minutes(i * 10)).collect();
        let results = Propagator::default().propagate_epochs("25544", &iss, &epochs);
        assert_eq!(results.len(), 5);
        for (result, epoch) in results.into_iter().zip(epochs) {
            let state = result.unwrap().state().unwrap();
            assert_eq!(state.epoch, epoch);
            assert!(state.altitude_km > 300.0 && state.altitude_km < 400.0);
        }
    }

    #[test]
    fn rejects_epoch_before_elements() {
        let iss = iss();
        let result = Propagator::default().propagate("25544", &iss, iss.set.epoch - Duration::days(3));
        assert!(matches!(
            result,
            Err(PropagateError::Data(DataError::BeforeEpoch { .. }))
        ));
    }

    #[test]
    fn rejects_expired_elements() {
        let iss = iss();
        let result = Propagator::default().propagate("25544", &iss, iss.set.epoch + Duration::days(45));
        assert!(matches!(
            result,
            Err(PropagateError::Data(DataError::Expired { .. }))
        ));
    }

    #[test]
    fn low_orbit_reports_decay() {
        let epoch = Utc::now();
        let mut set = leo_set(99_001, epoch, 0.0);
        set.mean_motion_rev_day = 16.9;
        let compiled = CompiledElements::compile("REENTRY", &ElementSource::Mean(set)).unwrap();

        let result = Propagator::default().propagate("reentry", &compiled, epoch).unwrap();
        match result {
            Propagation::Decayed { altitude_km, .. } => assert!(altitude_km < DEFAULT_DECAY_FLOOR_KM),
            other => panic!("expected decay, got {:?}", other),
        }
    }
}
