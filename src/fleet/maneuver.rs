use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::catalog::MU_KM3_S2;
use crate::error::EngineError;
use crate::propagate::frames::round2;
use crate::propagate::StateVector;

/// Radius used for circular-orbit estimates from altitude.
const MEAN_EARTH_RADIUS_KM: f64 = 6371.0;
const STANDARD_GRAVITY_M_S2: f64 = 9.80665;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManeuverConfig {
    pub specific_impulse_s: f64,
    pub spacecraft_mass_kg: f64,
    /// Candidate burn windows listed, one orbit apart.
    pub windows: usize,
    pub min_target_km: f64,
    pub max_target_km: f64,
    /// Below this altitude a maneuver is urgent.
    pub urgent_below_km: f64,
    pub feasible_fuel_kg: f64,
    pub marginal_fuel_kg: f64,
}

impl Default for ManeuverConfig {
    fn default() -> Self {
        Self {
            specific_impulse_s: 1500.0,
            spacecraft_mass_kg: 260.0,
            windows: 5,
            min_target_km: 300.0,
            max_target_km: 600.0,
            urgent_below_km: 400.0,
            feasible_fuel_kg: 5.0,
            marginal_fuel_kg: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ManeuverAction {
    Raise,
    Lower,
    Maintain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    High,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Feasibility {
    Feasible,
    Marginal,
    ReviewRequired,
}

/// Two-burn Hohmann transfer between circular orbits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HohmannTransfer {
    pub burn_1_delta_v_ms: f64,
    pub burn_2_delta_v_ms: f64,
    pub total_delta_v_ms: f64,
    pub transfer_time_hours: f64,
}

pub fn hohmann(from_altitude_km: f64, to_altitude_km: f64) -> HohmannTransfer {
    let r1 = MEAN_EARTH_RADIUS_KM + from_altitude_km;
    let r2 = MEAN_EARTH_RADIUS_KM + to_altitude_km;
    let a_transfer = (r1 + r2) / 2.0;

    let v1 = (MU_KM3_S2 / r1).sqrt();
    let v2 = (MU_KM3_S2 / r2).sqrt();
    let v_perigee = (MU_KM3_S2 * (2.0 / r1 - 1.0 / a_transfer)).sqrt();
    let v_apogee = (MU_KM3_S2 * (2.0 / r2 - 1.0 / a_transfer)).sqrt();

    let dv1 = (v_perigee - v1).abs() * 1000.0;
    let dv2 = (v2 - v_apogee).abs() * 1000.0;
    HohmannTransfer {
        burn_1_delta_v_ms: dv1,
        burn_2_delta_v_ms: dv2,
        total_delta_v_ms: dv1 + dv2,
        transfer_time_hours: PI * (a_transfer.powi(3) / MU_KM3_S2).sqrt() / 3600.0,
    }
}

/// Propellant mass for `delta_v_ms` from the rocket equation.
pub fn propellant_kg(delta_v_ms: f64, initial_mass_kg: f64, specific_impulse_s: f64) -> f64 {
    let mass_ratio = (delta_v_ms / (specific_impulse_s * STANDARD_GRAVITY_M_S2)).exp();
    initial_mass_kg * (1.0 - 1.0 / mass_ratio)
}

#[derive(Debug, Clone, Serialize)]
pub struct ManeuverPlan {
    pub object_id: String,
    pub name: String,
    pub epoch: DateTime<Utc>,
    pub current_altitude_km: f64,
    pub orbital_period_min: f64,
    pub target_altitude_km: f64,
    pub delta_altitude_km: f64,
    #[serde(flatten)]
    pub transfer: HohmannTransfer,
    pub estimated_fuel_kg: f64,
    pub action: ManeuverAction,
    pub urgency: Urgency,
    pub feasibility: Feasibility,
    pub windows: Vec<DateTime<Utc>>,
}

impl ManeuverConfig {
    pub fn feasibility(&self, fuel_kg: f64) -> Feasibility {
        if fuel_kg < self.feasible_fuel_kg {
            Feasibility::Feasible
        } else if fuel_kg < self.marginal_fuel_kg {
            Feasibility::Marginal
        } else {
            Feasibility::ReviewRequired
        }
    }

    /// Plans a transfer from the object's current altitude to `target_km`.
    pub fn plan(
        &self,
        state: &StateVector,
        name: &str,
        target_km: f64,
    ) -> Result<ManeuverPlan, EngineError> {
        if !(self.min_target_km..=self.max_target_km).contains(&target_km) {
            return Err(EngineError::Rejected(format!(
                "target altitude must be within [{}, {}] km",
                self.min_target_km, self.max_target_km
            )));
        }

        let current = state.altitude_km;
        let delta = round2(target_km - current);
        let transfer = hohmann(current, target_km);
        let fuel = propellant_kg(
            transfer.total_delta_v_ms,
            self.spacecraft_mass_kg,
            self.specific_impulse_s,
        );
        let radius = MEAN_EARTH_RADIUS_KM + current;
        let period_seconds = 2.0 * PI * (radius.powi(3) / MU_KM3_S2).sqrt();
        let period = Duration::milliseconds((period_seconds * 1000.0) as i64);

        let action = if delta > 0.0 {
            ManeuverAction::Raise
        } else if delta < 0.0 {
            ManeuverAction::Lower
        } else {
            ManeuverAction::Maintain
        };

        Ok(ManeuverPlan {
            object_id: state.object_id.clone(),
            name: name.to_string(),
            epoch: state.epoch,
            current_altitude_km: round2(current),
            orbital_period_min: round2(period_seconds / 60.0),
            target_altitude_km: target_km,
            delta_altitude_km: delta,
            transfer: HohmannTransfer {
                burn_1_delta_v_ms: round2(transfer.burn_1_delta_v_ms),
                burn_2_delta_v_ms: round2(transfer.burn_2_delta_v_ms),
                total_delta_v_ms: round2(transfer.total_delta_v_ms),
                transfer_time_hours: round2(transfer.transfer_time_hours),
            },
            estimated_fuel_kg: (fuel * 1000.0).round() / 1000.0,
            action,
            urgency: if current < self.urgent_below_km {
                Urgency::High
            } else {
                Urgency::Normal
            },
            feasibility: self.feasibility(fuel),
            windows: (0..self.windows)
                .map(|k| state.epoch + period * k as i32)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at_altitude(altitude_km: f64) -> StateVector {
        let mut state = StateVector::from_teme(
            "sat",
            Utc::now(),
            [MEAN_EARTH_RADIUS_KM + altitude_km, 0.0, 0.0],
            [0.0, 7.6, 0.0],
        );
        state.altitude_km = altitude_km;
        state
    }

    #[test]
    fn hohmann_between_leo_altitudes() {
        let transfer = hohmann(400.0, 550.0);
        assert!(transfer.total_delta_v_ms > 80.0 && transfer.total_delta_v_ms < 88.0);
        assert!((transfer.burn_1_delta_v_ms - transfer.burn_2_delta_v_ms).abs() < 1.0);
        assert!(transfer.transfer_time_hours > 0.75 && transfer.transfer_time_hours < 0.8);

        let same = hohmann(550.0, 550.0);
        assert!(same.total_delta_v_ms.abs() < 1e-9);
    }

    #[test]
    fn plan_raise_from_low_orbit() {
        let config = ManeuverConfig::default();
        let plan = config.plan(&state_at_altitude(380.0), "SAT", 550.0).unwrap();
        assert_eq!(plan.action, ManeuverAction::Raise);
        assert_eq!(plan.urgency, Urgency::High);
        assert_eq!(plan.feasibility, Feasibility::Feasible);
        assert!(plan.estimated_fuel_kg > 1.0 && plan.estimated_fuel_kg < 2.5);
        assert_eq!(plan.windows.len(), 5);
        assert!(plan.windows.windows(2).all(|w| w[0] < w[1]));
        assert!((plan.orbital_period_min - 92.0).abs() < 1.0);
    }

    #[test]
    fn plan_rejects_out_of_range_targets() {
        let config = ManeuverConfig::default();
        let result = config.plan(&state_at_altitude(550.0), "SAT", 800.0);
        assert!(matches!(result, Err(EngineError::Rejected(_))));

        let lower = config.plan(&state_at_altitude(560.0), "SAT", 540.0).unwrap();
        assert_eq!(lower.action, ManeuverAction::Lower);
        assert_eq!(lower.urgency, Urgency::Normal);
    }

    #[test]
    fn feasibility_bands() {
        let config = ManeuverConfig::default();
        assert_eq!(config.feasibility(4.9), Feasibility::Feasible);
        assert_eq!(config.feasibility(5.0), Feasibility::Marginal);
        assert_eq!(config.feasibility(10.0), Feasibility::ReviewRequired);
        assert!(propellant_kg(0.0, 260.0, 1500.0).abs() < 1e-12);
    }
}
