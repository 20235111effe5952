use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::station::GroundStation;
use super::visibility::visibility;
use crate::error::EngineError;
use crate::propagate::frames::round2;
use crate::propagate::StateVector;

/// Free-space path loss constant for km and GHz.
const FSPL_CONSTANT_DB: f64 = 92.45;

/// Fixed transmitter and receiver figures for one frequency band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandConstants {
    pub frequency_ghz: f64,
    pub eirp_dbw: f64,
    pub receive_gain_dbi: f64,
    /// Cabling, pointing and polarisation losses.
    pub system_losses_db: f64,
    /// Atmospheric loss looking straight up; scaled by 1/sin(elevation).
    pub zenith_atmospheric_loss_db: f64,
    pub required_power_dbw: f64,
}

pub fn default_bands() -> BTreeMap<String, BandConstants> {
    let band = |frequency_ghz, eirp_dbw, receive_gain_dbi, zenith_atmospheric_loss_db, required_power_dbw| {
        BandConstants {
            frequency_ghz,
            eirp_dbw,
            receive_gain_dbi,
            system_losses_db: 3.0,
            zenith_atmospheric_loss_db,
            required_power_dbw,
        }
    };
    BTreeMap::from([
        ("s".to_string(), band(2.2, 10.0, 35.0, 0.3, -125.0)),
        ("x".to_string(), band(8.2, 15.0, 45.0, 0.5, -125.0)),
        ("ku".to_string(), band(12.0, 20.0, 40.0, 1.0, -120.0)),
        ("ka".to_string(), band(26.5, 25.0, 48.0, 2.5, -118.0)),
    ])
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkThresholds {
    pub good_margin_db: f64,
    pub marginal_margin_db: f64,
}

impl Default for LinkThresholds {
    fn default() -> Self {
        Self {
            good_margin_db: 6.0,
            marginal_margin_db: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Good,
    Marginal,
    Bad,
}

impl LinkThresholds {
    pub fn status(&self, margin_db: f64) -> LinkStatus {
        if margin_db >= self.good_margin_db {
            LinkStatus::Good
        } else if margin_db >= self.marginal_margin_db {
            LinkStatus::Marginal
        } else {
            LinkStatus::Bad
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkFigures {
    pub free_space_loss_db: f64,
    pub atmospheric_loss_db: f64,
    pub system_losses_db: f64,
    pub total_loss_db: f64,
    pub received_power_dbw: f64,
    pub required_power_dbw: f64,
    pub margin_db: f64,
    pub status: LinkStatus,
}

/// Budget for a given slant range and elevation. Elevation must be positive.
pub fn compute_link(
    range_km: f64,
    elevation_deg: f64,
    band: &BandConstants,
    thresholds: &LinkThresholds,
) -> LinkFigures {
    let free_space_loss_db =
        FSPL_CONSTANT_DB + 20.0 * range_km.log10() + 20.0 * band.frequency_ghz.log10();
    let atmospheric_loss_db =
        band.zenith_atmospheric_loss_db / elevation_deg.max(0.1).to_radians().sin();
    let total_loss_db = free_space_loss_db + atmospheric_loss_db + band.system_losses_db;
    let received_power_dbw = band.eirp_dbw + band.receive_gain_dbi - total_loss_db;
    let margin_db = received_power_dbw - band.required_power_dbw;

    LinkFigures {
        free_space_loss_db: round2(free_space_loss_db),
        atmospheric_loss_db: round2(atmospheric_loss_db),
        system_losses_db: band.system_losses_db,
        total_loss_db: round2(total_loss_db),
        received_power_dbw: round2(received_power_dbw),
        required_power_dbw: band.required_power_dbw,
        margin_db: round2(margin_db),
        status: thresholds.status(margin_db),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum LinkBudget {
    Visible {
        station: String,
        object_id: String,
        band: String,
        epoch: DateTime<Utc>,
        frequency_ghz: f64,
        elevation_deg: f64,
        azimuth_deg: f64,
        range_km: f64,
        #[serde(flatten)]
        figures: LinkFigures,
    },
    NotVisible {
        station: String,
        object_id: String,
        band: String,
        epoch: DateTime<Utc>,
    },
}

impl LinkBudget {
    pub fn figures(&self) -> Option<&LinkFigures> {
        match self {
            LinkBudget::Visible { figures, .. } => Some(figures),
            LinkBudget::NotVisible { .. } => None,
        }
    }
}

pub fn link_budget(
    station: &GroundStation,
    state: &StateVector,
    band_name: &str,
    bands: &BTreeMap<String, BandConstants>,
    thresholds: &LinkThresholds,
) -> Result<LinkBudget, EngineError> {
    let band = bands
        .get(band_name)
        .ok_or_else(|| EngineError::not_found("band", band_name))?;

    let seen = visibility(station, state);
    let Some(look) = seen.look else {
        return Ok(LinkBudget::NotVisible {
            station: station.name.clone(),
            object_id: state.object_id.clone(),
            band: band_name.to_string(),
            epoch: state.epoch,
        });
    };

    Ok(LinkBudget::Visible {
        station: station.name.clone(),
        object_id: state.object_id.clone(),
        band: band_name.to_string(),
        epoch: state.epoch,
        frequency_ghz: band.frequency_ghz,
        elevation_deg: look.elevation_deg,
        azimuth_deg: look.azimuth_deg,
        range_km: look.range_km,
        figures: compute_link(look.range_km, look.elevation_deg, band, thresholds),
    })
}
