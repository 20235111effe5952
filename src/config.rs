use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::{ElementLimits, FreshnessPolicy};
use crate::conjunction::WorkflowThresholds;
use crate::fleet::{
    default_coverage_bands, default_shells, CoverageBand, ManeuverConfig, ShellDefinition,
    TrendThresholds,
};
use crate::ground::{default_bands, default_stations, BandConstants, GroundStation, LinkThresholds};
use crate::risk::RiskBands;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub elements: ElementsConfig,
    pub trajectory: TrajectoryConfig,
    pub screening: ScreeningConfig,
    pub risk: RiskBands,
    pub workflow: WorkflowConfig,
    pub stations: Vec<GroundStation>,
    pub links: LinkConfig,
    pub eclipse: EclipseConfig,
    pub fleet: FleetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            elements: ElementsConfig::default(),
            trajectory: TrajectoryConfig::default(),
            screening: ScreeningConfig::default(),
            risk: RiskBands::default(),
            workflow: WorkflowConfig::default(),
            stations: default_stations(),
            links: LinkConfig::default(),
            eclipse: EclipseConfig::default(),
            fleet: FleetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(deserialize_with = "humantime_duration")]
    pub tick_interval: Duration,
    /// Depth of each subscriber's snapshot queue.
    pub subscriber_queue: usize,
    /// Samples kept per object in the rolling history.
    pub history_len: usize,
    /// Record history every N ticks.
    pub history_stride: u32,
    #[serde(deserialize_with = "humantime_duration")]
    pub health_interval: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub feed_max_silence: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub query_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            subscriber_queue: 4,
            history_len: 360,
            history_stride: 10,
            health_interval: Duration::from_secs(30),
            feed_max_silence: Duration::from_secs(48 * 3600),
            query_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElementsConfig {
    #[serde(deserialize_with = "humantime_duration")]
    pub fresh_within: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub stale_within: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub max_element_age: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub backward_tolerance: Duration,
    pub decay_floor_km: f64,
}

impl Default for ElementsConfig {
    fn default() -> Self {
        Self {
            fresh_within: Duration::from_secs(6 * 3600),
            stale_within: Duration::from_secs(24 * 3600),
            max_element_age: Duration::from_secs(30 * 86_400),
            backward_tolerance: Duration::from_secs(86_400),
            decay_floor_km: crate::propagate::DEFAULT_DECAY_FLOOR_KM,
        }
    }
}

impl ElementsConfig {
    pub fn limits(&self) -> ElementLimits {
        ElementLimits {
            max_age: to_chrono(self.max_element_age),
            backward_tolerance: to_chrono(self.backward_tolerance),
        }
    }

    pub fn freshness(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            fresh_within: to_chrono(self.fresh_within),
            stale_within: to_chrono(self.stale_within),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    #[serde(deserialize_with = "humantime_duration")]
    pub default_horizon: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub default_step: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub max_horizon: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub min_step: Duration,
    pub max_samples: usize,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            default_horizon: Duration::from_secs(24 * 3600),
            default_step: Duration::from_secs(5 * 60),
            max_horizon: Duration::from_secs(7 * 86_400),
            min_step: Duration::from_secs(10),
            max_samples: 20_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Pairs at or below this separation are reported by the global scan.
    pub alert_threshold_km: f64,
    /// Slack for radial motion between samples and mean-element shell estimates.
    pub altitude_tolerance_km: f64,
    /// Lower bound on the latitude/longitude cell size of the screening grid.
    pub cell_deg: f64,
    pub neighbor_threshold_km: f64,
    #[serde(deserialize_with = "humantime_duration")]
    pub neighbor_horizon: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub neighbor_step: Duration,
    pub hotspot_lat_zone_deg: f64,
    pub hotspot_alt_band_km: f64,
    pub hotspot_min_count: usize,
    pub max_hotspots: usize,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            alert_threshold_km: 50.0,
            altitude_tolerance_km: 25.0,
            cell_deg: 2.0,
            neighbor_threshold_km: 50.0,
            neighbor_horizon: Duration::from_secs(24 * 3600),
            neighbor_step: Duration::from_secs(60),
            hotspot_lat_zone_deg: 5.0,
            hotspot_alt_band_km: 50.0,
            hotspot_min_count: 10,
            max_hotspots: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    #[serde(flatten)]
    pub thresholds: WorkflowThresholds,
    #[serde(deserialize_with = "humantime_duration")]
    pub refresh_interval: Duration,
    /// Messages whose TCAs fall in the same window describe the same event.
    #[serde(deserialize_with = "humantime_duration")]
    pub tca_window: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub retention: Duration,
    pub queue_depth: usize,
    pub max_assess_items: usize,
    pub fire_after: u32,
    pub clear_after: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            thresholds: WorkflowThresholds::default(),
            refresh_interval: Duration::from_secs(5 * 60),
            tca_window: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(24 * 3600),
            queue_depth: 1024,
            max_assess_items: 20,
            fire_after: 2,
            clear_after: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub bands: BTreeMap<String, BandConstants>,
    #[serde(flatten)]
    pub thresholds: LinkThresholds,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            thresholds: LinkThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EclipseConfig {
    #[serde(deserialize_with = "humantime_duration")]
    pub default_horizon: Duration,
    #[serde(deserialize_with = "humantime_duration")]
    pub step: Duration,
}

impl Default for EclipseConfig {
    fn default() -> Self {
        Self {
            default_horizon: Duration::from_secs(6 * 3600),
            step: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub shells: Vec<ShellDefinition>,
    pub warning_altitude_km: f64,
    pub critical_altitude_km: f64,
    pub trend: TrendThresholds,
    pub maneuver: ManeuverConfig,
    pub coverage: Vec<CoverageBand>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            shells: default_shells(),
            warning_altitude_km: 400.0,
            critical_altitude_km: 350.0,
            trend: TrendThresholds::default(),
            maneuver: ManeuverConfig::default(),
            coverage: default_coverage_bands(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(ok: bool, message: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::Invalid(message.to_string()))
            }
        }

        check(!self.engine.tick_interval.is_zero(), "engine.tick_interval must be positive")?;
        check(self.engine.subscriber_queue > 0, "engine.subscriber_queue must be positive")?;
        check(self.engine.history_stride > 0, "engine.history_stride must be positive")?;
        check(
            self.elements.fresh_within < self.elements.stale_within,
            "elements.fresh_within must be shorter than elements.stale_within",
        )?;
        check(self.elements.decay_floor_km > 0.0, "elements.decay_floor_km must be positive")?;
        check(!self.trajectory.min_step.is_zero(), "trajectory.min_step must be positive")?;
        check(
            self.trajectory.default_step >= self.trajectory.min_step
                && self.trajectory.default_horizon <= self.trajectory.max_horizon,
            "trajectory defaults must sit inside the trajectory bounds",
        )?;
        check(
            self.screening.alert_threshold_km > 0.0 && self.screening.neighbor_threshold_km > 0.0,
            "screening thresholds must be positive",
        )?;
        check(self.screening.cell_deg > 0.0, "screening.cell_deg must be positive")?;
        check(!self.screening.neighbor_step.is_zero(), "screening.neighbor_step must be positive")?;
        check(
            self.risk.high_km > 0.0 && self.risk.high_km < self.risk.medium_km,
            "risk.high_km must be positive and below risk.medium_km",
        )?;
        check(
            self.risk.probability_floor > 0.0
                && self.risk.probability_floor < self.risk.probability_ceiling,
            "risk probability bounds must be ordered and positive",
        )?;
        check(
            self.workflow.thresholds.assess_probability
                <= self.workflow.thresholds.mitigate_probability
                && self.workflow.thresholds.hard_floor_km
                    <= self.workflow.thresholds.assess_distance_km,
            "workflow ASSESS thresholds must not be stricter than MITIGATE thresholds",
        )?;
        check(!self.workflow.tca_window.is_zero(), "workflow.tca_window must be positive")?;
        check(
            self.workflow.fire_after > 0 && self.workflow.clear_after > 0,
            "workflow hysteresis counts must be positive",
        )?;
        check(
            self.links.thresholds.marginal_margin_db <= self.links.thresholds.good_margin_db,
            "links.marginal_margin_db must not exceed links.good_margin_db",
        )?;
        check(
            self.eclipse.step >= self.trajectory.min_step,
            "eclipse.step must not be shorter than trajectory.min_step",
        )?;
        check(
            self.fleet.critical_altitude_km < self.fleet.warning_altitude_km,
            "fleet.critical_altitude_km must be below fleet.warning_altitude_km",
        )?;
        check(
            self.fleet.shells.iter().all(|shell| {
                shell.tolerance_km > 0.0 && shell.inclination_tolerance_deg > 0.0
            }),
            "fleet shell tolerances must be positive",
        )?;
        check(self.fleet.trend.min_samples >= 2, "fleet.trend.min_samples must be at least 2")?;
        let maneuver = &self.fleet.maneuver;
        check(
            maneuver.specific_impulse_s > 0.0 && maneuver.spacecraft_mass_kg > 0.0,
            "fleet.maneuver impulse and mass must be positive",
        )?;
        check(
            maneuver.min_target_km < maneuver.max_target_km,
            "fleet.maneuver.min_target_km must be below max_target_km",
        )?;
        check(
            self.fleet.coverage.iter().all(|band| {
                band.min_latitude_deg < band.max_latitude_deg && band.target > 0
            }),
            "fleet coverage bands need ordered latitudes and a positive target",
        )?;

        let mut names = std::collections::HashSet::new();
        for station in &self.stations {
            check(
                (-90.0..=90.0).contains(&station.latitude_deg),
                "station latitude must be within [-90, 90]",
            )?;
            check(names.insert(station.name.as_str()), "station names must be unique")?;
        }
        Ok(())
    }
}

pub fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365_000))
}

pub(crate) fn humantime_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    humantime::parse_duration(value.trim()).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.engine.tick_interval, Duration::from_secs(1));
        assert_eq!(config.stations.len(), 8);
        assert_eq!(config.fleet.shells.len(), 5);
        assert!(config.links.bands.contains_key("x"));
    }

    #[test]
    fn parses_humantime_and_partial_sections() {
        let yaml = r#"
engine:
  tick_interval: 500ms
  feed_max_silence: 2days
elements:
  fresh_within: 3h
workflow:
  mitigate_probability: 0.0002
  tca_window: 10m
stations:
  - name: Darmstadt
    latitude_deg: 49.87
    longitude_deg: 8.65
    min_elevation_deg: 7.5
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.engine.tick_interval, Duration::from_millis(500));
        assert_eq!(config.engine.feed_max_silence, Duration::from_secs(2 * 86_400));
        assert_eq!(config.engine.subscriber_queue, 4);
        assert_eq!(config.elements.fresh_within, Duration::from_secs(3 * 3600));
        assert_eq!(config.workflow.thresholds.mitigate_probability, 0.0002);
        assert_eq!(config.workflow.thresholds.assess_probability, 1e-5);
        assert_eq!(config.workflow.tca_window, Duration::from_secs(600));
        assert_eq!(config.stations.len(), 1);
        assert_eq!(config.stations[0].altitude_m, 0.0);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let yaml = "risk:\n  high_km: 8.0\n  medium_km: 5.0\n";
        assert!(matches!(Config::from_str(yaml), Err(ConfigError::Invalid(_))));

        let yaml = "elements:\n  fresh_within: 30h\n";
        assert!(matches!(Config::from_str(yaml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn eclipse_step_respects_trajectory_minimum() {
        let yaml = "eclipse:\n  step: 5s\n";
        assert!(matches!(Config::from_str(yaml), Err(ConfigError::Invalid(_))));

        let yaml = "eclipse:\n  step: 10s\n";
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.eclipse.step, Duration::from_secs(10));
    }
}
