mod coverage;
mod health;
mod maneuver;
mod shells;
mod trend;

pub use coverage::{
    coverage, default_coverage_bands, CoverageBand, CoverageRating, CoverageReport,
    RegionCoverage,
};
pub use health::{
    Anomaly, AnomalySeverity, FleetAggregator, FleetHealthSnapshot, FleetStatus,
    FreshnessSummary, ShellHealth, StatusCounts, TrendCounts,
};
pub use maneuver::{
    hohmann, propellant_kg, Feasibility, HohmannTransfer, ManeuverAction, ManeuverConfig,
    ManeuverPlan, Urgency,
};
pub use shells::{assign_shell, default_shells, ShellDefinition};
pub use trend::{altitude_rate_km_day, AltitudeTrend, TrendEstimate, TrendThresholds};
