mod eclipse;
mod link;
mod passes;
mod station;
mod visibility;

pub use eclipse::{eclipse_windows, in_shadow, EclipseWindow, LowPrecisionSun, SunEphemeris};
pub use link::{
    compute_link, default_bands, link_budget, BandConstants, LinkBudget, LinkFigures, LinkStatus,
    LinkThresholds,
};
pub use passes::{predict_passes, Pass};
pub use station::{default_stations, GroundStation};
pub use visibility::{look_angles, visibility, visible_stations, LookAngles, VisibilityResult};
