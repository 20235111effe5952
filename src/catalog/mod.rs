mod elements;
mod error;
mod store;
mod tle;

pub use elements::{
    CompiledElements, ElementLimits, ElementRecord, ElementSet, ElementSource, OrbitRegime,
    EARTH_EQUATORIAL_RADIUS_KM, MU_KM3_S2,
};
pub use error::DataError;
pub use store::{
    CatalogView, ElementStore, FeedState, Freshness, FreshnessPolicy, IngestReport, Lifecycle,
    TrackedObject,
};

#[cfg(test)]
pub(crate) use elements::fixtures;
