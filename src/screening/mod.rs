mod density;
mod grid;
mod neighbors;
mod scan;

pub use density::{
    altitude_distribution, density_at, hotspots, AltitudeBand, DensityMember, DensityReport,
    Hotspot,
};
pub use neighbors::{screen_neighbors, NeighborQuery};
pub use scan::{
    compare_risk, scan_exhaustive, scan_partitioned, scan_snapshot, sort_approaches,
    CloseApproach, PairKey, ScanSettings, EXHAUSTIVE_LIMIT,
};
