mod builder;
mod history;
mod publisher;
mod types;

pub use builder::{CatalogBuild, SnapshotBuilder, TrajectoryLimits};
pub use history::History;
pub use publisher::{PublishReport, Publisher, Subscription};
pub use types::{
    FailureCounts, LivePosition, ObjectDetail, Snapshot, SnapshotEntry, Trajectory,
    TrajectoryPoint,
};
