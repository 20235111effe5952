mod book;
mod classifier;
mod event;
mod monitor;

pub use book::{
    ConjunctionBook, IngestOutcome, StatusColor, TierCounts, WorkflowItem, WorkflowSummary,
};
pub use classifier::{Classification, Priority, Recommendation, Tier, WorkflowThresholds};
pub use event::{ConjunctionEvent, ConjunctionMessage, EventKey, ObjectRef};
pub use monitor::{AlertChange, AlertMonitor, MonitorReport, PcTrend};

#[cfg(test)]
pub(crate) use event::fixtures;
