mod engine;
mod error;
mod scheduler;
mod worker;
mod workflow;


pub use engine::{EclipseReport, Engine, ObjectRisk, TickReport};
pub use error::SchedulerError;
pub use scheduler::{TickScheduler, TickStats};
pub use workflow::{
    ConjunctionWorkflow, IngestSummary, RejectedMessage, WorkflowHandle, WorkflowRefresh,
};
