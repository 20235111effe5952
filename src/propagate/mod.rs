mod error;
pub mod frames;
mod propagator;
mod state;

pub use error::PropagateError;
pub use propagator::{Propagation, Propagator, DEFAULT_DECAY_FLOOR_KM};
pub use state::StateVector;
