/// Business logic services layer
pub mod predictor;
pub mod propagator;
pub mod session;
pub mod tle_store;

pub use propagator::Sgp4Propagator;
pub use session::{PredictionEvent, PredictionSession};
pub use tle_store::TleStore;
