pub mod consume;
pub mod executor;

pub use consume::{Worker, WorkerSettings, WorkerStats};
pub use executor::{Disposition, Executor, InvariantViolation};
