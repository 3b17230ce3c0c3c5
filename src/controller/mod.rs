pub mod budget;
pub mod result;
pub mod rolling;

pub use budget::SolveBudget;
pub use result::{MicrogridSeries, RollingResult, RunStatus};
pub use rolling::{CoordinatorSettings, ReschedulingCoordinator};
