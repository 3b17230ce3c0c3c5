//! Hierarchical local/global rolling-horizon dispatch for a community of microgrids.
//!
//! Every hour each microgrid solves its own day-ahead unit commitment, the
//! community operator (DSO) balances the resulting surpluses and shortages,
//! and the microgrids re-solve with the current hour pinned to the
//! community's decision.

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod optimizer;
pub mod scenario;
pub mod telemetry;

pub use controller::{ReschedulingCoordinator, RollingResult, RunStatus};
pub use error::{ScheduleError, Stage, StageContext};
pub use scenario::{ProfileFeed, Scenario};
