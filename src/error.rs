use std::fmt;

use serde::Serialize;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::domain::ProfileError;
use crate::optimizer::SolveError;

/// Step of an hourly iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Feed,
    Validate,
    LocalSolve,
    Extract,
    GlobalSolve,
    Reschedule,
    Commit,
}

/// Where in the rolling run a failure happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageContext {
    pub stage: Stage,
    pub hour: usize,
    /// Microgrid id, or `dso` for the community model; `None` for stage-wide failures
    pub microgrid: Option<String>,
}

impl StageContext {
    pub fn new(stage: Stage, hour: usize) -> Self {
        Self {
            stage,
            hour,
            microgrid: None,
        }
    }

    pub fn for_microgrid(stage: Stage, hour: usize, microgrid: impl Into<String>) -> Self {
        Self {
            stage,
            hour,
            microgrid: Some(microgrid.into()),
        }
    }
}

impl fmt::Display for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at hour {}", self.stage, self.hour)?;
        if let Some(mg) = &self.microgrid {
            write!(f, " ({mg})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("infeasible model: {context}")]
    InfeasibleModel { context: StageContext },

    #[error("unbounded model: {context}")]
    UnboundedModel { context: StageContext },

    #[error("solver exceeded its time budget twice: {context}")]
    SolverTimeout { context: StageContext },

    #[error("inconsistent input: {context}: {source}")]
    InputInconsistency {
        context: StageContext,
        #[source]
        source: ProfileError,
    },

    #[error("solver failure: {context}: {message}")]
    Solver { context: StageContext, message: String },

    #[error("solve task failed: {context}: {message}")]
    TaskFailed { context: StageContext, message: String },

    #[error("profile feed failed: {context}: {message}")]
    Feed { context: StageContext, message: String },
}

impl ScheduleError {
    /// Attach `context` to a solver outcome.
    pub fn from_solve(context: StageContext, err: SolveError) -> Self {
        match err {
            SolveError::Infeasible => ScheduleError::InfeasibleModel { context },
            SolveError::Unbounded => ScheduleError::UnboundedModel { context },
            SolveError::Backend(message) | SolveError::InvalidModel(message) => {
                ScheduleError::Solver { context, message }
            }
        }
    }

    pub fn context(&self) -> &StageContext {
        match self {
            ScheduleError::InfeasibleModel { context }
            | ScheduleError::UnboundedModel { context }
            | ScheduleError::SolverTimeout { context }
            | ScheduleError::InputInconsistency { context, .. }
            | ScheduleError::Solver { context, .. }
            | ScheduleError::TaskFailed { context, .. }
            | ScheduleError::Feed { context, .. } => context,
        }
    }
}
