//! Solver capability
//!
//! Schedulers only depend on [`LpSolver`]: hand over a [`LinearModel`], get back
//! either the optimal primal values or a reason why there are none. The
//! production backend is `good_lp` driving the pure-Rust `microlp` solver,
//! which handles the binary commitment variables by branch and bound.

use std::time::Instant;

use good_lp::solvers::microlp::microlp;
use good_lp::{ResolutionError, Solution, SolverModel};
use thiserror::Error;
use tracing::debug;

use super::model::{Assignment, LinearModel, ModelParts};

/// Why a solve produced no assignment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("model is infeasible")]
    Infeasible,
    #[error("model is unbounded")]
    Unbounded,
    #[error("solver backend failed: {0}")]
    Backend(String),
    #[error("model rejected before solving: {0}")]
    InvalidModel(String),
}

impl From<ResolutionError> for SolveError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Infeasible => SolveError::Infeasible,
            ResolutionError::Unbounded => SolveError::Unbounded,
            other => SolveError::Backend(other.to_string()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait LpSolver: Send + Sync {
    /// Minimise `model`; blocking.
    fn solve(&self, model: LinearModel) -> Result<Assignment, SolveError>;

    fn name(&self) -> &'static str;
}

/// `good_lp` + `microlp` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLpSolver;

impl LpSolver for MicroLpSolver {
    fn solve(&self, model: LinearModel) -> Result<Assignment, SolveError> {
        let started = Instant::now();
        let ModelParts {
            name,
            variables,
            tracked,
            objective,
            constraints,
        } = model.into_parts();
        let constraint_count = constraints.len();

        let mut problem = variables.minimise(objective.clone()).using(microlp);
        for constraint in constraints {
            problem = problem.with(constraint);
        }
        let solution = problem.solve()?;

        let values = tracked.iter().map(|&v| (v, solution.value(v))).collect();
        let objective_value = objective.eval_with(&solution);

        debug!(
            model = %name,
            variables = tracked.len(),
            constraints = constraint_count,
            objective = objective_value,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model solved"
        );

        Ok(Assignment::new(values, objective_value))
    }

    fn name(&self) -> &'static str {
        "microlp"
    }
}
