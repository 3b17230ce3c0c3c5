use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{ScheduleError, StageContext};
use crate::optimizer::SolveError;

/// Wall-clock allowance for a single solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveBudget {
    pub limit: Duration,
    /// Multiplier applied to `limit` for the one retry
    pub retry_factor: f64,
}

impl SolveBudget {
    pub fn new(limit: Duration, retry_factor: f64) -> Self {
        Self {
            limit,
            retry_factor,
        }
    }

    pub fn retry_limit(&self) -> Duration {
        self.limit.mul_f64(self.retry_factor)
    }
}

impl Default for SolveBudget {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 2.0)
    }
}

/// Run a blocking solve on the blocking pool under `budget`.
///
/// An attempt that overruns is abandoned (the backend cannot be interrupted,
/// so its thread finishes in the background) and the solve is retried once
/// with the enlarged budget.
pub(crate) async fn solve_with_budget<T, F>(
    budget: SolveBudget,
    context: StageContext,
    job: F,
) -> Result<T, ScheduleError>
where
    T: Send + 'static,
    F: Fn() -> Result<T, SolveError> + Send + Sync + 'static,
{
    let job = Arc::new(job);
    for (attempt, limit) in [budget.limit, budget.retry_limit()].into_iter().enumerate() {
        let task = {
            let job = Arc::clone(&job);
            tokio::task::spawn_blocking(move || job())
        };
        match tokio::time::timeout(limit, task).await {
            Ok(joined) => {
                let outcome = joined.map_err(|e| ScheduleError::TaskFailed {
                    context: context.clone(),
                    message: e.to_string(),
                })?;
                return outcome.map_err(|e| ScheduleError::from_solve(context, e));
            }
            Err(_) => {
                warn!(
                    stage = %context.stage,
                    hour = context.hour,
                    microgrid = context.microgrid.as_deref().unwrap_or("-"),
                    attempt = attempt + 1,
                    budget_ms = limit.as_millis() as u64,
                    "solve exceeded its time budget"
                );
            }
        }
    }
    Err(ScheduleError::SolverTimeout { context })
}
