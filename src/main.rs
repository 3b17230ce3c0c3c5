use std::sync::Arc;

use anyhow::{Context, Result};
use microgrid_dispatch::optimizer::{LpSolver, MicroLpSolver};
use microgrid_dispatch::{config, telemetry, ReschedulingCoordinator, RunStatus, Scenario};
use config::Config;
use telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    let scenario = Scenario::load(&cfg.run.scenario_path)
        .with_context(|| format!("loading {}", cfg.run.scenario_path.display()))?;

    let solver: Arc<dyn LpSolver> = Arc::new(MicroLpSolver);
    info!(
        solver = solver.name(),
        big_m = cfg.scheduler.big_m,
        outflow_offset = cfg.scheduler.outflow_offset,
        parallel = cfg.coordinator.parallel_local_solves,
        "starting community dispatch"
    );
    let coordinator =
        ReschedulingCoordinator::new(solver, cfg.local_settings(), cfg.coordinator_settings());

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(telemetry::cancel_on_shutdown(cancel.clone()));

    let result = coordinator.run(&scenario, cancel.clone()).await;
    cancel.cancel();
    watcher.await.ok();
    let result = result?;
    result
        .write_json(&cfg.run.output_path)
        .with_context(|| format!("writing {}", cfg.run.output_path.display()))?;

    match result.status {
        RunStatus::Cancelled { at_hour } => warn!(
            at_hour,
            output = %cfg.run.output_path.display(),
            "run cancelled; partial result written"
        ),
        _ => info!(
            run_id = %result.run_id,
            hours = result.completed_hours(),
            output = %cfg.run.output_path.display(),
            "run finished"
        ),
    }
    Ok(())
}
