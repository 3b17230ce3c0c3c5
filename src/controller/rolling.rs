//! Hour-by-hour local/global coordination over one planning horizon.

use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::budget::{solve_with_budget, SolveBudget};
use super::result::{HourEntry, HourRecord, RollingResult, RunStatus};
use crate::domain::{
    DispatchSolution, GeneratorSpec, GlobalDecision, MemberDecision, ProfileError, StaticProfile,
    TimeHorizon,
};
use crate::error::{ScheduleError, Stage, StageContext};
use crate::optimizer::{
    CoordinationInfoExtractor, FixedDecisions, GlobalScheduler, LocalScheduler, LocalSettings,
    LpSolver, MemberSignals, ScheduleMode,
};
use crate::scenario::{CommunitySnapshot, ProfileFeed};

/// Pinned values closer to zero than this are committed as zero.
const SNAP_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorSettings {
    pub parallel_local_solves: bool,
    pub budget: SolveBudget,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            parallel_local_solves: true,
            budget: SolveBudget::default(),
        }
    }
}

pub struct ReschedulingCoordinator {
    local: Arc<LocalScheduler>,
    global: Arc<GlobalScheduler>,
    settings: CoordinatorSettings,
}

impl ReschedulingCoordinator {
    pub fn new(
        solver: Arc<dyn LpSolver>,
        local: LocalSettings,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            local: Arc::new(LocalScheduler::new(Arc::clone(&solver), local)),
            global: Arc::new(GlobalScheduler::new(solver)),
            settings,
        }
    }

    /// Run every hour of the feed's horizon.
    ///
    /// Stops at the first failing stage. On cancellation the hour in flight is
    /// dropped and the hours committed so far are returned.
    pub async fn run(
        &self,
        feed: &dyn ProfileFeed,
        cancel: CancellationToken,
    ) -> Result<RollingResult, ScheduleError> {
        let horizon = feed.horizon();
        if horizon.is_empty() {
            return Err(ScheduleError::InputInconsistency {
                context: StageContext::for_microgrid(Stage::Validate, 0, "dso"),
                source: ProfileError::EmptyHorizon,
            });
        }
        let mut result = RollingResult::new(horizon.len());
        info!(run_id = %result.run_id, hours = horizon.len(), "rolling-horizon run started");

        for hour in horizon.slots() {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(result, hour));
            }
            let started = Instant::now();
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.cancelled(result, hour)),
                record = self.run_hour(feed, horizon, hour) => record?,
            };
            result.commit(record);
            info!(
                hour,
                stage = %Stage::Commit,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "hour committed"
            );
        }

        let result = result.finish(RunStatus::Completed);
        info!(run_id = %result.run_id, hours = result.completed_hours(), "rolling-horizon run completed");
        Ok(result)
    }

    fn cancelled(&self, result: RollingResult, hour: usize) -> RollingResult {
        warn!(run_id = %result.run_id, hour, "run cancelled; hour discarded");
        result.finish(RunStatus::Cancelled { at_hour: hour })
    }

    async fn run_hour(
        &self,
        feed: &dyn ProfileFeed,
        horizon: TimeHorizon,
        hour: usize,
    ) -> Result<HourRecord, ScheduleError> {
        let snapshot = feed
            .snapshot(hour)
            .await
            .map_err(|e| ScheduleError::Feed {
                context: StageContext::new(Stage::Feed, hour),
                message: e.to_string(),
            })?;
        validate_snapshot(&snapshot, horizon, hour)?;

        let baseline_modes = vec![ScheduleMode::Baseline; snapshot.microgrids.len()];
        let baselines = self
            .solve_locals(Stage::LocalSolve, hour, &snapshot.microgrids, baseline_modes)
            .await?;

        let members: Vec<MemberSignals> = snapshot
            .microgrids
            .iter()
            .zip(&baselines)
            .map(|(profile, solution)| MemberSignals {
                profile: Arc::clone(profile),
                signals: CoordinationInfoExtractor::extract(profile, solution),
            })
            .collect();
        debug!(hour, stage = %Stage::Extract, members = members.len(), "coordination signals extracted");

        let decision = self.solve_global(hour, &snapshot, members).await?;

        let rescheduling_modes = snapshot
            .microgrids
            .iter()
            .zip(&baselines)
            .zip(&decision.members)
            .map(|((profile, baseline), member)| {
                ScheduleMode::Rescheduling(pinned_decisions(profile, baseline, member, hour))
            })
            .collect();
        let rescheduled = self
            .solve_locals(Stage::Reschedule, hour, &snapshot.microgrids, rescheduling_modes)
            .await?;

        Ok(HourRecord {
            hour,
            community_output_kw: decision.community_output_kw[hour],
            community_battery_kw: decision
                .battery
                .as_ref()
                .map_or(0.0, |b| b.net_discharge_kw(hour)),
            entries: rescheduled
                .iter()
                .map(|solution| HourEntry {
                    microgrid: solution.microgrid.clone(),
                    load_kw: solution.adjusted_load_kw[hour],
                    generation_kw: solution.generation_kw(hour),
                    battery_kw: solution.battery_discharge_kw(hour)
                        - solution.battery_charge_kw(hour),
                    utility_kw: solution.shortage_kw[hour] - solution.surplus_kw[hour],
                    community_kw: solution.community_net_kw(hour),
                })
                .collect(),
        })
    }

    async fn solve_locals(
        &self,
        stage: Stage,
        hour: usize,
        profiles: &[Arc<StaticProfile>],
        modes: Vec<ScheduleMode>,
    ) -> Result<Vec<DispatchSolution>, ScheduleError> {
        let started = Instant::now();
        let jobs = profiles.iter().cloned().zip(modes).map(|(profile, mode)| {
            let local = Arc::clone(&self.local);
            let context = StageContext::for_microgrid(stage, hour, profile.id.clone());
            solve_with_budget(self.settings.budget, context, move || {
                local.schedule(&profile, &mode)
            })
        });

        let solutions = if self.settings.parallel_local_solves {
            try_join_all(jobs).await?
        } else {
            let mut solutions = Vec::with_capacity(profiles.len());
            for job in jobs {
                solutions.push(job.await?);
            }
            solutions
        };

        for solution in &solutions {
            debug!(
                hour,
                stage = %stage,
                microgrid = %solution.microgrid,
                objective = solution.objective,
                "local schedule ready"
            );
        }
        info!(
            hour,
            stage = %stage,
            microgrids = solutions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "local solves finished"
        );
        Ok(solutions)
    }

    async fn solve_global(
        &self,
        hour: usize,
        snapshot: &CommunitySnapshot,
        members: Vec<MemberSignals>,
    ) -> Result<GlobalDecision, ScheduleError> {
        let started = Instant::now();
        let global = Arc::clone(&self.global);
        let dso = Arc::clone(&snapshot.dso);
        let context = StageContext::for_microgrid(Stage::GlobalSolve, hour, "dso");
        let decision = solve_with_budget(self.settings.budget, context, move || {
            global.schedule(&dso, &members)
        })
        .await?;
        info!(
            hour,
            stage = %Stage::GlobalSolve,
            objective = decision.objective,
            community_output_kw = decision.community_output_kw[hour],
            elapsed_ms = started.elapsed().as_millis() as u64,
            "global schedule ready"
        );
        Ok(decision)
    }
}

fn validate_snapshot(
    snapshot: &CommunitySnapshot,
    horizon: TimeHorizon,
    hour: usize,
) -> Result<(), ScheduleError> {
    snapshot
        .dso
        .validate(horizon)
        .map_err(|source| ScheduleError::InputInconsistency {
            context: StageContext::for_microgrid(Stage::Validate, hour, "dso"),
            source,
        })?;
    for profile in &snapshot.microgrids {
        profile
            .validate(horizon)
            .map_err(|source| ScheduleError::InputInconsistency {
                context: StageContext::for_microgrid(Stage::Validate, hour, profile.id.clone()),
                source,
            })?;
    }
    Ok(())
}

fn snap(value: f64, upper: f64) -> f64 {
    if value < SNAP_EPSILON {
        0.0
    } else {
        value.min(upper)
    }
}

fn snap_output(value: f64, spec: &GeneratorSpec) -> f64 {
    if value < SNAP_EPSILON {
        0.0
    } else {
        value.clamp(spec.min_output_kw, spec.max_output_kw)
    }
}

/// Decisions for `hour`: local commitment plus community adjustment,
/// baseline battery and load, community utility exchange.
fn pinned_decisions(
    profile: &StaticProfile,
    baseline: &DispatchSolution,
    member: &MemberDecision,
    hour: usize,
) -> FixedDecisions {
    let unit_output_kw = profile
        .generators
        .iter()
        .zip(&baseline.units)
        .zip(&member.adjustment_kw)
        .map(|((spec, unit), adjustment)| snap_output(unit.output_kw[hour] + adjustment[hour], spec))
        .collect();
    let battery_power = profile.battery.as_ref().map_or(0.0, |b| b.max_power_kw());

    FixedDecisions {
        slot: hour,
        unit_output_kw,
        battery_charge_kw: snap(baseline.battery_charge_kw(hour), battery_power),
        battery_discharge_kw: snap(baseline.battery_discharge_kw(hour), battery_power),
        adjusted_load_kw: snap(baseline.adjusted_load_kw[hour], f64::INFINITY),
        utility_buy_kw: snap(
            member.buy_kw[hour],
            profile.tariff.import_limit_kw.unwrap_or(f64::INFINITY),
        ),
        utility_sell_kw: snap(
            member.sell_kw[hour],
            profile.tariff.export_limit_kw.unwrap_or(f64::INFINITY),
        ),
    }
}
