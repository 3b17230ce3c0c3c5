//! Community (DSO) scheduling model
//!
//! Balances the microgrids' surpluses and shortages for the whole horizon
//! using the community generator, the shared battery, the utility and the
//! generator adjustments each microgrid offered through its
//! [`CoordinationSignal`]s. Priced with the DSO's utility tariff.

use std::sync::Arc;

use good_lp::{constraint, variable, Expression, Variable};
use itertools::Itertools;
use tracing::debug;

use super::battery::BatteryVariables;
use super::model::LinearModel;
use super::solver::{LpSolver, SolveError};
use crate::domain::{
    CoordinationSignal, DsoProfile, GlobalDecision, MemberDecision, StaticProfile, TimeHorizon,
};

/// One microgrid's input to the community model.
#[derive(Debug, Clone)]
pub struct MemberSignals {
    pub profile: Arc<StaticProfile>,
    /// One signal per slot
    pub signals: Vec<CoordinationSignal>,
}

struct MemberVariables {
    /// `[unit][slot]`
    adjustment: Vec<Vec<Variable>>,
    buy: Vec<Variable>,
    sell: Vec<Variable>,
}

pub struct GlobalScheduler {
    solver: Arc<dyn LpSolver>,
}

impl GlobalScheduler {
    pub fn new(solver: Arc<dyn LpSolver>) -> Self {
        Self { solver }
    }

    pub fn schedule(
        &self,
        dso: &DsoProfile,
        members: &[MemberSignals],
    ) -> Result<GlobalDecision, SolveError> {
        let horizon = TimeHorizon::new(dso.generator.marginal_cost.len());
        let n = horizon.len();
        for member in members {
            if member.signals.len() != n {
                return Err(SolveError::InvalidModel(format!(
                    "{} sent {} signals for a {n}-slot horizon",
                    member.profile.id,
                    member.signals.len()
                )));
            }
            if let Some(t) = member
                .signals
                .iter()
                .position(|s| s.bands.len() != member.profile.generators.len())
            {
                return Err(SolveError::InvalidModel(format!(
                    "{} band count at slot {t} does not match its generators",
                    member.profile.id
                )));
            }
        }

        let mut model = LinearModel::new("global");
        let generator = &dso.generator;
        let output = model.add_vector(
            variable()
                .min(generator.min_output_kw)
                .max(generator.max_output_kw),
            n,
        );

        let member_vars: Vec<MemberVariables> = members
            .iter()
            .map(|member| {
                let profile = &member.profile;
                let adjustment = (0..profile.generators.len())
                    .map(|unit| {
                        horizon
                            .slots()
                            .map(|t| {
                                let band = member.signals[t].bands[unit];
                                model.add(variable().min(band.min_kw).max(band.max_kw))
                            })
                            .collect_vec()
                    })
                    .collect_vec();
                let mut buy = variable().min(0.0);
                if let Some(limit) = profile.tariff.import_limit_kw {
                    buy = buy.max(limit);
                }
                let mut sell = variable().min(0.0);
                if let Some(limit) = profile.tariff.export_limit_kw {
                    sell = sell.max(limit);
                }
                MemberVariables {
                    adjustment,
                    buy: model.add_vector(buy, n),
                    sell: model.add_vector(sell, n),
                }
            })
            .collect();

        let battery = dso
            .battery
            .as_ref()
            .map(|spec| BatteryVariables::add(&mut model, spec, horizon));

        for t in horizon.slots() {
            model.add_cost(generator.marginal_cost[t] * output[t]);

            let mut supply = Expression::from(output[t]);
            let mut demand = Expression::from(0.0);
            for (member, vars) in members.iter().zip(&member_vars) {
                let signal = &member.signals[t];
                for (spec, adjustment) in member.profile.generators.iter().zip(&vars.adjustment) {
                    model.add_cost(spec.marginal_cost[t] * adjustment[t]);
                    supply += adjustment[t];
                }
                model.add_cost(
                    dso.tariff.buy_price[t] * vars.buy[t] - dso.tariff.sell_price[t] * vars.sell[t],
                );
                supply += vars.buy[t];
                demand += vars.sell[t];
                supply += signal.surplus_kw;
                demand += signal.shortage_kw;
            }
            if let Some(battery) = &battery {
                supply += battery.injection(t);
            }
            model.constrain(constraint!(supply == demand));
        }

        debug!(
            members = members.len(),
            variables = model.variable_count(),
            constraints = model.constraint_count(),
            "solving global model"
        );
        let assignment = self.solver.solve(model)?;

        Ok(GlobalDecision {
            community_output_kw: assignment.values(&output),
            members: members
                .iter()
                .zip(&member_vars)
                .map(|(member, vars)| MemberDecision {
                    microgrid: member.profile.id.clone(),
                    adjustment_kw: vars
                        .adjustment
                        .iter()
                        .map(|unit| assignment.values(unit))
                        .collect(),
                    buy_kw: assignment.values(&vars.buy),
                    sell_kw: assignment.values(&vars.sell),
                })
                .collect(),
            battery: battery.as_ref().map(|b| b.read(&assignment)),
            objective: assignment.objective(),
        })
    }
}
