//! Microgrid (local) scheduling model
//!
//! One mixed-integer program per microgrid covering the whole horizon:
//! unit commitment for the CDGs, the battery, the load-shifting network and
//! the utility exchange. In rescheduling mode one slot is pinned to decisions
//! already committed with the community and the remaining slots are
//! re-optimised around it.
//!
//! ```text
//! minimise   Σ_i,t c[i,t]·P[i,t] + SU[i]·y[i,t]
//!          + Σ_t buy[t]·short[t] − sell[t]·sur[t]
//!          + Σ_a≠b pen[a,b]·sh[a,b]
//!          (+ rec_price·rec − send_price·send   in the pinned slot)
//!
//! s.t.  Pmin·u ≤ P ≤ Pmax·u
//!       y ≥ u[t] − u[t−1]
//!       y − M(1 − i1) ≤ u[t] − u[t−1],  y − M(1 − i2) ≤ 0,  i1 + i2 ≥ 1
//!       pv + wt + ΣP + short + dis (+ rec) = adj + sur + ch (+ send)
//!       Σ_b sh[b,t] ≤ IF[t],  Σ_b sh[t,b] ≤ OF[t]
//!       adj[t] = load[t] (+ OF[t]) + Σ_b sh[b,t] − Σ_b sh[t,b]
//!       battery dynamics (see `battery.rs`)
//! ```

use std::sync::Arc;

use good_lp::{constraint, variable, Expression, Variable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::battery::BatteryVariables;
use super::model::{Assignment, LinearModel};
use super::solver::{LpSolver, SolveError};
use crate::domain::{
    CommunityExchange, DispatchSolution, GeneratorSpec, LoadShift, StaticProfile, TimeHorizon,
    UnitDispatch,
};

/// Flows below this are reported as no shift at all.
const FLOW_EPSILON: f64 = 1e-7;

/// Knobs of the local formulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Big-M of the startup linearization; any value >= 2 is exact for binary states
    pub big_m: f64,
    /// Add the outflow cap of each slot to its adjusted load
    pub outflow_offset: bool,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            big_m: 10.0,
            outflow_offset: false,
        }
    }
}

/// Decisions already committed for one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedDecisions {
    pub slot: usize,
    /// Local commitment plus community adjustment, one entry per generator
    pub unit_output_kw: Vec<f64>,
    pub battery_charge_kw: f64,
    pub battery_discharge_kw: f64,
    pub adjusted_load_kw: f64,
    pub utility_buy_kw: f64,
    pub utility_sell_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScheduleMode {
    Baseline,
    Rescheduling(FixedDecisions),
}

impl ScheduleMode {
    pub fn label(&self) -> &'static str {
        match self {
            ScheduleMode::Baseline => "baseline",
            ScheduleMode::Rescheduling(_) => "rescheduling",
        }
    }
}

struct UnitVariables {
    output: Vec<Variable>,
    on: Vec<Variable>,
    startup: Vec<Variable>,
}

impl UnitVariables {
    fn add(
        model: &mut LinearModel,
        spec: &GeneratorSpec,
        horizon: TimeHorizon,
        big_m: f64,
    ) -> Self {
        let n = horizon.len();
        let output = model.add_vector(variable().min(0.0).max(spec.max_output_kw), n);
        let on = model.add_vector(variable().binary(), n);
        let startup = model.add_vector(variable().binary(), n);
        let first_aux = model.add_vector(variable().binary(), n);
        let second_aux = model.add_vector(variable().binary(), n);
        let initial = if spec.initially_on { 1.0 } else { 0.0 };

        for t in horizon.slots() {
            model.constrain(constraint!(output[t] >= spec.min_output_kw * on[t]));
            model.constrain(constraint!(output[t] <= spec.max_output_kw * on[t]));

            // startup[t] = max(on[t] - on[t-1], 0) without a max operator
            let switched_on: Expression = match horizon.previous(t) {
                Some(p) => on[t] - on[p],
                None => Expression::from(on[t]) - initial,
            };
            model.constrain(constraint!(startup[t] >= switched_on.clone()));
            model.constrain(constraint!(
                startup[t] + big_m * first_aux[t] <= switched_on + big_m
            ));
            model.constrain(constraint!(startup[t] + big_m * second_aux[t] <= big_m));
            model.constrain(constraint!(first_aux[t] + second_aux[t] >= 1.0));

            model.add_cost(spec.marginal_cost[t] * output[t] + spec.startup_cost * startup[t]);
        }

        Self {
            output,
            on,
            startup,
        }
    }

    fn read(&self, assignment: &Assignment) -> UnitDispatch {
        UnitDispatch {
            output_kw: assignment.values(&self.output),
            on: self.on.iter().map(|v| assignment.is_set(*v)).collect(),
            startup: self.startup.iter().map(|v| assignment.is_set(*v)).collect(),
        }
    }
}

struct ShiftArc {
    from: usize,
    to: usize,
    flow: Variable,
}

struct CommunityVariables {
    slot: usize,
    receive: Variable,
    send: Variable,
}

struct LocalVariables {
    units: Vec<UnitVariables>,
    battery: Option<BatteryVariables>,
    arcs: Vec<ShiftArc>,
    adjusted_load: Vec<Variable>,
    shortage: Vec<Variable>,
    surplus: Vec<Variable>,
    community: Option<CommunityVariables>,
}

impl LocalVariables {
    fn read(&self, profile: &StaticProfile, assignment: &Assignment) -> DispatchSolution {
        let n = profile.horizon().len();
        let community = self.community.as_ref().map(|c| {
            let mut exchange = CommunityExchange {
                receive_kw: vec![0.0; n],
                send_kw: vec![0.0; n],
            };
            exchange.receive_kw[c.slot] = assignment.value(c.receive);
            exchange.send_kw[c.slot] = assignment.value(c.send);
            exchange
        });

        DispatchSolution {
            microgrid: profile.id.clone(),
            units: self.units.iter().map(|u| u.read(assignment)).collect(),
            battery: self.battery.as_ref().map(|b| b.read(assignment)),
            shifted_load: self
                .arcs
                .iter()
                .map(|arc| LoadShift {
                    from: arc.from,
                    to: arc.to,
                    power_kw: assignment.value(arc.flow),
                })
                .filter(|shift| shift.power_kw > FLOW_EPSILON)
                .collect(),
            adjusted_load_kw: assignment.values(&self.adjusted_load),
            shortage_kw: assignment.values(&self.shortage),
            surplus_kw: assignment.values(&self.surplus),
            community,
            objective: assignment.objective(),
        }
    }
}

/// Builds and solves the per-microgrid dispatch model.
pub struct LocalScheduler {
    solver: Arc<dyn LpSolver>,
    settings: LocalSettings,
}

impl LocalScheduler {
    pub fn new(solver: Arc<dyn LpSolver>, settings: LocalSettings) -> Self {
        Self { solver, settings }
    }

    pub fn settings(&self) -> &LocalSettings {
        &self.settings
    }

    /// Minimise the microgrid's cost over the full horizon of `profile`.
    ///
    /// The profile is expected to have passed [`StaticProfile::validate`].
    pub fn schedule(
        &self,
        profile: &StaticProfile,
        mode: &ScheduleMode,
    ) -> Result<DispatchSolution, SolveError> {
        let (model, variables) = self.build(profile, mode)?;
        debug!(
            microgrid = %profile.id,
            mode = mode.label(),
            variables = model.variable_count(),
            constraints = model.constraint_count(),
            "solving local model"
        );
        let assignment = self.solver.solve(model)?;
        Ok(variables.read(profile, &assignment))
    }

    fn build(
        &self,
        profile: &StaticProfile,
        mode: &ScheduleMode,
    ) -> Result<(LinearModel, LocalVariables), SolveError> {
        let horizon = profile.horizon();
        let n = horizon.len();
        let mut model = LinearModel::new(format!("local:{}:{}", profile.id, mode.label()));

        let units: Vec<UnitVariables> = profile
            .generators
            .iter()
            .map(|spec| UnitVariables::add(&mut model, spec, horizon, self.settings.big_m))
            .collect();

        let battery = profile
            .battery
            .as_ref()
            .map(|spec| BatteryVariables::add(&mut model, spec, horizon));

        let shift = &profile.load_shift;
        let mut arcs = Vec::new();
        for (from, to) in horizon.ordered_pairs() {
            if !shift.arc_open(from, to) {
                continue;
            }
            let flow = model.add(variable().min(0.0));
            let penalty = shift.penalty(from, to);
            if penalty != 0.0 {
                model.add_cost(penalty * flow);
            }
            arcs.push(ShiftArc { from, to, flow });
        }

        let adjusted_load = model.add_vector(variable().min(0.0), n);
        let mut import = variable().min(0.0);
        if let Some(limit) = profile.tariff.import_limit_kw {
            import = import.max(limit);
        }
        let mut export = variable().min(0.0);
        if let Some(limit) = profile.tariff.export_limit_kw {
            export = export.max(limit);
        }
        let shortage = model.add_vector(import, n);
        let surplus = model.add_vector(export, n);

        let community = match mode {
            ScheduleMode::Baseline => None,
            ScheduleMode::Rescheduling(fixed) => {
                if fixed.slot >= n {
                    return Err(SolveError::InvalidModel(format!(
                        "pinned slot {} outside a {n}-slot horizon",
                        fixed.slot
                    )));
                }
                let receive = model.add(variable().min(0.0));
                let send = model.add(variable().min(0.0));
                model.add_cost(
                    profile.receive_price(fixed.slot) * receive
                        - profile.send_price(fixed.slot) * send,
                );
                Some(CommunityVariables {
                    slot: fixed.slot,
                    receive,
                    send,
                })
            }
        };

        for t in horizon.slots() {
            model.add_cost(
                profile.tariff.buy_price[t] * shortage[t] - profile.tariff.sell_price[t] * surplus[t],
            );

            let inbound: Vec<Variable> = arcs.iter().filter(|a| a.to == t).map(|a| a.flow).collect();
            let outbound: Vec<Variable> = arcs.iter().filter(|a| a.from == t).map(|a| a.flow).collect();
            let inflow: Expression = inbound.iter().map(|&v| Expression::from(v)).sum();
            let outflow: Expression = outbound.iter().map(|&v| Expression::from(v)).sum();
            if !inbound.is_empty() {
                model.constrain(constraint!(inflow.clone() <= shift.inflow_cap_kw[t]));
            }
            if !outbound.is_empty() {
                model.constrain(constraint!(outflow.clone() <= shift.outflow_cap_kw[t]));
            }

            let mut base_load = profile.fixed_load_kw[t];
            if self.settings.outflow_offset {
                base_load += shift.outflow_cap_kw[t];
            }
            model.constrain(constraint!(adjusted_load[t] == inflow - outflow + base_load));

            let mut supply = Expression::from(profile.renewable_kw(t)) + shortage[t];
            let mut demand = Expression::from(adjusted_load[t]) + surplus[t];
            for unit in &units {
                supply += unit.output[t];
            }
            if let Some(battery) = &battery {
                supply += battery.discharge[t];
                demand += battery.charge[t];
            }
            if let Some(c) = community.as_ref().filter(|c| c.slot == t) {
                supply += c.receive;
                demand += c.send;
            }
            model.constrain(constraint!(supply == demand));
        }

        let variables = LocalVariables {
            units,
            battery,
            arcs,
            adjusted_load,
            shortage,
            surplus,
            community,
        };

        if let ScheduleMode::Rescheduling(fixed) = mode {
            pin_slot(&mut model, &variables, fixed)?;
        }

        Ok((model, variables))
    }
}

/// Equality constraints holding the committed decisions of one slot.
fn pin_slot(
    model: &mut LinearModel,
    variables: &LocalVariables,
    fixed: &FixedDecisions,
) -> Result<(), SolveError> {
    let s = fixed.slot;
    if fixed.unit_output_kw.len() != variables.units.len() {
        return Err(SolveError::InvalidModel(format!(
            "{} pinned unit outputs for {} generators",
            fixed.unit_output_kw.len(),
            variables.units.len()
        )));
    }
    for (unit, &output) in variables.units.iter().zip(&fixed.unit_output_kw) {
        model.constrain(constraint!(unit.output[s] == output));
    }

    match &variables.battery {
        Some(battery) => {
            model.constrain(constraint!(battery.charge[s] == fixed.battery_charge_kw));
            model.constrain(constraint!(battery.discharge[s] == fixed.battery_discharge_kw));
        }
        None if fixed.battery_charge_kw != 0.0 || fixed.battery_discharge_kw != 0.0 => {
            return Err(SolveError::InvalidModel(
                "battery flow pinned on a microgrid without battery".into(),
            ));
        }
        None => {}
    }

    model.constrain(constraint!(variables.adjusted_load[s] == fixed.adjusted_load_kw));
    model.constrain(constraint!(variables.shortage[s] == fixed.utility_buy_kw));
    model.constrain(constraint!(variables.surplus[s] == fixed.utility_sell_kw));
    Ok(())
}
