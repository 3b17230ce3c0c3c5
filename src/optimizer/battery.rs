//! Battery constraints shared by the microgrid and community models.

use good_lp::{constraint, variable, Expression, Variable};

use super::model::{Assignment, LinearModel};
use crate::domain::{BatterySpec, BatteryTrajectory, TimeHorizon};

pub(crate) struct BatteryVariables {
    pub charge: Vec<Variable>,
    pub discharge: Vec<Variable>,
    pub soc_before: Vec<Variable>,
    pub soc: Vec<Variable>,
}

impl BatteryVariables {
    /// Add charge/discharge/SOC variables for every slot and tie them together.
    ///
    /// For slot `t` with `prev` = SOC at the end of `t-1` (initial SOC for `t = 0`):
    /// - `charge <= cap * (1 - prev) / (1 - loss_ch) / eta`
    /// - `discharge <= cap * prev * (1 - loss_dis) * eta`
    /// - `charge, discharge <= btb / eta`
    /// - `soc_before = prev - (discharge / ((1 - loss_dis) * eta) - charge * (1 - loss_ch) * eta) / cap`
    /// - `soc = (1 - delta) * soc_before`
    pub fn add(model: &mut LinearModel, spec: &BatterySpec, horizon: TimeHorizon) -> Self {
        let n = horizon.len();
        let power = variable().min(0.0).max(spec.max_power_kw());
        let fraction = variable().min(0.0).max(1.0);

        let charge = model.add_vector(power.clone(), n);
        let discharge = model.add_vector(power, n);
        let soc_before = model.add_vector(fraction.clone(), n);
        let soc = model.add_vector(fraction, n);

        let charge_scale = spec.charge_headroom_kw(0.0);
        let discharge_scale = spec.discharge_headroom_kw(1.0);
        let gain = spec.charge_soc_gain();
        let cost = spec.discharge_soc_cost();
        let retention = 1.0 - spec.self_discharge;

        for t in horizon.slots() {
            let prev: Expression = match horizon.previous(t) {
                Some(p) => soc[p].into(),
                None => Expression::from(spec.initial_soc),
            };

            model.constrain(constraint!(
                charge[t] <= charge_scale - charge_scale * prev.clone()
            ));
            model.constrain(constraint!(discharge[t] <= discharge_scale * prev.clone()));
            model.constrain(constraint!(
                soc_before[t] == prev - cost * discharge[t] + gain * charge[t]
            ));
            model.constrain(constraint!(soc[t] == retention * soc_before[t]));
        }

        Self {
            charge,
            discharge,
            soc_before,
            soc,
        }
    }

    /// Discharge minus charge at slot `t`.
    pub fn injection(&self, t: usize) -> Expression {
        self.discharge[t] - self.charge[t]
    }

    pub fn read(&self, assignment: &Assignment) -> BatteryTrajectory {
        BatteryTrajectory {
            charge_kw: assignment.values(&self.charge),
            discharge_kw: assignment.values(&self.discharge),
            soc_before_self_discharge: assignment.values(&self.soc_before),
            soc: assignment.values(&self.soc),
        }
    }
}
