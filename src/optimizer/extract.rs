use crate::domain::{AdjustableBand, CoordinationSignal, DispatchSolution, StaticProfile};

/// Derives what each microgrid can offer the community from its local schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinationInfoExtractor;

impl CoordinationInfoExtractor {
    /// One signal per slot of `solution`.
    pub fn extract(profile: &StaticProfile, solution: &DispatchSolution) -> Vec<CoordinationSignal> {
        (0..solution.slots())
            .map(|t| {
                // battery flows stay pinned when the slot is rescheduled, so they count here
                let diff = solution.generation_kw(t) + profile.renewable_kw(t)
                    + solution.battery_discharge_kw(t)
                    - solution.battery_charge_kw(t)
                    - solution.adjusted_load_kw[t];
                let (surplus_kw, shortage_kw) = if diff > 0.0 {
                    (diff, 0.0)
                } else {
                    (0.0, 0.0 - diff)
                };

                let bands = profile
                    .generators
                    .iter()
                    .zip(&solution.units)
                    .map(|(spec, unit)| {
                        let output = unit.output_kw[t];
                        let eligible = profile.tariff.in_price_corridor(t, spec.marginal_cost[t]);
                        // an off unit with a minimum output cannot move without being committed
                        let stuck_off = !unit.on[t] && spec.min_output_kw > 0.0;
                        if eligible && !stuck_off {
                            AdjustableBand {
                                min_kw: spec.min_output_kw - output,
                                max_kw: spec.max_output_kw - output,
                            }
                        } else {
                            AdjustableBand::FIXED
                        }
                    })
                    .collect();

                CoordinationSignal {
                    surplus_kw,
                    shortage_kw,
                    bands,
                }
            })
            .collect()
    }
}
