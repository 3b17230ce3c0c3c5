use serde::{Deserialize, Serialize};

use super::BatteryTrajectory;

/// Range the community may move a generator's output, relative to its local commitment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustableBand {
    pub min_kw: f64,
    pub max_kw: f64,
}

impl AdjustableBand {
    pub const FIXED: AdjustableBand = AdjustableBand { min_kw: 0.0, max_kw: 0.0 };

    pub fn is_fixed(&self) -> bool {
        self.min_kw == 0.0 && self.max_kw == 0.0
    }

    pub fn contains(&self, adjustment_kw: f64) -> bool {
        self.min_kw <= adjustment_kw && adjustment_kw <= self.max_kw
    }
}

/// What a microgrid offers the community for one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationSignal {
    pub surplus_kw: f64,
    pub shortage_kw: f64,
    /// One band per generator
    pub bands: Vec<AdjustableBand>,
}

/// A microgrid's decisions from the community model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDecision {
    pub microgrid: String,
    /// `adjustment_kw[unit][slot]`; positive raises output
    pub adjustment_kw: Vec<Vec<f64>>,
    pub buy_kw: Vec<f64>,
    pub sell_kw: Vec<f64>,
}

impl MemberDecision {
    pub fn utility_net_kw(&self, t: usize) -> f64 {
        self.buy_kw[t] - self.sell_kw[t]
    }
}

/// Outcome of one community (DSO) solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDecision {
    pub community_output_kw: Vec<f64>,
    /// Same order as the microgrids handed to the scheduler
    pub members: Vec<MemberDecision>,
    pub battery: Option<BatteryTrajectory>,
    pub objective: f64,
}
