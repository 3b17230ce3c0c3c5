use serde::{Deserialize, Serialize};

use super::BatteryTrajectory;

/// Schedule of one generator over the horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDispatch {
    pub output_kw: Vec<f64>,
    pub on: Vec<bool>,
    pub startup: Vec<bool>,
}

/// Load moved from one slot to another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadShift {
    pub from: usize,
    pub to: usize,
    pub power_kw: f64,
}

/// Power exchanged with the rest of the community (rescheduling mode only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityExchange {
    pub receive_kw: Vec<f64>,
    pub send_kw: Vec<f64>,
}

impl CommunityExchange {
    /// Receive minus send at slot `t`.
    pub fn net_kw(&self, t: usize) -> f64 {
        self.receive_kw[t] - self.send_kw[t]
    }
}

/// Decision outputs of one solved local model.
///
/// Produced once per solve and never mutated; a later rescheduling solve for
/// the same hour supersedes it with a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSolution {
    pub microgrid: String,
    pub units: Vec<UnitDispatch>,
    pub battery: Option<BatteryTrajectory>,
    /// Only arcs carrying a positive flow
    pub shifted_load: Vec<LoadShift>,
    pub adjusted_load_kw: Vec<f64>,
    /// Power bought from the utility
    pub shortage_kw: Vec<f64>,
    /// Power sold to the utility
    pub surplus_kw: Vec<f64>,
    pub community: Option<CommunityExchange>,
    pub objective: f64,
}

impl DispatchSolution {
    pub fn slots(&self) -> usize {
        self.adjusted_load_kw.len()
    }

    /// Total controllable generation at slot `t`.
    pub fn generation_kw(&self, t: usize) -> f64 {
        self.units.iter().map(|unit| unit.output_kw[t]).sum()
    }

    pub fn battery_charge_kw(&self, t: usize) -> f64 {
        self.battery.as_ref().map_or(0.0, |b| b.charge_kw[t])
    }

    pub fn battery_discharge_kw(&self, t: usize) -> f64 {
        self.battery.as_ref().map_or(0.0, |b| b.discharge_kw[t])
    }

    pub fn community_net_kw(&self, t: usize) -> f64 {
        self.community.as_ref().map_or(0.0, |c| c.net_kw(t))
    }
}
