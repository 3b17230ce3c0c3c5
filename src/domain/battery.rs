use serde::{Deserialize, Serialize};

use super::profile::{check_fraction, check_non_negative_value, ProfileError};

/// Technical parameters of a battery behind a back-to-back (BTB) converter.
///
/// SOC is a fraction in `[0, 1]`. Losses, efficiency and self-discharge are
/// per-slot fractions; powers are kW averaged over one hourly slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySpec {
    pub capacity_kwh: f64,
    pub charge_loss: f64,
    pub discharge_loss: f64,
    /// BTB converter power cap (kW)
    pub converter_limit_kw: f64,
    /// BTB conversion efficiency
    pub efficiency: f64,
    /// Fraction of stored energy lost per slot
    pub self_discharge: f64,
    pub initial_soc: f64,
}

impl BatterySpec {
    pub fn validate(&self, field: &str) -> Result<(), ProfileError> {
        if !(self.capacity_kwh.is_finite() && self.capacity_kwh > 0.0) {
            return Err(ProfileError::OutOfRange {
                field: format!("{field}.capacity_kwh"),
                value: self.capacity_kwh,
                range: "(0, inf)",
            });
        }
        check_non_negative_value(&format!("{field}.converter_limit_kw"), self.converter_limit_kw)?;
        check_fraction(&format!("{field}.charge_loss"), self.charge_loss)?;
        check_fraction(&format!("{field}.discharge_loss"), self.discharge_loss)?;
        check_fraction(&format!("{field}.self_discharge"), self.self_discharge)?;

        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return Err(ProfileError::OutOfRange {
                field: format!("{field}.efficiency"),
                value: self.efficiency,
                range: "(0, 1]",
            });
        }
        if !(0.0..=1.0).contains(&self.initial_soc) {
            return Err(ProfileError::OutOfRange {
                field: format!("{field}.initial_soc"),
                value: self.initial_soc,
                range: "[0, 1]",
            });
        }
        Ok(())
    }

    /// Converter-side cap on charge and discharge power.
    pub fn max_power_kw(&self) -> f64 {
        self.converter_limit_kw / self.efficiency
    }

    /// Upper bound on charging power given the SOC at the end of the previous slot.
    pub fn charge_headroom_kw(&self, previous_soc: f64) -> f64 {
        self.capacity_kwh * (1.0 - previous_soc) / (1.0 - self.charge_loss) / self.efficiency
    }

    /// Upper bound on discharging power given the SOC at the end of the previous slot.
    pub fn discharge_headroom_kw(&self, previous_soc: f64) -> f64 {
        self.capacity_kwh * previous_soc * (1.0 - self.discharge_loss) * self.efficiency
    }

    /// SOC change (before self-discharge) caused by one unit of charging power.
    pub(crate) fn charge_soc_gain(&self) -> f64 {
        (1.0 - self.charge_loss) * self.efficiency / self.capacity_kwh
    }

    /// SOC change (before self-discharge) caused by one unit of discharging power.
    pub(crate) fn discharge_soc_cost(&self) -> f64 {
        1.0 / ((1.0 - self.discharge_loss) * self.efficiency) / self.capacity_kwh
    }

    /// SOC at the end of a slot, after self-discharge.
    pub fn next_soc(&self, previous_soc: f64, charge_kw: f64, discharge_kw: f64) -> f64 {
        let before = previous_soc - discharge_kw * self.discharge_soc_cost()
            + charge_kw * self.charge_soc_gain();
        (1.0 - self.self_discharge) * before
    }
}

/// Solved battery schedule over a horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryTrajectory {
    pub charge_kw: Vec<f64>,
    pub discharge_kw: Vec<f64>,
    /// SOC before self-discharge is applied
    pub soc_before_self_discharge: Vec<f64>,
    pub soc: Vec<f64>,
}

impl BatteryTrajectory {
    /// Discharge minus charge at slot `t` (positive = feeding the bus).
    pub fn net_discharge_kw(&self, t: usize) -> f64 {
        self.discharge_kw[t] - self.charge_kw[t]
    }
}
