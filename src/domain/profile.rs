use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BatterySpec, TimeHorizon};

/// Invariant violations found while validating a profile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("horizon must contain at least one slot")]
    EmptyHorizon,
    #[error("`{field}` has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },
    #[error("`{field}` = {value} is outside {range}")]
    OutOfRange {
        field: String,
        value: f64,
        range: &'static str,
    },
    #[error("`{field}`: lower bound {min} exceeds upper bound {max}")]
    InvertedBounds { field: String, min: f64, max: f64 },
    #[error("sell price {sell} exceeds buy price {buy} at slot {slot}")]
    PriceInversion { slot: usize, buy: f64, sell: f64 },
    #[error("microgrid id must not be empty")]
    MissingId,
}

pub(crate) fn check_len(field: &str, values: &[f64], expected: usize) -> Result<(), ProfileError> {
    if values.len() != expected {
        return Err(ProfileError::LengthMismatch {
            field: field.to_string(),
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_non_negative_value(field: &str, value: f64) -> Result<(), ProfileError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(ProfileError::OutOfRange {
            field: field.to_string(),
            value,
            range: "[0, inf)",
        });
    }
    Ok(())
}

pub(crate) fn check_non_negative(field: &str, values: &[f64]) -> Result<(), ProfileError> {
    for (t, value) in values.iter().enumerate() {
        check_non_negative_value(&format!("{field}[{t}]"), *value)?;
    }
    Ok(())
}

/// Loss and self-discharge fractions live in `[0, 1)`.
pub(crate) fn check_fraction(field: &str, value: f64) -> Result<(), ProfileError> {
    if !(0.0..1.0).contains(&value) {
        return Err(ProfileError::OutOfRange {
            field: field.to_string(),
            value,
            range: "[0, 1)",
        });
    }
    Ok(())
}

fn check_series(field: &str, values: &[f64], horizon: TimeHorizon) -> Result<(), ProfileError> {
    check_len(field, values, horizon.len())?;
    check_non_negative(field, values)
}

/// Controllable distributed generator (CDG).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    /// Marginal cost per kWh, per slot
    pub marginal_cost: Vec<f64>,
    pub startup_cost: f64,
    pub min_output_kw: f64,
    pub max_output_kw: f64,
    /// Commitment state before slot 0
    #[serde(default)]
    pub initially_on: bool,
}

impl GeneratorSpec {
    fn validate(&self, field: &str, horizon: TimeHorizon) -> Result<(), ProfileError> {
        check_series(&format!("{field}.marginal_cost"), &self.marginal_cost, horizon)?;
        check_non_negative_value(&format!("{field}.startup_cost"), self.startup_cost)?;
        check_non_negative_value(&format!("{field}.min_output_kw"), self.min_output_kw)?;
        check_non_negative_value(&format!("{field}.max_output_kw"), self.max_output_kw)?;
        if self.min_output_kw > self.max_output_kw {
            return Err(ProfileError::InvertedBounds {
                field: field.to_string(),
                min: self.min_output_kw,
                max: self.max_output_kw,
            });
        }
        Ok(())
    }
}

/// Utility feeder prices and optional exchange limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityTariff {
    pub buy_price: Vec<f64>,
    pub sell_price: Vec<f64>,
    /// Cap on power bought per slot; `None` = unlimited
    #[serde(default)]
    pub import_limit_kw: Option<f64>,
    /// Cap on power sold per slot; `None` = unlimited
    #[serde(default)]
    pub export_limit_kw: Option<f64>,
}

impl UtilityTariff {
    fn validate(&self, field: &str, horizon: TimeHorizon) -> Result<(), ProfileError> {
        check_series(&format!("{field}.buy_price"), &self.buy_price, horizon)?;
        check_series(&format!("{field}.sell_price"), &self.sell_price, horizon)?;
        for (slot, (&buy, &sell)) in self.buy_price.iter().zip(&self.sell_price).enumerate() {
            if sell > buy {
                return Err(ProfileError::PriceInversion { slot, buy, sell });
            }
        }
        if let Some(limit) = self.import_limit_kw {
            check_non_negative_value(&format!("{field}.import_limit_kw"), limit)?;
        }
        if let Some(limit) = self.export_limit_kw {
            check_non_negative_value(&format!("{field}.export_limit_kw"), limit)?;
        }
        Ok(())
    }

    /// Whether a generator with this marginal cost sits inside `[sell, buy]` at slot `t`.
    pub fn in_price_corridor(&self, t: usize, marginal_cost: f64) -> bool {
        self.sell_price[t] <= marginal_cost && marginal_cost <= self.buy_price[t]
    }
}

/// Prices for power exchanged with other microgrids through the community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityTariff {
    pub receive_price: Vec<f64>,
    pub send_price: Vec<f64>,
}

/// Flexible-load shifting network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadShiftSpec {
    /// `penalty[a][b]` = cost per kWh moved from slot `a` to slot `b`; empty = free
    #[serde(default)]
    pub penalty: Vec<Vec<f64>>,
    /// Cap on load shifted into each slot
    pub inflow_cap_kw: Vec<f64>,
    /// Cap on load shifted out of each slot
    pub outflow_cap_kw: Vec<f64>,
}

impl LoadShiftSpec {
    /// No flexible load at all.
    pub fn disabled(horizon: TimeHorizon) -> Self {
        Self {
            penalty: Vec::new(),
            inflow_cap_kw: vec![0.0; horizon.len()],
            outflow_cap_kw: vec![0.0; horizon.len()],
        }
    }

    pub fn penalty(&self, from: usize, to: usize) -> f64 {
        self.penalty
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(0.0)
    }

    /// A shift arc can only carry flow if both ends have capacity.
    pub fn arc_open(&self, from: usize, to: usize) -> bool {
        self.outflow_cap_kw[from] > 0.0 && self.inflow_cap_kw[to] > 0.0
    }

    fn validate(&self, horizon: TimeHorizon) -> Result<(), ProfileError> {
        check_series("load_shift.inflow_cap_kw", &self.inflow_cap_kw, horizon)?;
        check_series("load_shift.outflow_cap_kw", &self.outflow_cap_kw, horizon)?;
        if self.penalty.is_empty() {
            return Ok(());
        }
        if self.penalty.len() != horizon.len() {
            return Err(ProfileError::LengthMismatch {
                field: "load_shift.penalty".into(),
                expected: horizon.len(),
                actual: self.penalty.len(),
            });
        }
        for (a, row) in self.penalty.iter().enumerate() {
            check_series(&format!("load_shift.penalty[{a}]"), row, horizon)?;
        }
        Ok(())
    }
}

/// Immutable per-microgrid inputs valid for one planning horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticProfile {
    pub id: String,
    pub generators: Vec<GeneratorSpec>,
    pub pv_forecast_kw: Vec<f64>,
    pub wind_forecast_kw: Vec<f64>,
    pub fixed_load_kw: Vec<f64>,
    #[serde(default)]
    pub battery: Option<BatterySpec>,
    pub tariff: UtilityTariff,
    /// Falls back to the utility tariff when absent
    #[serde(default)]
    pub community_tariff: Option<CommunityTariff>,
    pub load_shift: LoadShiftSpec,
}

impl StaticProfile {
    pub fn horizon(&self) -> TimeHorizon {
        TimeHorizon::new(self.fixed_load_kw.len())
    }

    /// PV plus wind forecast at slot `t`.
    pub fn renewable_kw(&self, t: usize) -> f64 {
        self.pv_forecast_kw[t] + self.wind_forecast_kw[t]
    }

    pub fn receive_price(&self, t: usize) -> f64 {
        match &self.community_tariff {
            Some(community) => community.receive_price[t],
            None => self.tariff.buy_price[t],
        }
    }

    pub fn send_price(&self, t: usize) -> f64 {
        match &self.community_tariff {
            Some(community) => community.send_price[t],
            None => self.tariff.sell_price[t],
        }
    }

    /// Check every invariant against `horizon`; no model is built from a profile that fails.
    pub fn validate(&self, horizon: TimeHorizon) -> Result<(), ProfileError> {
        if horizon.is_empty() {
            return Err(ProfileError::EmptyHorizon);
        }
        if self.id.trim().is_empty() {
            return Err(ProfileError::MissingId);
        }
        for (i, generator) in self.generators.iter().enumerate() {
            generator.validate(&format!("generators[{i}]"), horizon)?;
        }
        check_series("pv_forecast_kw", &self.pv_forecast_kw, horizon)?;
        check_series("wind_forecast_kw", &self.wind_forecast_kw, horizon)?;
        check_series("fixed_load_kw", &self.fixed_load_kw, horizon)?;
        if let Some(battery) = &self.battery {
            battery.validate("battery")?;
        }
        self.tariff.validate("tariff", horizon)?;
        if let Some(community) = &self.community_tariff {
            check_series("community_tariff.receive_price", &community.receive_price, horizon)?;
            check_series("community_tariff.send_price", &community.send_price, horizon)?;
            for (slot, (&buy, &sell)) in community
                .receive_price
                .iter()
                .zip(&community.send_price)
                .enumerate()
            {
                if sell > buy {
                    return Err(ProfileError::PriceInversion { slot, buy, sell });
                }
            }
        }
        self.load_shift.validate(horizon)
    }
}

/// Utility-fed community generator operated by the DSO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityGeneratorSpec {
    pub marginal_cost: Vec<f64>,
    pub min_output_kw: f64,
    pub max_output_kw: f64,
}

/// Static inputs of the distribution system operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsoProfile {
    pub generator: CommunityGeneratorSpec,
    pub tariff: UtilityTariff,
    /// Community battery shared by all microgrids
    #[serde(default)]
    pub battery: Option<BatterySpec>,
}

impl DsoProfile {
    pub fn validate(&self, horizon: TimeHorizon) -> Result<(), ProfileError> {
        if horizon.is_empty() {
            return Err(ProfileError::EmptyHorizon);
        }
        let generator = &self.generator;
        check_series("dso.generator.marginal_cost", &generator.marginal_cost, horizon)?;
        check_non_negative_value("dso.generator.min_output_kw", generator.min_output_kw)?;
        check_non_negative_value("dso.generator.max_output_kw", generator.max_output_kw)?;
        if generator.min_output_kw > generator.max_output_kw {
            return Err(ProfileError::InvertedBounds {
                field: "dso.generator".into(),
                min: generator.min_output_kw,
                max: generator.max_output_kw,
            });
        }
        self.tariff.validate("dso.tariff", horizon)?;
        if let Some(battery) = &self.battery {
            battery.validate("dso.battery")?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::single_unit_profile;
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_profile_passes() {
        let profile = single_unit_profile(&[80.0, 20.0]);
        assert!(profile.validate(profile.horizon()).is_ok());
    }

    #[test]
    fn test_length_mismatch_is_reported_with_field() {
        let mut profile = single_unit_profile(&[80.0, 20.0]);
        profile.pv_forecast_kw = vec![0.0; 3];
        let err = profile.validate(TimeHorizon::new(2)).unwrap_err();
        assert_eq!(
            err,
            ProfileError::LengthMismatch {
                field: "pv_forecast_kw".into(),
                expected: 2,
                actual: 3
            }
        );
    }

    #[rstest]
    #[case::negative_load(|p: &mut StaticProfile| p.fixed_load_kw[0] = -1.0)]
    #[case::nan_price(|p: &mut StaticProfile| p.tariff.buy_price[1] = f64::NAN)]
    #[case::inverted_unit(|p: &mut StaticProfile| p.generators[0].min_output_kw = 200.0)]
    #[case::price_inversion(|p: &mut StaticProfile| p.tariff.sell_price[0] = 2000.0)]
    #[case::short_cost_series(|p: &mut StaticProfile| { p.generators[0].marginal_cost.pop(); })]
    #[case::ragged_penalty(|p: &mut StaticProfile| p.load_shift.penalty = vec![vec![0.0; 2]])]
    #[case::empty_id(|p: &mut StaticProfile| p.id = " ".into())]
    fn test_invalid_profiles_are_rejected(#[case] corrupt: fn(&mut StaticProfile)) {
        let mut profile = single_unit_profile(&[80.0, 20.0]);
        corrupt(&mut profile);
        assert!(profile.validate(TimeHorizon::new(2)).is_err());
    }

    #[test]
    fn test_empty_horizon_is_rejected() {
        let profile = single_unit_profile(&[]);
        assert_eq!(profile.validate(TimeHorizon::new(0)), Err(ProfileError::EmptyHorizon));
    }

    #[test]
    fn test_price_corridor_is_inclusive() {
        let profile = single_unit_profile(&[1.0]);
        assert!(profile.tariff.in_price_corridor(0, 0.0));
        assert!(profile.tariff.in_price_corridor(0, 1000.0));
        assert!(!profile.tariff.in_price_corridor(0, 1000.5));
    }

    #[test]
    fn test_community_tariff_defaults_to_utility() {
        let profile = single_unit_profile(&[1.0]);
        assert_eq!(profile.receive_price(0), 1000.0);
        assert_eq!(profile.send_price(0), 0.0);
    }

    #[test]
    fn test_dso_inverted_generator_bounds() {
        let mut dso = super::fixtures::dso_profile(2);
        dso.generator.min_output_kw = 10.0;
        assert!(matches!(
            dso.validate(TimeHorizon::new(2)),
            Err(ProfileError::InvertedBounds { .. })
        ));
    }
}
