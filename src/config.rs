use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use validator::Validate;

use crate::controller::{CoordinatorSettings, SolveBudget};
use crate::optimizer::LocalSettings;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub scheduler: SchedulerConfig,
    #[validate(nested)]
    pub solver: SolverConfig,
    pub coordinator: CoordinatorConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SchedulerConfig {
    /// Big-M of the startup linearization
    #[validate(range(min = 2.0))]
    pub big_m: f64,
    #[serde(default)]
    pub outflow_offset: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SolverConfig {
    #[validate(range(exclusive_min = 0.0))]
    pub time_budget_secs: f64,
    #[validate(range(min = 1.0))]
    pub retry_budget_factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub parallel_local_solves: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub scenario_path: PathBuf,
    pub output_path: PathBuf,
}

impl Config {
    /// `config/default.toml`, then `MGD__SECTION__KEY` environment overrides
    /// (a `.env` file is read first when present).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("MGD__").split("__"));
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn local_settings(&self) -> LocalSettings {
        LocalSettings {
            big_m: self.scheduler.big_m,
            outflow_offset: self.scheduler.outflow_offset,
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            parallel_local_solves: self.coordinator.parallel_local_solves,
            budget: SolveBudget::new(
                Duration::from_secs_f64(self.solver.time_budget_secs),
                self.solver.retry_budget_factor,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Config {
        Figment::new().merge(Toml::string(raw)).extract().unwrap()
    }

    const DEFAULTS: &str = r#"
        [scheduler]
        big_m = 10.0
        [solver]
        time_budget_secs = 30.0
        retry_budget_factor = 2.0
        [coordinator]
        parallel_local_solves = true
        [run]
        scenario_path = "demos/community.toml"
        output_path = "rolling_result.json"
    "#;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = parse(DEFAULTS);
        assert!(cfg.validate().is_ok());
        assert!(!cfg.scheduler.outflow_offset);
        assert_eq!(
            cfg.coordinator_settings().budget.retry_limit(),
            Duration::from_secs(60)
        );
        assert_eq!(cfg.local_settings().big_m, 10.0);
    }

    #[test]
    fn test_small_big_m_is_rejected() {
        let cfg = parse(&DEFAULTS.replace("big_m = 10.0", "big_m = 1.0"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let cfg = parse(&DEFAULTS.replace("time_budget_secs = 30.0", "time_budget_secs = 0.0"));
        assert!(cfg.validate().is_err());
    }
}
