//! Community scenarios and the feed that hands them to the coordinator.
//!
//! A scenario file is TOML:
//!
//! ```toml
//! [dso]                 # DsoProfile
//! [[microgrids]]        # StaticProfile, repeated
//! [[variants]]          # noisy copy of a declared microgrid
//! id = "mg3"
//! base = "mg1"
//! seed = 7
//! cost_sigma = 1.0
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::domain::{DsoProfile, StaticProfile, TimeHorizon};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read scenario {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("variant `{id}` refers to unknown microgrid `{base}`")]
    UnknownBase { id: String, base: String },
    #[error("microgrid id `{0}` is declared twice")]
    DuplicateId(String),
    #[error("variant `{id}`: {message}")]
    Noise { id: String, message: String },
    #[error("hour {hour} is outside the {slots}-slot horizon")]
    HourOutOfRange { hour: usize, slots: usize },
}

/// Profiles valid for one hourly iteration.
#[derive(Debug, Clone)]
pub struct CommunitySnapshot {
    pub dso: Arc<DsoProfile>,
    pub microgrids: Vec<Arc<StaticProfile>>,
}

/// Source of the most recent profiles at the start of each hour.
#[async_trait]
pub trait ProfileFeed: Send + Sync {
    fn horizon(&self) -> TimeHorizon;

    async fn snapshot(&self, hour: usize) -> Result<CommunitySnapshot, FeedError>;
}

/// Microgrid derived from another one by Gaussian noise on its forecasts.
#[derive(Debug, Clone, Deserialize)]
pub struct PerturbedMicrogrid {
    pub id: String,
    pub base: String,
    pub seed: u64,
    #[serde(default)]
    pub cost_sigma: f64,
    #[serde(default)]
    pub pv_sigma: f64,
    #[serde(default)]
    pub load_sigma: f64,
    /// Replaces every generator's maximum output
    #[serde(default)]
    pub max_output_kw: Option<f64>,
}

impl PerturbedMicrogrid {
    fn apply(&self, base: &StaticProfile) -> Result<StaticProfile, FeedError> {
        let normal = |sigma: f64| {
            Normal::new(0.0, sigma).map_err(|e| FeedError::Noise {
                id: self.id.clone(),
                message: e.to_string(),
            })
        };
        let cost = normal(self.cost_sigma)?;
        let pv = normal(self.pv_sigma)?;
        let load = normal(self.load_sigma)?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut profile = base.clone();
        profile.id = self.id.clone();
        for generator in &mut profile.generators {
            if let Some(max) = self.max_output_kw {
                generator.max_output_kw = max;
            }
            for c in &mut generator.marginal_cost {
                *c = (*c + cost.sample(&mut rng)).max(0.0);
            }
        }
        for p in &mut profile.pv_forecast_kw {
            *p = (*p + pv.sample(&mut rng)).max(0.0);
        }
        for l in &mut profile.fixed_load_kw {
            *l = (*l + load.sample(&mut rng)).max(0.0);
        }
        Ok(profile)
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    dso: DsoProfile,
    #[serde(default)]
    microgrids: Vec<StaticProfile>,
    #[serde(default)]
    variants: Vec<PerturbedMicrogrid>,
}

/// Static scenario: every hour sees the same profiles.
#[derive(Debug, Clone)]
pub struct Scenario {
    dso: Arc<DsoProfile>,
    microgrids: Vec<Arc<StaticProfile>>,
}

impl Scenario {
    pub fn new(dso: DsoProfile, microgrids: Vec<StaticProfile>) -> Self {
        Self {
            dso: Arc::new(dso),
            microgrids: microgrids.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| FeedError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let scenario = Self::from_toml_str(&raw)?;
        info!(
            path = %path.display(),
            microgrids = scenario.microgrids.len(),
            slots = scenario.horizon().len(),
            "scenario loaded"
        );
        Ok(scenario)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, FeedError> {
        let file: ScenarioFile = toml::from_str(raw)?;
        let mut microgrids = file.microgrids;
        for variant in &file.variants {
            let base = microgrids
                .iter()
                .find(|mg| mg.id == variant.base)
                .ok_or_else(|| FeedError::UnknownBase {
                    id: variant.id.clone(),
                    base: variant.base.clone(),
                })?;
            let derived = variant.apply(base)?;
            microgrids.push(derived);
        }
        for (i, mg) in microgrids.iter().enumerate() {
            if microgrids[..i].iter().any(|other| other.id == mg.id) {
                return Err(FeedError::DuplicateId(mg.id.clone()));
            }
        }
        Ok(Self::new(file.dso, microgrids))
    }

    pub fn dso(&self) -> &DsoProfile {
        &self.dso
    }

    pub fn microgrids(&self) -> &[Arc<StaticProfile>] {
        &self.microgrids
    }
}

#[async_trait]
impl ProfileFeed for Scenario {
    fn horizon(&self) -> TimeHorizon {
        TimeHorizon::new(self.dso.generator.marginal_cost.len())
    }

    async fn snapshot(&self, hour: usize) -> Result<CommunitySnapshot, FeedError> {
        let slots = self.horizon().len();
        if hour >= slots {
            return Err(FeedError::HourOutOfRange { hour, slots });
        }
        Ok(CommunitySnapshot {
            dso: Arc::clone(&self.dso),
            microgrids: self.microgrids.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
        [dso.generator]
        marginal_cost = [152.0, 152.0]
        min_output_kw = 0.0
        max_output_kw = 100.0

        [dso.tariff]
        buy_price = [155.0, 155.0]
        sell_price = [152.5, 152.5]

        [[microgrids]]
        id = "mg1"
        pv_forecast_kw = [10.0, 20.0]
        wind_forecast_kw = [0.0, 0.0]
        fixed_load_kw = [50.0, 60.0]

        [[microgrids.generators]]
        marginal_cost = [140.0, 150.0]
        startup_cost = 200.0
        min_output_kw = 0.0
        max_output_kw = 500.0

        [microgrids.tariff]
        buy_price = [155.0, 155.0]
        sell_price = [152.5, 152.5]
        import_limit_kw = 1000.0

        [microgrids.load_shift]
        inflow_cap_kw = [0.0, 5.0]
        outflow_cap_kw = [5.0, 0.0]

        [[variants]]
        id = "mg2"
        base = "mg1"
        seed = 42
        cost_sigma = 2.0
        load_sigma = 3.0
        max_output_kw = 550.0
    "#;

    #[test]
    fn test_parses_scenario_with_variant() {
        let scenario = Scenario::from_toml_str(SCENARIO).unwrap();
        assert_eq!(scenario.horizon().len(), 2);
        let ids: Vec<&str> = scenario.microgrids().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["mg1", "mg2"]);

        let mg2 = &scenario.microgrids()[1];
        assert_eq!(mg2.pv_forecast_kw, vec![10.0, 20.0]);
        assert_eq!(mg2.generators[0].max_output_kw, 550.0);
        assert_ne!(mg2.fixed_load_kw, vec![50.0, 60.0]);
        assert!(mg2.fixed_load_kw.iter().all(|l| *l >= 0.0));
        for mg in scenario.microgrids() {
            mg.validate(scenario.horizon()).unwrap();
        }
    }

    #[test]
    fn test_variants_are_reproducible() {
        let first = Scenario::from_toml_str(SCENARIO).unwrap();
        let second = Scenario::from_toml_str(SCENARIO).unwrap();
        assert_eq!(first.microgrids()[1], second.microgrids()[1]);
    }

    #[test]
    fn test_unknown_base_is_rejected() {
        let raw = SCENARIO.replace("base = \"mg1\"", "base = \"mg9\"");
        assert!(matches!(
            Scenario::from_toml_str(&raw),
            Err(FeedError::UnknownBase { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let raw = SCENARIO.replace("id = \"mg2\"", "id = \"mg1\"");
        assert!(matches!(
            Scenario::from_toml_str(&raw),
            Err(FeedError::DuplicateId(id)) if id == "mg1"
        ));
    }

    #[tokio::test]
    async fn test_snapshot_beyond_horizon_fails() {
        let scenario = Scenario::from_toml_str(SCENARIO).unwrap();
        assert!(scenario.snapshot(1).await.is_ok());
        assert!(matches!(
            scenario.snapshot(2).await,
            Err(FeedError::HourOutOfRange { hour: 2, slots: 2 })
        ));
    }
}
