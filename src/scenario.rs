use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{network::Network, params::SimParams, rng::DEFAULT_SEED, world::World};

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_start_year() -> i32 {
    2013
}

fn default_snapshot_interval_years() -> u32 {
    5
}

fn default_age_dump() -> bool {
    true
}

const DEFAULT_YEARS: u32 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default)]
    pub years: Option<u32>,
    /// Graph text file, relative to the scenario file.
    pub network: PathBuf,
    #[serde(default = "default_snapshot_interval_years")]
    pub snapshot_interval_years: u32,
    #[serde(default = "default_age_dump")]
    pub age_dump: bool,
    #[serde(default)]
    pub params: SimParams,
    #[serde(skip)]
    pub graph: Network,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Read the scenario and the network it names. Any structural problem in
    /// either file is reported here, before a world exists.
    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let mut scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let network_path = path
            .parent()
            .map(|dir| dir.join(&scenario.network))
            .unwrap_or_else(|| scenario.network.clone());
        scenario.graph = Network::load(&network_path)
            .with_context(|| format!("Failed to load network {}", network_path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn build_world(&self) -> Result<World> {
        World::from_network(&self.graph, self.start_year, self.seed, self.params)
            .with_context(|| format!("Failed to build world for scenario '{}'", self.name))
    }

    pub fn years(&self, override_years: Option<u32>) -> u32 {
        override_years.or(self.years).unwrap_or(DEFAULT_YEARS)
    }
}
