//! Rule constants. Every value has a serde default so a scenario file only
//! needs to name what it overrides.

use serde::{Deserialize, Serialize};

fn default_demand_min() -> f64 {
    0.9
}

fn default_demand_max() -> f64 {
    1.1
}

fn default_acquisition_noise() -> f64 {
    0.1
}

fn default_transit_derating() -> f64 {
    0.9
}

fn default_reacquire_probability() -> f64 {
    0.02
}

fn default_immigration_sweep_probability() -> f64 {
    0.01
}

fn default_escape_probability() -> f64 {
    0.01
}

fn default_retire_intercept() -> f64 {
    -10.0
}

fn default_retire_slope() -> f64 {
    2.0
}

fn default_age_mean() -> f64 {
    18.5
}

fn default_age_std_dev() -> f64 {
    2.17
}

fn default_first_step_delay() -> f64 {
    0.5
}

/// Destination-side pull, drawn uniformly from `[min, max)` on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandRange {
    #[serde(default = "default_demand_min")]
    pub min: f64,
    #[serde(default = "default_demand_max")]
    pub max: f64,
}

impl DemandRange {
    pub fn fixed(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }
}

impl Default for DemandRange {
    fn default() -> Self {
        Self {
            min: default_demand_min(),
            max: default_demand_max(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowParams {
    #[serde(default)]
    pub demand: DemandRange,
    /// Standard deviation of the acquisition noise, as a fraction of outflow.
    #[serde(default = "default_acquisition_noise")]
    pub acquisition_noise: f64,
    /// Share of a pool moved when demand asks for more than it holds
    /// (routes with a transit only).
    #[serde(default = "default_transit_derating")]
    pub transit_derating: f64,
    #[serde(default = "default_reacquire_probability")]
    pub reacquire_probability: f64,
    #[serde(default = "default_immigration_sweep_probability")]
    pub immigration_sweep_probability: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            demand: DemandRange::default(),
            acquisition_noise: default_acquisition_noise(),
            transit_derating: default_transit_derating(),
            reacquire_probability: default_reacquire_probability(),
            immigration_sweep_probability: default_immigration_sweep_probability(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VictimParams {
    #[serde(default = "default_escape_probability")]
    pub escape_probability: f64,
    #[serde(default = "default_retire_intercept")]
    pub retire_intercept: f64,
    #[serde(default = "default_retire_slope")]
    pub retire_slope: f64,
    #[serde(default = "default_age_mean")]
    pub age_mean: f64,
    #[serde(default = "default_age_std_dev")]
    pub age_std_dev: f64,
    /// Delay between acquisition and a victim's first own step, in years.
    #[serde(default = "default_first_step_delay")]
    pub first_step_delay: f64,
}

impl VictimParams {
    /// Annual retirement probability at `age`, clamped to `[0, 1]`.
    pub fn retire_probability(&self, age: i32) -> f64 {
        (self.retire_intercept + self.retire_slope * f64::from(age)).clamp(0.0, 1.0)
    }
}

impl Default for VictimParams {
    fn default() -> Self {
        Self {
            escape_probability: default_escape_probability(),
            retire_intercept: default_retire_intercept(),
            retire_slope: default_retire_slope(),
            age_mean: default_age_mean(),
            age_std_dev: default_age_std_dev(),
            first_step_delay: default_first_step_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    #[serde(default)]
    pub flow: FlowParams,
    #[serde(default)]
    pub victim: VictimParams,
}
