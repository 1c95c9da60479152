//! Scheduler and simulation configuration.
//!
//! Values come from a JSON file (every field optional), are then overridden
//! from the environment, and finally validated:
//! - `DESERT_MODE`: `single` or `multi`
//! - `DESERT_INGRESS_CAPACITY`: bounded ingress size
//! - `DESERT_OVERFLOW`: `block` or `reject`
//! - `DESERT_SEED`: simulation seed
//! - `DESERT_DOCTORS`: number of simulated doctors

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::ConsensusWeights;
use crate::error::{TriageError, TriageResult};
use crate::model::patient::PositionScoreWeights;

pub const DEFAULT_INGRESS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    Single,
    Multi,
}

impl std::str::FromStr for QueueMode {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(QueueMode::Single),
            "multi" => Ok(QueueMode::Multi),
            other => Err(TriageError::InvalidConfig(format!("unknown queue mode: {other}"))),
        }
    }
}

/// What a producer experiences when the ingress channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    Block,
    Reject,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "reject" => Ok(OverflowPolicy::Reject),
            other => Err(TriageError::InvalidConfig(format!("unknown overflow policy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalPattern {
    Random,
    /// Random arrivals plus a maximum-severity patient every tick.
    Adversarial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub mode: QueueMode,
    pub consensus_weights: ConsensusWeights,
    pub score_weights: PositionScoreWeights,
    pub ingress_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for TriageConfig {
    fn default() -> Self {
        TriageConfig {
            mode: QueueMode::Multi,
            consensus_weights: ConsensusWeights::default(),
            score_weights: PositionScoreWeights::default(),
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            overflow: OverflowPolicy::Block,
        }
    }
}

impl TriageConfig {
    pub fn with_mode(mode: QueueMode) -> TriageConfig {
        TriageConfig {
            mode,
            ..TriageConfig::default()
        }
    }

    pub fn validate(&self) -> TriageResult<()> {
        if self.ingress_capacity == 0 {
            return Err(TriageError::InvalidConfig(
                "ingress_capacity must be positive".to_string(),
            ));
        }
        if self.mode == QueueMode::Multi && self.consensus_weights.is_zero() {
            return Err(TriageError::InvalidConfig(
                "at least one consensus weight must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> TriageResult<()> {
        self.apply_overrides(&env_var)
    }

    /// Applies `DESERT_*` overrides read through `lookup`. Blank values count
    /// as unset.
    pub fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> TriageResult<()> {
        if let Some(mode) = lookup_var(lookup, "DESERT_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(policy) = lookup_var(lookup, "DESERT_OVERFLOW") {
            self.overflow = policy.parse()?;
        }
        self.ingress_capacity = parse_var(lookup, "DESERT_INGRESS_CAPACITY", self.ingress_capacity)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub triage: TriageConfig,
    pub nbr_doctors: usize,
    pub burnout_rate: f32,
    /// Patients only arrive during the first `arrival_ticks` ticks.
    pub arrival_ticks: u64,
    pub arrival_probability: f64,
    pub pattern: ArrivalPattern,
    pub seed: u64,
    pub max_ticks: u64,
    pub show_progress: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            triage: TriageConfig::default(),
            nbr_doctors: 4,
            burnout_rate: 0.02,
            arrival_ticks: 480,
            arrival_probability: 0.3,
            pattern: ArrivalPattern::Random,
            seed: 2023,
            max_ticks: 100_000,
            show_progress: true,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> TriageResult<()> {
        self.triage.validate()?;
        if self.nbr_doctors == 0 {
            return Err(TriageError::InvalidConfig("nbr_doctors must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.arrival_probability) {
            return Err(TriageError::InvalidConfig(format!(
                "arrival_probability {} outside [0, 1]",
                self.arrival_probability
            )));
        }
        if !(0.0..1.0).contains(&self.burnout_rate) {
            return Err(TriageError::InvalidConfig(format!(
                "burnout_rate {} outside [0, 1)",
                self.burnout_rate
            )));
        }
        if self.max_ticks < self.arrival_ticks {
            return Err(TriageError::InvalidConfig(
                "max_ticks must cover the arrival window".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> TriageResult<()> {
        self.apply_overrides(&env_var)
    }

    pub fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> TriageResult<()> {
        self.triage.apply_overrides(lookup)?;
        self.seed = parse_var(lookup, "DESERT_SEED", self.seed)?;
        self.nbr_doctors = parse_var(lookup, "DESERT_DOCTORS", self.nbr_doctors)?;
        Ok(())
    }
}

pub fn load_simulation_config(path: impl AsRef<Path>) -> TriageResult<SimulationConfig> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let config: SimulationConfig = serde_json::from_reader(reader)?;
    Ok(config)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn lookup_var(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> TriageResult<T>
where
    T: std::str::FromStr,
{
    match lookup_var(lookup, key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| TriageError::InvalidConfig(format!("{key}: cannot parse {raw:?}"))),
        None => Ok(default),
    }
}
