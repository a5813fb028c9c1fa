//! Scenario files — TOML descriptions of pools and a sequence of operations.
//!
//! ```toml
//! name = "walkthrough"
//!
//! [manager]
//! inner_percent = 80
//! window = 500
//!
//! [[pools]]
//! name = "eth-usdc"
//! unit0 = "ETH"
//! unit1 = "USDC"
//! fee = 3000
//! spacing = 10
//! current_tick = 0
//!
//! [reserves]
//! USDC = 1000000
//!
//! [[steps]]
//! kind = "add"
//! pool = "eth-usdc"
//! lower = -1000
//! upper = 1000
//! amount = 100
//! expect = "ok"
//! ```
//!
//! Positions are referred to by id; `position = 0` (the default) mints a new
//! one. Ids are issued sequentially from 1, so later steps can name them.

use rangebook_core::{LiquidityChange, LiquidityError, RebalanceError, RebalanceParams, ResourceKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating a scenario.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse scenario TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("scenario declares no pools")]
    NoPools,

    #[error("duplicate pool name '{0}'")]
    DuplicatePool(String),

    #[error("step {step}: unknown pool '{pool}'")]
    UnknownPool { step: usize, pool: String },

    #[error("step {step}: unknown expectation '{expect}'")]
    UnknownExpectation { step: usize, expect: String },

    #[error("step {step}: fail_at must be at least 1")]
    ZeroFault { step: usize },

    #[error("invalid rebalance parameters: {0}")]
    Params(#[from] RebalanceError),

    #[error("failed to serialize scenario for fingerprinting: {0}")]
    Fingerprint(#[from] serde_json::Error),

    #[error("soak needs at least one position")]
    NoSoakPositions,

    #[error("fault rate must be within [0, 1], got {0}")]
    FaultRate(f64),
}

/// One pool at the in-memory resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub unit0: String,
    pub unit1: String,
    pub fee: u32,
    pub spacing: u32,
    #[serde(default)]
    pub current_tick: i32,
}

impl PoolConfig {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.unit0.as_str(), self.unit1.as_str(), self.fee, self.spacing)
    }
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    Add {
        pool: String,
        lower: i32,
        upper: i32,
        amount: i128,
    },
    Remove {
        pool: String,
        lower: i32,
        upper: i32,
        amount: i128,
    },
    Batch {
        pool: String,
        changes: Vec<LiquidityChange>,
    },
    /// Rebalance around `reference`, or the bound pool's current tick.
    Rebalance {
        #[serde(default)]
        reference: Option<i32>,
    },
    SetTick {
        pool: String,
        tick: i32,
    },
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Add { .. } => "add",
            StepKind::Remove { .. } => "remove",
            StepKind::Batch { .. } => "batch",
            StepKind::Rebalance { .. } => "rebalance",
            StepKind::SetTick { .. } => "set_tick",
        }
    }

    pub fn pool(&self) -> Option<&str> {
        match self {
            StepKind::Add { pool, .. }
            | StepKind::Remove { pool, .. }
            | StepKind::Batch { pool, .. }
            | StepKind::SetTick { pool, .. } => Some(pool),
            StepKind::Rebalance { .. } => None,
        }
    }
}

/// One scripted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default = "default_caller")]
    pub caller: String,
    /// Target position; 0 mints a new one.
    #[serde(default)]
    pub position: u64,
    #[serde(flatten)]
    pub kind: StepKind,
    /// Fail the k-th apply of this step's session.
    #[serde(default)]
    pub fail_at: Option<usize>,
    /// `"ok"` or an error kind such as `"key_mismatch"`.
    #[serde(default)]
    pub expect: Option<String>,
}

fn default_caller() -> String {
    "alice".to_string()
}

fn default_name() -> String {
    "scenario".to_string()
}

/// A complete scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub manager: RebalanceParams,
    pub pools: Vec<PoolConfig>,
    /// Opening reserves per unit symbol, so removals after tick moves settle.
    #[serde(default)]
    pub reserves: BTreeMap<String, i128>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl ScenarioConfig {
    /// Load and validate a scenario from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a scenario from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScenarioConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks that TOML parsing cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.manager.validate()?;
        if self.pools.is_empty() {
            return Err(ConfigError::NoPools);
        }

        let mut names = HashSet::new();
        for pool in &self.pools {
            if !names.insert(pool.name.as_str()) {
                return Err(ConfigError::DuplicatePool(pool.name.clone()));
            }
        }

        for (step, s) in self.steps.iter().enumerate() {
            if let Some(pool) = s.kind.pool() {
                if !names.contains(pool) {
                    return Err(ConfigError::UnknownPool {
                        step,
                        pool: pool.to_string(),
                    });
                }
            }
            if let Some(expect) = &s.expect {
                if expect != "ok" && !LiquidityError::KINDS.contains(&expect.as_str()) {
                    return Err(ConfigError::UnknownExpectation {
                        step,
                        expect: expect.clone(),
                    });
                }
            }
            if s.fail_at == Some(0) {
                return Err(ConfigError::ZeroFault { step });
            }
        }
        Ok(())
    }

    pub fn pool(&self, name: &str) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| p.name == name)
    }

    /// Deterministic content hash, for matching reports to scenario files.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
