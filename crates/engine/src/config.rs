//! Search-engine configuration.
//!
//! Parsed from `rangier.toml` with environment variable overrides, then
//! validated before any role is constructed. Buffer sizing inputs here feed
//! the per-role receive-buffer capacity table, so both sides of every
//! channel must be built from the same configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::queue::Discipline;
use crate::scatter::ScatterModel;

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for one search run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    /// Cluster layout: hub placement and broadcast-tree shape.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Cooperative scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Receive-buffer sizing inputs.
    #[serde(default)]
    pub buffers: BufferConfig,

    /// Load-transfer probability curve.
    #[serde(default)]
    pub scatter: ScatterConfig,

    /// Optional protocol features.
    #[serde(default)]
    pub features: FeatureConfig,
}

// ── Section configs ─────────────────────────────────────────────────

/// Cluster section: which rank hubs, and how broadcasts fan out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Rank that aggregates load/incumbent state and arbitrates transfers.
    #[serde(default)]
    pub hub_rank: u32,

    /// Fan-out of the follower trees used for incumbent broadcast and
    /// repository merging.
    #[serde(default = "default_tree_radix")]
    pub tree_radix: u32,
}

fn default_tree_radix() -> u32 {
    2
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hub_rank: 0,
            tree_radix: default_tree_radix(),
        }
    }
}

/// Scheduler section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Selection discipline, fixed for the life of the queue.
    #[serde(default = "default_discipline")]
    pub discipline: Discipline,

    /// Seed for the rank's serial random source.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_discipline() -> Discipline {
    Discipline::TimeWeightedPriority
}

fn default_seed() -> u64 {
    0x5eed_0001
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discipline: default_discipline(),
            seed: default_seed(),
        }
    }
}

/// Buffer sizing section: worst-case payload inputs per channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum work tokens a single hub message may carry.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum acknowledgments a single hub message may carry.
    #[serde(default = "default_max_acks")]
    pub max_acks: u32,

    /// Largest packed subproblem the codec can produce.
    #[serde(default = "default_max_subproblem_bytes")]
    pub max_subproblem_bytes: usize,

    /// Largest packed solution the codec can produce.
    #[serde(default = "default_max_solution_bytes")]
    pub max_solution_bytes: usize,

    /// Most solutions carried by one repository fragment.
    #[serde(default = "default_repository_batch")]
    pub repository_batch: usize,
}

fn default_max_tokens() -> u32 {
    64
}

fn default_max_acks() -> u32 {
    64
}

fn default_max_subproblem_bytes() -> usize {
    64 * 1024
}

fn default_max_solution_bytes() -> usize {
    4 * 1024
}

fn default_repository_batch() -> usize {
    32
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            max_acks: default_max_acks(),
            max_subproblem_bytes: default_max_subproblem_bytes(),
            max_solution_bytes: default_max_solution_bytes(),
            repository_batch: default_repository_batch(),
        }
    }
}

/// Scatter section: the five parameters of the transfer-probability curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScatterConfig {
    #[serde(default = "default_min_ratio")]
    pub min_ratio: f64,
    #[serde(default = "default_max_ratio")]
    pub max_ratio: f64,
    #[serde(default = "default_min_prob")]
    pub min_prob: f64,
    #[serde(default = "default_target_prob")]
    pub target_prob: f64,
    #[serde(default = "default_max_prob")]
    pub max_prob: f64,
}

fn default_min_ratio() -> f64 {
    0.5
}

fn default_max_ratio() -> f64 {
    2.0
}

fn default_min_prob() -> f64 {
    0.1
}

fn default_target_prob() -> f64 {
    0.5
}

fn default_max_prob() -> f64 {
    0.9
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            min_ratio: default_min_ratio(),
            max_ratio: default_max_ratio(),
            min_prob: default_min_prob(),
            target_prob: default_target_prob(),
            max_prob: default_max_prob(),
        }
    }
}

impl ScatterConfig {
    /// Derive the runtime probability curve from the configured endpoints.
    pub fn model(&self) -> ScatterModel {
        ScatterModel::configure(
            self.min_ratio,
            self.max_ratio,
            self.min_prob,
            self.target_prob,
            self.max_prob,
        )
    }
}

/// Feature toggles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct FeatureConfig {
    /// Enumeration mode: collect all acceptable solutions, not just one.
    /// Enables the repository receiver/merge roles.
    #[serde(default)]
    pub enumeration: bool,

    /// Early output of confirmed incumbents via the three-phase handshake.
    #[serde(default)]
    pub early_output: bool,

    /// Ring circuits of the load-log token; 0 disables the chainer role.
    #[serde(default)]
    pub load_log_rounds: u64,
}

// ── Loading and validation ───────────────────────────────────────────

impl SearchConfig {
    /// Parse config from a TOML string, apply env overrides, validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, EngineError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Apply environment variable overrides.
    ///
    /// Convention: `RANGIER_SECTION_KEY` overrides `section.key`. Examples:
    /// - `RANGIER_CLUSTER_HUB_RANK` -> `cluster.hub_rank`
    /// - `RANGIER_CLUSTER_TREE_RADIX` -> `cluster.tree_radix`
    /// - `RANGIER_SCHEDULER_SEED` -> `scheduler.seed`
    /// - `RANGIER_SCATTER_TARGET_PROB` -> `scatter.target_prob`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RANGIER_CLUSTER_HUB_RANK") {
            if let Ok(rank) = v.parse::<u32>() {
                self.cluster.hub_rank = rank;
            }
        }
        if let Ok(v) = std::env::var("RANGIER_CLUSTER_TREE_RADIX") {
            if let Ok(radix) = v.parse::<u32>() {
                self.cluster.tree_radix = radix;
            }
        }
        if let Ok(v) = std::env::var("RANGIER_SCHEDULER_SEED") {
            if let Ok(seed) = v.parse::<u64>() {
                self.scheduler.seed = seed;
            }
        }
        if let Ok(v) = std::env::var("RANGIER_SCATTER_TARGET_PROB") {
            if let Ok(prob) = v.parse::<f64>() {
                self.scatter.target_prob = prob;
            }
        }
    }

    /// Validate the config: scatter-curve invariants, tree shape, buffer
    /// sizing. Fails fast so a sizing mismatch never reaches the wire.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.validate_scatter()?;
        self.validate_cluster()?;
        self.validate_buffers()?;
        Ok(())
    }

    fn validate_scatter(&self) -> Result<(), EngineError> {
        let s = &self.scatter;
        if !(s.min_ratio <= 1.0 && 1.0 <= s.max_ratio) {
            return Err(EngineError::Config(format!(
                "scatter ratio window [{}, {}] must bracket 1",
                s.min_ratio, s.max_ratio
            )));
        }
        if !(0.0 <= s.min_prob && s.min_prob <= s.target_prob && s.target_prob <= s.max_prob) {
            return Err(EngineError::Config(format!(
                "scatter probabilities must be ordered: min {} <= target {} <= max {}",
                s.min_prob, s.target_prob, s.max_prob
            )));
        }
        if s.max_prob > 1.0 {
            return Err(EngineError::Config(format!(
                "scatter max_prob {} exceeds 1",
                s.max_prob
            )));
        }
        Ok(())
    }

    fn validate_cluster(&self) -> Result<(), EngineError> {
        if self.cluster.tree_radix < 2 {
            return Err(EngineError::Config(format!(
                "tree_radix {} must be at least 2",
                self.cluster.tree_radix
            )));
        }
        Ok(())
    }

    fn validate_buffers(&self) -> Result<(), EngineError> {
        let b = &self.buffers;
        if b.max_tokens == 0 {
            return Err(EngineError::Config("max_tokens must be nonzero".into()));
        }
        if b.max_subproblem_bytes == 0 {
            return Err(EngineError::Config(
                "max_subproblem_bytes must be nonzero".into(),
            ));
        }
        if b.repository_batch == 0 {
            return Err(EngineError::Config("repository_batch must be nonzero".into()));
        }
        Ok(())
    }
}
