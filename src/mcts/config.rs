//! Search and self-play configuration.
//!
//! Plain serde-derived structs: unknown keys are ignored on
//! deserialization, missing keys fall back to their defaults. Loading from
//! files or flags is the embedding application's business.

use serde::{Deserialize, Serialize};

/// Configuration for one move decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of simulations per move decision.
    #[serde(default = "default_simulation_budget")]
    pub simulation_budget: usize,

    /// c_puct in the PUCT formula. Higher values explore more.
    #[serde(default = "default_exploration_constant")]
    pub exploration_constant: f32,

    /// Optimistic q assigned to children no simulation has reached yet.
    /// Tunable: 0.5 encourages trying unvisited children ahead of children
    /// whose observed value is mediocre; 0.0 recovers the purely
    /// prior-driven behavior.
    #[serde(default = "default_unvisited_value")]
    pub unvisited_value: f32,

    /// Dirichlet concentration for root exploration noise.
    #[serde(default = "default_dirichlet_alpha")]
    pub dirichlet_alpha: f32,

    /// Fraction of the root priors replaced by Dirichlet noise.
    /// 0 disables noise entirely (evaluation play); self-play generations
    /// typically use 0.25.
    #[serde(default)]
    pub dirichlet_epsilon: f32,
}

fn default_simulation_budget() -> usize {
    100
}

fn default_exploration_constant() -> f32 {
    1.0
}

fn default_unvisited_value() -> f32 {
    0.5
}

fn default_dirichlet_alpha() -> f32 {
    0.3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            simulation_budget: default_simulation_budget(),
            exploration_constant: default_exploration_constant(),
            unvisited_value: default_unvisited_value(),
            dirichlet_alpha: default_dirichlet_alpha(),
            dirichlet_epsilon: 0.0,
        }
    }
}

/// Configuration for one self-play generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfPlayConfig {
    #[serde(default = "default_games_per_generation")]
    pub games_per_generation: usize,

    /// Fixed size of the worker pool. Games beyond this run as queued work.
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,

    #[serde(default)]
    pub search: SearchConfig,
}

fn default_games_per_generation() -> usize {
    1024
}

fn default_max_concurrent_workers() -> usize {
    8
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            games_per_generation: default_games_per_generation(),
            max_concurrent_workers: default_max_concurrent_workers(),
            search: SearchConfig::default(),
        }
    }
}
