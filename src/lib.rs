//! # plyzero
//!
//! The search-and-scheduling core of an AlphaZero-family self-play engine:
//! a Monte Carlo Tree Search driven by a learned evaluator, run by many
//! concurrent self-play workers that share one evaluator through a batching
//! inference broker.
//!
//! ## Components
//!
//! - **Game seams** ([`game`]): the rules engine and position encoder are
//!   consumed as black boxes through the [`GameState`] and
//!   [`PositionEncoder`] traits. A reference tic-tac-toe implementation is
//!   included so the pipeline can run without a neural network.
//! - **Inference layer** ([`infer`]): a shared [`EvalContext`] (evaluation
//!   cache plus pending/processing request sets) and a background
//!   [`InferenceBroker`] that drains pending positions, calls the
//!   [`Evaluator`] once per batch and publishes normalized priors.
//! - **Search** ([`mcts`]): an arena-allocated search tree with PUCT
//!   selection, blocking expansion against the cache, sign-flipping
//!   backpropagation and visit-count action sampling, driven by the
//!   [`Mcts`] controller.
//! - **Self-play** ([`selfplay`]): a fixed-size worker pool playing full
//!   games and back-filling per-ply values from the final outcome.

// ============================================================================
// PUBLIC API MODULES
// ============================================================================

/// Rules-engine and encoder seams plus the reference game
pub mod game;

/// Evaluation cache, request sets and the batching inference broker
pub mod infer;

/// Monte Carlo Tree Search: tree, controller and configuration
pub mod mcts;

/// Concurrent self-play worker pool and game records
pub mod selfplay;

/// Utility functions and helpers
pub mod utils;

/// Logging setup
pub mod logging;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use game::{GameState, Outcome, PositionEncoder};

pub use infer::broker::InferenceBroker;
pub use infer::cache::{CacheEntry, EvalContext};
pub use infer::evaluator::{Evaluator, UniformEvaluator};

pub use mcts::config::{SearchConfig, SelfPlayConfig};
pub use mcts::search::Mcts;
pub use mcts::tree::{NodeId, SearchTree};

pub use selfplay::{play_game, run_generation, GameRecord, PlyRecord};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Main error type for the engine core.
///
/// Contract violations (`AlreadyExpanded`, `NoVisits`) surface to the
/// immediate caller; broker invariant violations (`EmptyLegalMoves`,
/// `UndecodableKey`) are fatal to the broker loop and logged there.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("node is already expanded")]
    AlreadyExpanded,

    #[error("no simulation has visited this node yet")]
    NoVisits,

    #[error("no legal moves for non-terminal position `{0}`")]
    EmptyLegalMoves(String),

    #[error("cannot decode canonical position key `{0}`")]
    UndecodableKey(String),

    #[error("evaluation context was shut down while waiting for `{0}`")]
    Shutdown(String),

    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn broker thread: {0}")]
    BrokerSpawn(#[from] std::io::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
