//! Self-play workers and training-example records.
//!
//! A generation plays a fixed number of games on a rayon pool. Every worker
//! runs its searches against the same shared [`EvalContext`], so positions
//! reached by concurrent games pile up into the broker's batches and each
//! distinct position is evaluated once per generation.

use std::sync::Arc;

use rayon::prelude::*;

use crate::game::{GameState, Outcome};
use crate::infer::cache::EvalContext;
use crate::mcts::config::SelfPlayConfig;
use crate::mcts::search::Mcts;
use crate::Result;

/// One training example: the position, the search's visit-count policy over
/// its legal moves and the final game value from the side to move's
/// perspective.
#[derive(Debug, Clone)]
pub struct PlyRecord<G: GameState> {
    pub state: G,
    pub policy: Vec<(G::Move, f32)>,
    pub value: f32,
}

/// A finished game: one record per ply plus the terminal outcome (from the
/// perspective of the side to move in the terminal position).
#[derive(Debug, Clone)]
pub struct GameRecord<G: GameState> {
    pub plies: Vec<PlyRecord<G>>,
    pub outcome: Outcome,
}

/// Plays one game to completion, sampling every move from the search's
/// visit-count distribution.
///
/// Ply values are back-filled once the outcome is known: the last mover is
/// the terminal side's opponent, so the final ply gets the negated outcome
/// value and the sign alternates backwards from there.
pub fn play_game<G, R>(
    initial: G,
    mcts: &Mcts,
    ctx: &EvalContext<G>,
    rng: &mut R,
) -> Result<GameRecord<G>>
where
    G: GameState,
    R: rand::Rng + ?Sized,
{
    let mut state = initial;
    let mut plies = Vec::new();

    let outcome = loop {
        if let Some(outcome) = state.outcome() {
            break outcome;
        }
        let tree = mcts.search(&state, ctx, rng)?;
        let policy = tree.action_probs(tree.root())?;
        let mv = tree.sample_action(tree.root(), rng)?;
        plies.push(PlyRecord {
            state: state.clone(),
            policy,
            value: 0.0,
        });
        state.apply(mv);
    };

    let mut value = -outcome.value();
    for ply in plies.iter_mut().rev() {
        ply.value = value;
        value = -value;
    }

    log::debug!("game finished after {} plies: {:?}", plies.len(), outcome);
    Ok(GameRecord { plies, outcome })
}

/// Plays `games_per_generation` games from `initial` on a dedicated rayon
/// pool of `max_concurrent_workers` threads and collects every record.
///
/// `install` + `collect` is the generation barrier: the call returns only
/// once every game has finished (or the first error surfaces). The caller
/// keeps the broker alive across the call.
pub fn run_generation<G>(
    initial: &G,
    config: &SelfPlayConfig,
    ctx: &Arc<EvalContext<G>>,
) -> Result<Vec<GameRecord<G>>>
where
    G: GameState + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_concurrent_workers)
        .thread_name(|i| format!("selfplay-{i}"))
        .build()?;

    log::info!(
        "starting generation: {} games on {} workers",
        config.games_per_generation,
        config.max_concurrent_workers
    );

    let records = pool.install(|| {
        (0..config.games_per_generation)
            .into_par_iter()
            .map(|_| {
                let mcts = Mcts::new(config.search.clone());
                let mut rng = rand::rng();
                play_game(initial.clone(), &mcts, ctx, &mut rng)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    log::info!("generation complete: {} games", records.len());
    Ok(records)
}
