//! Batching inference broker.
//!
//! A long-lived background thread, independent of any single game: it drains
//! the pending request set, rebuilds each position from its canonical key,
//! calls the evaluator once for the whole batch, normalizes the policy over
//! each position's legal moves and publishes the results into the shared
//! cache. Amortizing the evaluator call over every game's concurrent
//! requests is the whole point of this thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::game::{GameState, PositionEncoder};
use crate::infer::cache::{CacheEntry, EvalContext};
use crate::infer::evaluator::Evaluator;
use crate::{EngineError, Result};

/// Delay before re-checking an empty pending set.
const BATCH_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to the broker thread. Stopping (or dropping) the handle shuts the
/// context down, which wakes every waiting search thread with a typed error
/// instead of stalling it, and then joins the thread.
pub struct InferenceBroker<G: GameState> {
    ctx: Arc<EvalContext<G>>,
    handle: Option<JoinHandle<()>>,
}

impl<G: GameState> InferenceBroker<G> {
    /// Spawns the broker loop. The evaluator is moved into the thread and
    /// owned exclusively there; only the context is shared.
    pub fn spawn<E, Enc>(ctx: Arc<EvalContext<G>>, evaluator: E, encoder: Arc<Enc>) -> Result<Self>
    where
        E: Evaluator,
        Enc: PositionEncoder<G>,
    {
        let loop_ctx = Arc::clone(&ctx);
        let handle = thread::Builder::new()
            .name("inference-broker".into())
            .spawn(move || {
                if let Err(err) = run_loop(&loop_ctx, &evaluator, encoder.as_ref()) {
                    // Encoder/rules inconsistency; unblock the waiters and die.
                    log::error!("inference broker stopped on invariant violation: {err}");
                }
                loop_ctx.shutdown();
            })?;
        Ok(Self {
            ctx,
            handle: Some(handle),
        })
    }

    /// Synchronous shutdown: wakes waiters and joins the thread.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.ctx.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<G: GameState> Drop for InferenceBroker<G> {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn run_loop<G, E, Enc>(ctx: &EvalContext<G>, evaluator: &E, encoder: &Enc) -> Result<()>
where
    G: GameState,
    E: Evaluator,
    Enc: PositionEncoder<G>,
{
    loop {
        if ctx.is_shut_down() {
            return Ok(());
        }
        let keys = ctx.begin_batch();
        if keys.is_empty() {
            thread::sleep(BATCH_POLL_INTERVAL);
            continue;
        }
        process_batch(ctx, evaluator, encoder, &keys)?;
        ctx.finish_batch();
    }
}

fn process_batch<G, E, Enc>(
    ctx: &EvalContext<G>,
    evaluator: &E,
    encoder: &Enc,
    keys: &[String],
) -> Result<()>
where
    G: GameState,
    E: Evaluator,
    Enc: PositionEncoder<G>,
{
    log::debug!("evaluating batch of {} positions", keys.len());

    let mut states = Vec::with_capacity(keys.len());
    for key in keys {
        let state = encoder
            .decode_key(key)
            .ok_or_else(|| EngineError::UndecodableKey(key.clone()))?;
        states.push(state);
    }

    let features: Vec<Vec<f32>> = states.iter().map(|state| encoder.encode(state)).collect();
    let (policies, values) = evaluator.evaluate(&features);

    for (i, (key, state)) in keys.iter().zip(&states).enumerate() {
        let moves = state.legal_moves();
        if moves.is_empty() {
            // expand() never routes terminal states here, so an empty set
            // means the encoder and the rules engine disagree about `key`.
            return Err(EngineError::EmptyLegalMoves(key.clone()));
        }
        let priors = normalize_over_legal(&moves, &policies[i], encoder);
        ctx.publish(
            key.clone(),
            CacheEntry {
                priors,
                value: values[i].clamp(-1.0, 1.0),
            },
        );
    }
    Ok(())
}

/// Softmax of the raw logits restricted to exactly the legal moves, so the
/// published probabilities sum to 1 over the legal-move set regardless of
/// what the evaluator emitted for illegal action indices.
fn normalize_over_legal<G, Enc>(
    moves: &[G::Move],
    logits: &[f32],
    encoder: &Enc,
) -> Vec<(G::Move, f32)>
where
    G: GameState,
    Enc: PositionEncoder<G>,
{
    let raw: Vec<f32> = moves
        .iter()
        .map(|&mv| logits[encoder.move_to_index(mv)])
        .collect();
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = raw.iter().map(|&logit| (logit - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    moves
        .iter()
        .zip(exp)
        .map(|(&mv, e)| (mv, e / sum))
        .collect()
}
