//! The evaluator seam.
//!
//! The neural network's forward pass is consumed as a black box: a batch of
//! feature vectors in, raw policy logits and scalar values out. Everything
//! model-related (architecture, training, device placement, weight files)
//! lives outside this crate.

/// Batched position evaluator.
///
/// `Send` but not required to be `Sync`: the broker thread owns its
/// evaluator exclusively, so implementations backed by frameworks with raw
/// pointers (libtorch bindings and friends) need no internal locking.
pub trait Evaluator: Send + 'static {
    /// Evaluates a whole batch in one call.
    ///
    /// Returns `(policy, value)` with shapes `[N][A]` and `[N]`, where `A`
    /// is the fixed action-space size. Policy rows are raw logits, not
    /// assumed normalized; the broker softmaxes them over the legal moves of
    /// each position. Values are expected in `[-1, 1]`.
    fn evaluate(&self, batch: &[Vec<f32>]) -> (Vec<Vec<f32>>, Vec<f32>);
}

/// Evaluator that is indifferent to everything: all-zero logits (a uniform
/// policy after normalization) and a neutral value. Lets the full pipeline
/// run without a trained model.
#[derive(Debug, Clone)]
pub struct UniformEvaluator {
    action_space: usize,
}

impl UniformEvaluator {
    pub fn new(action_space: usize) -> Self {
        Self { action_space }
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, batch: &[Vec<f32>]) -> (Vec<Vec<f32>>, Vec<f32>) {
        (
            vec![vec![0.0; self.action_space]; batch.len()],
            vec![0.0; batch.len()],
        )
    }
}
