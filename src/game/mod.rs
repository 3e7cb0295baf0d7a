//! Seams to the external collaborators: the rules engine and the position
//! encoder.
//!
//! The engine core never implements game rules or feature extraction itself;
//! it drives anything that satisfies [`GameState`] and [`PositionEncoder`].
//! The [`tictactoe`] module ships a small reference implementation used by
//! the crate's own tests and by downstream smoke tests.

use std::fmt::Debug;

pub mod tictactoe;

/// Result of a finished game, always from the perspective of the side to
/// move at that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    /// Scalar training target for this outcome.
    pub fn value(self) -> f32 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Draw => 0.0,
            Outcome::Loss => -1.0,
        }
    }
}

/// The rules engine seam.
///
/// Implementations own move legality, board mutation and terminal-state
/// detection. `canonical_key` must ignore fields that do not affect move
/// legality from this point on (e.g. full-move counters) so that transposed
/// positions share one evaluation.
pub trait GameState: Clone + Send + 'static {
    type Move: Copy + PartialEq + Debug + Send + Sync + 'static;

    /// All legal moves at this position. Empty exactly when the position is
    /// terminal.
    fn legal_moves(&self) -> Vec<Self::Move>;

    /// Applies a legal move in place.
    fn apply(&mut self, mv: Self::Move);

    /// `None` while the game is running, otherwise the result from the
    /// side-to-move's perspective.
    fn outcome(&self) -> Option<Outcome>;

    /// Move-count-agnostic position key used to deduplicate evaluator calls.
    fn canonical_key(&self) -> String;

    fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }
}

/// The position encoder seam.
///
/// Maps between game states and the evaluator's fixed-size numeric world:
/// feature vectors on the input side, a fixed action space on the output
/// side. `index_to_move` is a *partial* inverse of `move_to_index`: not
/// every index decodes to a move, a decoded move may be illegal in context
/// (legality is the rules engine's concern), and encoders may collapse move
/// subtypes (chess underpromotions collapsing to the queen promotion index)
/// as long as the action-space size stays fixed.
pub trait PositionEncoder<G: GameState>: Send + Sync + 'static {
    /// Size `A` of the fixed action space.
    fn action_space(&self) -> usize;

    /// Fixed-length feature vector for one position.
    fn encode(&self, state: &G) -> Vec<f32>;

    fn move_to_index(&self, mv: G::Move) -> usize;

    fn index_to_move(&self, index: usize) -> Option<G::Move>;

    /// Rebuilds a state from its canonical key, independent of any live
    /// search tree. Used by the broker to decode batched requests.
    fn decode_key(&self, key: &str) -> Option<G>;
}
