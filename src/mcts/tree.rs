//! Arena-allocated MCTS search tree.
//!
//! All nodes live in one contiguous `Vec` and reference each other by
//! [`NodeId`] index: parent links are plain optional handles, so
//! backpropagation is an index walk and there is no parent/child
//! reference-counting cycle to break.
//!
//! The tree also owns the single *walked state* shared by a traversal:
//! `select_best_leaf` advances it move by move, the controller resets it to
//! a copy of the root position before every simulation. One worker thread
//! owns one tree for its whole lifetime; nothing here is synchronized.

use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::game::GameState;
use crate::infer::cache::EvalContext;
use crate::mcts::config::SearchConfig;
use crate::utils::random::weighted_index;
use crate::{EngineError, Result};

/// Handle into the tree's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(u32);

#[derive(Debug)]
pub struct Node<M> {
    /// Move that produced this node from its parent; `None` for the root.
    pub incoming_move: Option<M>,
    /// Evaluator probability assigned to `incoming_move` when the parent
    /// was expanded.
    pub prior: f32,
    pub visit_count: u32,
    /// Sum of backpropagated values from this node's own perspective.
    pub value_sum: f32,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    expanded: bool,
}

impl<M> Node<M> {
    fn new_root() -> Self {
        Self {
            incoming_move: None,
            prior: 0.0,
            visit_count: 0,
            value_sum: 0.0,
            parent: None,
            children: Vec::new(),
            expanded: false,
        }
    }

    fn new_child(parent: NodeId, mv: M, prior: f32) -> Self {
        Self {
            incoming_move: Some(mv),
            prior,
            visit_count: 0,
            value_sum: 0.0,
            parent: Some(parent),
            children: Vec::new(),
            expanded: false,
        }
    }

    /// Average backpropagated value, 0 while unvisited.
    pub fn average_value(&self) -> f32 {
        if self.visit_count == 0 {
            0.0
        } else {
            self.value_sum / self.visit_count as f32
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }
}

pub struct SearchTree<G: GameState> {
    nodes: Vec<Node<G::Move>>,
    root: NodeId,
    /// Working state advanced during selection; reset per simulation.
    state: G,
    c_puct: f32,
    unvisited_value: f32,
}

impl<G> fmt::Debug for SearchTree<G>
where
    G: GameState + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchTree")
            .field("nodes", &self.nodes)
            .field("root", &self.root)
            .field("state", &self.state)
            .finish()
    }
}

impl<G: GameState> SearchTree<G> {
    pub fn new(state: G, config: &SearchConfig) -> Self {
        Self {
            nodes: vec![Node::new_root()],
            root: NodeId(0),
            state,
            c_puct: config.exploration_constant,
            unvisited_value: config.unvisited_value,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node<G::Move> {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<G::Move> {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn walked_state(&self) -> &G {
        &self.state
    }

    /// Rewinds the walked state to a fresh copy of the root position.
    pub fn reset_walk(&mut self, state: G) {
        self.state = state;
    }

    /// PUCT score of `child` under `parent`:
    /// `q + c_puct * prior * sqrt(parent visits) / (1 + child visits)`.
    ///
    /// The child's average value lives in `[-1, 1]` from the *child's own*
    /// perspective; `1 - ((avg + 1) / 2)` maps it into an opponent-relative
    /// `[0, 1]` score, so the parent prefers children whose positions are
    /// bad for the side to move there. Unvisited children get the
    /// configured optimistic default instead.
    pub fn ucb_score(&self, parent: NodeId, child: NodeId) -> f32 {
        let parent = self.node(parent);
        let child = self.node(child);
        let q = if child.visit_count == 0 {
            self.unvisited_value
        } else {
            1.0 - (child.average_value() + 1.0) / 2.0
        };
        q + self.c_puct * child.prior * (parent.visit_count as f32).sqrt()
            / (1.0 + child.visit_count as f32)
    }

    /// First child maximizing the UCB score, in child order (ties keep the
    /// earliest maximizer). `None` when there are no children.
    pub fn select_best_child(&self, id: NodeId) -> Option<NodeId> {
        let mut best: Option<(f32, NodeId)> = None;
        for &child in &self.node(id).children {
            let score = self.ucb_score(id, child);
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, child));
            }
        }
        best.map(|(_, child)| child)
    }

    /// Walks from the root, applying each selected move to the walked
    /// state, until reaching a childless node or a terminal position.
    /// A terminal position stops the walk even when the node still has
    /// (stale) children; a childless selection stops it without failing.
    pub fn select_best_leaf(&mut self) -> NodeId {
        let mut current = self.root;
        loop {
            if self.state.outcome().is_some() {
                return current;
            }
            if self.node(current).children.is_empty() {
                return current;
            }
            match self.select_best_child(current) {
                Some(child) => {
                    if let Some(mv) = self.node(child).incoming_move {
                        self.state.apply(mv);
                    }
                    log::trace!(
                        "walk -> {:?} (visits {} value {})",
                        self.node(child).incoming_move,
                        self.node(child).visit_count,
                        self.node(child).value_sum,
                    );
                    current = child;
                }
                None => return current,
            }
        }
    }

    /// One-time expansion of a leaf whose position is the current walked
    /// state.
    ///
    /// Terminal positions return their outcome value directly, without
    /// children and without touching the cache or evaluator. Otherwise the
    /// cached evaluation is looked up (registering the position and
    /// blocking on the broker when absent) and one child is created per
    /// legal move with its normalized prior. Re-expansion is a caller
    /// contract violation and fails with a typed error.
    pub fn expand(&mut self, id: NodeId, ctx: &EvalContext<G>) -> Result<f32> {
        if self.node(id).expanded {
            return Err(EngineError::AlreadyExpanded);
        }
        if let Some(outcome) = self.state.outcome() {
            self.node_mut(id).expanded = true;
            return Ok(outcome.value());
        }

        let key = self.state.canonical_key();
        let entry = match ctx.lookup(&key) {
            Some(entry) => entry,
            None => {
                ctx.request(&key);
                ctx.wait(&key)?
            }
        };

        for &(mv, prior) in &entry.priors {
            let child_id = NodeId(self.nodes.len() as u32);
            self.nodes.push(Node::new_child(id, mv, prior));
            self.node_mut(id).children.push(child_id);
        }
        self.node_mut(id).expanded = true;
        Ok(entry.value)
    }

    /// Adds `value` to this node and walks the parent handles to the root,
    /// incrementing each ancestor's visit count once and flipping the
    /// value's sign at every step (zero-sum, perspective-alternating).
    pub fn backpropagate(&mut self, id: NodeId, value: f32) {
        let mut current = Some(id);
        let mut value = value;
        while let Some(node_id) = current {
            let node = self.node_mut(node_id);
            node.visit_count += 1;
            node.value_sum += value;
            current = node.parent;
            value = -value;
        }
    }

    /// Visit-count distribution over this node's children. Caller contract:
    /// at least one simulation must have passed through this node.
    pub fn action_probs(&self, id: NodeId) -> Result<Vec<(G::Move, f32)>> {
        let node = self.node(id);
        if node.visit_count == 0 {
            return Err(EngineError::NoVisits);
        }
        let total = node.visit_count as f32;
        Ok(node
            .children
            .iter()
            .filter_map(|&child_id| {
                let child = self.node(child_id);
                child
                    .incoming_move
                    .map(|mv| (mv, child.visit_count as f32 / total))
            })
            .collect())
    }

    /// Samples one child move with probability proportional to its visit
    /// count (weighted choice, not argmax): the source of self-play move
    /// diversity.
    pub fn sample_action<R: Rng + ?Sized>(&self, id: NodeId, rng: &mut R) -> Result<G::Move> {
        let node = self.node(id);
        let weights: Vec<u32> = node
            .children
            .iter()
            .map(|&child_id| self.node(child_id).visit_count)
            .collect();
        let choice = weighted_index(&weights, rng).ok_or(EngineError::NoVisits)?;
        self.node(node.children[choice])
            .incoming_move
            .ok_or(EngineError::NoVisits)
    }

    /// Mixes Dirichlet noise into the root priors:
    /// `(1 - ε) · prior + ε · noise`. The Dirichlet draw is built from
    /// normalized Gamma(α, 1) samples so the dimension can follow the
    /// legal-move count.
    pub(crate) fn mix_root_noise<R: Rng + ?Sized>(&mut self, alpha: f32, epsilon: f32, rng: &mut R) {
        if epsilon <= 0.0 {
            return;
        }
        let children = self.node(self.root).children.clone();
        if children.is_empty() {
            return;
        }
        let gamma = match Gamma::new(alpha, 1.0) {
            Ok(gamma) => gamma,
            Err(err) => {
                log::warn!("skipping root noise, invalid alpha {alpha}: {err}");
                return;
            }
        };
        let draws: Vec<f32> = children.iter().map(|_| gamma.sample(rng)).collect();
        let total: f32 = draws.iter().sum();
        if total <= 0.0 {
            return;
        }
        for (&child_id, draw) in children.iter().zip(draws) {
            let node = self.node_mut(child_id);
            node.prior = (1.0 - epsilon) * node.prior + epsilon * (draw / total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tictactoe::{TicTacToe, TicTacToeEncoder};
    use crate::game::PositionEncoder;
    use crate::infer::cache::CacheEntry;
    use assert_matches::assert_matches;

    fn tree_with(state: TicTacToe) -> SearchTree<TicTacToe> {
        SearchTree::new(state, &SearchConfig::default())
    }

    /// Context pre-loaded with a uniform evaluation for `state`, standing in
    /// for a running broker.
    fn ctx_with_uniform(states: &[&TicTacToe]) -> EvalContext<TicTacToe> {
        let ctx = EvalContext::new();
        for state in states {
            let moves = state.legal_moves();
            let p = 1.0 / moves.len() as f32;
            ctx.publish(
                state.canonical_key(),
                CacheEntry {
                    priors: moves.into_iter().map(|mv| (mv, p)).collect(),
                    value: 0.0,
                },
            );
        }
        ctx
    }

    /// Attaches a bare child node, bypassing expansion, for scoring tests.
    fn attach_child(tree: &mut SearchTree<TicTacToe>, parent: NodeId, mv: usize, prior: f32) -> NodeId {
        let id = NodeId(tree.nodes.len() as u32);
        tree.nodes.push(Node::new_child(parent, mv, prior));
        tree.node_mut(parent).children.push(id);
        id
    }

    #[test]
    fn test_expand_initial_position() {
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state);
        let root = tree.root();

        let value = tree.expand(root, &ctx).unwrap();
        assert_eq!(value, 0.0);
        assert_eq!(tree.node(root).children.len(), 9);
        for &child in &tree.node(root).children {
            assert!((tree.node(child).prior - 1.0 / 9.0).abs() < 1e-6);
            assert_eq!(tree.node(child).parent, Some(root));
        }
    }

    #[test]
    fn test_expand_terminal_position_has_no_children() {
        let mut state = TicTacToe::new();
        for mv in [0, 3, 1, 4, 2] {
            state.apply(mv); // X wins the top row, O to move
        }
        let ctx = EvalContext::new();
        let mut tree = tree_with(state);
        let root = tree.root();

        let value = tree.expand(root, &ctx).unwrap();
        assert_eq!(value, -1.0);
        assert!(tree.node(root).children.is_empty());
        // Terminal expansion never enqueued anything.
        assert!(ctx.begin_batch().is_empty());
    }

    #[test]
    fn test_expand_twice_fails() {
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state);
        let root = tree.root();

        tree.expand(root, &ctx).unwrap();
        assert_matches!(tree.expand(root, &ctx), Err(EngineError::AlreadyExpanded));
    }

    #[test]
    fn test_backpropagate_single_node() {
        let mut tree = tree_with(TicTacToe::new());
        let root = tree.root();
        tree.backpropagate(root, 1.0);
        assert_eq!(tree.node(root).visit_count, 1);
        assert_eq!(tree.node(root).value_sum, 1.0);
    }

    #[test]
    fn test_backpropagate_alternates_signs_up_to_root() {
        let mut tree = tree_with(TicTacToe::new());
        let root = tree.root();
        let child = attach_child(&mut tree, root, 0, 0.5);
        let grandchild = attach_child(&mut tree, child, 1, 0.5);

        tree.backpropagate(grandchild, 1.0);

        assert_eq!(tree.node(grandchild).visit_count, 1);
        assert_eq!(tree.node(grandchild).value_sum, 1.0);
        assert_eq!(tree.node(child).visit_count, 1);
        assert_eq!(tree.node(child).value_sum, -1.0);
        assert_eq!(tree.node(root).visit_count, 1);
        assert_eq!(tree.node(root).value_sum, 1.0);
    }

    #[test]
    fn test_ucb_unvisited_child_is_optimistic_default_plus_prior_term() {
        let mut tree = tree_with(TicTacToe::new());
        let root = tree.root();
        tree.node_mut(root).visit_count = 1;

        for (prior, expected) in [(0.0, 0.5), (1.0, 1.5), (0.5, 1.0)] {
            let child = attach_child(&mut tree, root, 0, prior);
            assert!((tree.ucb_score(root, child) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ucb_visited_child_inverts_average_value() {
        let mut tree = tree_with(TicTacToe::new());
        let root = tree.root();
        tree.node_mut(root).visit_count = 1;
        let child = attach_child(&mut tree, root, 0, 0.0);
        tree.node_mut(child).visit_count = 1;

        for (value_sum, expected) in [(1.0, 0.0), (0.0, 0.5), (0.5, 0.25), (0.25, 0.375)] {
            tree.node_mut(child).value_sum = value_sum;
            assert!((tree.ucb_score(root, child) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ucb_exploration_term_decays_with_child_visits() {
        let mut tree = tree_with(TicTacToe::new());
        let root = tree.root();
        tree.node_mut(root).visit_count = 16;
        let child = attach_child(&mut tree, root, 0, 0.5);
        tree.node_mut(child).value_sum = 0.0;

        for (visits, expected) in [(1, 1.5), (3, 1.0), (7, 0.75), (15, 0.625)] {
            tree.node_mut(child).visit_count = visits;
            assert!((tree.ucb_score(root, child) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_select_best_child_prefers_highest_prior() {
        let mut tree = tree_with(TicTacToe::new());
        let root = tree.root();
        tree.node_mut(root).visit_count = 1;
        attach_child(&mut tree, root, 0, 0.0);
        let best = attach_child(&mut tree, root, 1, 1.0);
        attach_child(&mut tree, root, 2, 0.5);

        assert_eq!(tree.select_best_child(root), Some(best));
    }

    #[test]
    fn test_select_best_child_tie_break_keeps_first() {
        let mut tree = tree_with(TicTacToe::new());
        let root = tree.root();
        tree.node_mut(root).visit_count = 1;
        let first = attach_child(&mut tree, root, 0, 0.5);
        attach_child(&mut tree, root, 1, 0.5);

        assert_eq!(tree.select_best_child(root), Some(first));
    }

    #[test]
    fn test_select_best_child_empty_is_none() {
        let tree = tree_with(TicTacToe::new());
        assert_eq!(tree.select_best_child(tree.root()), None);
    }

    #[test]
    fn test_select_best_leaf_walks_and_applies_moves() {
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state.clone());
        let root = tree.root();
        tree.expand(root, &ctx).unwrap();
        tree.node_mut(root).visit_count = 1;
        // Bias one child so selection is deterministic.
        let favorite = tree.node(root).children[4];
        tree.node_mut(favorite).prior = 1.0;

        let leaf = tree.select_best_leaf();
        assert_eq!(leaf, favorite);
        // The walked state advanced by the favorite's move (cell 4).
        let mut expected = state;
        expected.apply(4);
        assert_eq!(*tree.walked_state(), expected);
    }

    #[test]
    fn test_select_best_leaf_on_unexpanded_root_returns_root() {
        let mut tree = tree_with(TicTacToe::new());
        assert_eq!(tree.select_best_leaf(), tree.root());
    }

    #[test]
    fn test_select_best_leaf_stops_on_terminal_state_despite_children() {
        // Nodes below a terminal position can only be stale; the walk must
        // stop without applying anything.
        let mut state = TicTacToe::new();
        for mv in [0, 3, 1, 4, 2] {
            state.apply(mv);
        }
        let mut tree = tree_with(state.clone());
        let root = tree.root();
        attach_child(&mut tree, root, 8, 1.0);
        tree.node_mut(root).visit_count = 1;

        assert_eq!(tree.select_best_leaf(), root);
        assert_eq!(*tree.walked_state(), state);
    }

    #[test]
    fn test_action_probs_proportional_to_visits() {
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state);
        let root = tree.root();
        tree.expand(root, &ctx).unwrap();

        tree.node_mut(root).visit_count = 10;
        let children: Vec<NodeId> = tree.node(root).children.clone();
        tree.node_mut(children[0]).visit_count = 6;
        tree.node_mut(children[1]).visit_count = 4;

        let probs = tree.action_probs(root).unwrap();
        assert_eq!(probs.len(), 9);
        let total: f32 = probs.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(probs[0], (0, 0.6));
        assert_eq!(probs[1], (1, 0.4));
    }

    #[test]
    fn test_action_probs_before_any_simulation_fails() {
        let tree = tree_with(TicTacToe::new());
        assert_matches!(tree.action_probs(tree.root()), Err(EngineError::NoVisits));
    }

    #[test]
    fn test_sample_action_respects_visit_weights() {
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state);
        let root = tree.root();
        tree.expand(root, &ctx).unwrap();
        tree.node_mut(root).visit_count = 10;
        let children: Vec<NodeId> = tree.node(root).children.clone();
        tree.node_mut(children[3]).visit_count = 7;
        tree.node_mut(children[5]).visit_count = 3;

        let mut rng = rand::rng();
        for _ in 0..100 {
            let mv = tree.sample_action(root, &mut rng).unwrap();
            assert!(mv == 3 || mv == 5, "sampled zero-visit move {mv}");
        }
    }

    #[test]
    fn test_sample_action_without_visits_fails() {
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state);
        let root = tree.root();
        tree.expand(root, &ctx).unwrap();

        let mut rng = rand::rng();
        assert_matches!(tree.sample_action(root, &mut rng), Err(EngineError::NoVisits));
    }

    #[test]
    fn test_root_noise_keeps_priors_a_distribution() {
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state);
        let root = tree.root();
        tree.expand(root, &ctx).unwrap();

        let mut rng = rand::rng();
        tree.mix_root_noise(0.3, 0.25, &mut rng);

        let total: f32 = tree
            .node(root)
            .children
            .iter()
            .map(|&c| tree.node(c).prior)
            .sum();
        assert!((total - 1.0).abs() < 1e-4);
        for &child in &tree.node(root).children {
            let prior = tree.node(child).prior;
            assert!((0.0..=1.0).contains(&prior));
            // 75% of the uniform prior survives the mix.
            assert!(prior >= 0.75 / 9.0 - 1e-5);
        }
    }

    #[test]
    fn test_root_noise_disabled_at_zero_epsilon() {
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state);
        let root = tree.root();
        tree.expand(root, &ctx).unwrap();

        let mut rng = rand::rng();
        tree.mix_root_noise(0.3, 0.0, &mut rng);
        for &child in &tree.node(root).children {
            assert!((tree.node(child).prior - 1.0 / 9.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_tree_is_debug_formattable() {
        // Search results travel inside `Result`, so assertion macros need
        // the tree itself to format.
        let state = TicTacToe::new();
        let ctx = ctx_with_uniform(&[&state]);
        let mut tree = tree_with(state);
        tree.expand(tree.root(), &ctx).unwrap();

        let dump = format!("{tree:?}");
        assert!(dump.contains("SearchTree"));
        assert!(dump.contains("root"));
    }

    #[test]
    fn test_round_trip_encoder_over_search_reachable_positions() {
        // Every legal move of a few reachable positions survives the
        // move -> index -> move mapping.
        let encoder = TicTacToeEncoder;
        let mut state = TicTacToe::new();
        for mv in [4, 0, 8] {
            for legal in state.legal_moves() {
                assert_eq!(
                    encoder.index_to_move(encoder.move_to_index(legal)),
                    Some(legal)
                );
            }
            state.apply(mv);
        }
    }
}
