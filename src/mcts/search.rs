//! Simulation loop driving the search tree.

use rand::Rng;

use crate::game::GameState;
use crate::infer::cache::EvalContext;
use crate::mcts::config::SearchConfig;
use crate::mcts::tree::SearchTree;
use crate::Result;

/// Search controller: runs a fixed budget of simulations against one
/// position and hands back the finished tree for move selection.
pub struct Mcts {
    config: SearchConfig,
}

impl Mcts {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Runs up to `simulation_budget` simulations from `initial`.
    ///
    /// Each simulation rewinds the tree's walked state to a copy of
    /// `initial`, selects a leaf, expands it against the shared evaluation
    /// context and backpropagates the leaf value. The loop stops early once
    /// the previous simulation left the walked state terminal: the best
    /// line already ends the game and further simulations would only
    /// re-visit it. Dirichlet noise is mixed into the root priors right
    /// after the root expansion, when enabled.
    pub fn search<G, R>(
        &self,
        initial: &G,
        ctx: &EvalContext<G>,
        rng: &mut R,
    ) -> Result<SearchTree<G>>
    where
        G: GameState,
        R: Rng + ?Sized,
    {
        let mut tree = SearchTree::new(initial.clone(), &self.config);
        let root = tree.root();
        let mut root_noised = false;

        for simulation in 0..self.config.simulation_budget {
            if tree.walked_state().outcome().is_some() {
                log::debug!(
                    "search converged on a terminal line after {simulation} simulations"
                );
                break;
            }
            tree.reset_walk(initial.clone());
            let leaf = tree.select_best_leaf();
            let value = tree.expand(leaf, ctx)?;
            if !root_noised && leaf == root {
                tree.mix_root_noise(
                    self.config.dirichlet_alpha,
                    self.config.dirichlet_epsilon,
                    rng,
                );
                root_noised = true;
            }
            tree.backpropagate(leaf, value);
        }

        Ok(tree)
    }
}
