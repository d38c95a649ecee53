//! MCTS over independent subgames.
//!
//! One [`GameTree`] per subgame, each restricted to that subgame's moves
//! plus the null move. Trees are sampled round-robin; the final move is the
//! recommendation with the highest score across subgames. Treating the
//! best single subgame as the best overall move is an approximation: it
//! ignores how the subgames' goals combine.

use log::{debug, info, warn};

use crate::error::SearchError;
use crate::factor::Factoring;
use crate::machine::StateMachine;
use crate::search::clock::SearchClock;
use crate::search::mcts::{tree_choice, MctsConfig};
use crate::search::tree::GameTree;
use crate::search::{Choice, Context, Strategy};
use crate::state::Move;

#[derive(Debug)]
pub struct FactoredMcts {
    config: MctsConfig,
    factoring: Factoring,
    trees: Vec<GameTree>,
}

impl FactoredMcts {
    /// `factoring` usually comes from
    /// [`find_independent_subgames`][crate::factor::find_independent_subgames].
    pub fn new(factoring: Factoring, config: MctsConfig) -> Self {
        Self {
            config,
            factoring,
            trees: Vec::new(),
        }
    }

    pub fn factoring(&self) -> &Factoring {
        &self.factoring
    }

    pub fn trees(&self) -> &[GameTree] {
        &self.trees
    }

    fn build_trees<M: StateMachine>(&mut self, ctx: Context<'_, M>) {
        let player = ctx.role.index();
        self.trees = if self.factoring.is_degenerate() {
            debug!("factored mcts: degenerate factoring, using a single tree");
            vec![self.config.new_tree(ctx)]
        } else {
            self.factoring
                .subgames()
                .iter()
                .map(|subgame| {
                    GameTree::for_subgame(ctx.machine, ctx.state.clone(), player, subgame, self.config.seed())
                        .with_exploration(self.config.exploration, self.config.opponent_cap)
                })
                .collect()
        };
        info!("factored mcts: {} trees", self.trees.len());
    }

    /// Round-robin sampling over all trees.
    fn sample<M: StateMachine>(&mut self, machine: &M, clock: &mut SearchClock) -> Result<u64, SearchError> {
        if self.trees.is_empty() {
            return Ok(0);
        }
        let mut samples = 0u64;
        let mut next = 0;
        while self.config.max_samples.map_or(true, |max| samples < max) && !clock.poll() {
            if self.trees[next].run_sample_until(machine, || clock.check())?.is_none() {
                break;
            }
            samples += 1;
            next = (next + 1) % self.trees.len();
        }
        Ok(samples)
    }
}

impl<M: StateMachine> Strategy<M> for FactoredMcts {
    fn name(&self) -> &str {
        "factored-mcts"
    }

    fn meta_game(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<(), SearchError> {
        self.build_trees(ctx);
        let samples = self.sample(ctx.machine, clock)?;
        info!("factored mcts: {} samples during meta game", samples);
        Ok(())
    }

    fn select_move(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
        if self.trees.is_empty() {
            self.build_trees(ctx);
        }
        let samples = self.sample(ctx.machine, clock)?;

        let legal = ctx.legal_moves();
        let mut best: Option<Choice> = None;
        for (i, tree) in self.trees.iter().enumerate() {
            let Some(choice) = tree_choice(tree) else { continue };
            debug!("factored mcts: tree {} recommends {}", i, choice);
            if !legal.contains(&choice.mv) {
                continue;
            }
            if best.as_ref().map_or(true, |b| choice.score > b.score) {
                best = Some(choice);
            }
        }
        info!(
            "factored mcts: {} samples over {} trees, choice {:?}",
            samples,
            self.trees.len(),
            best.as_ref().map(|c| c.to_string())
        );
        Ok(best)
    }

    fn observe(&mut self, ctx: Context<'_, M>, joint: &[Move]) {
        for tree in &mut self.trees {
            if let Err(e) = tree.advance_by_moves(ctx.machine, joint) {
                warn!("factored mcts: rebuilding trees, cannot advance: {}", e);
                self.trees.clear();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Term;
    use crate::eval::PropnetMachine;
    use crate::factor::find_independent_subgames;
    use crate::games;
    use crate::search::clock::Deadline;
    use std::time::Duration;
    use test_log::test;

    fn long_clock() -> SearchClock {
        SearchClock::new(Deadline::after(Duration::from_secs(30)))
    }

    #[test]
    fn test_twin_counters_prefers_valuable_counter() {
        let machine = PropnetMachine::from_description(&games::twin_counters()).unwrap();
        let factoring = find_independent_subgames(machine.propnet());
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut search = FactoredMcts::new(factoring, MctsConfig::default().with_seed(11).with_max_samples(400));
        let ctx = Context::new(&machine, &role, &state);
        search.meta_game(ctx, &mut long_clock()).unwrap();
        assert_eq!(search.trees().len(), 2);
        let choice = search.select_move(ctx, &mut long_clock()).unwrap().unwrap();
        assert_eq!(choice.mv, Move::new(Term::func("press", [Term::constant("a")])));
    }

    #[test]
    fn test_degenerate_factoring_uses_one_tree() {
        let machine = PropnetMachine::from_description(&games::one_ply_choice()).unwrap();
        let factoring = find_independent_subgames(machine.propnet());
        assert!(factoring.is_degenerate());
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut search = FactoredMcts::new(factoring, MctsConfig::default().with_seed(2).with_max_samples(50));
        let choice = search
            .select_move(Context::new(&machine, &role, &state), &mut long_clock())
            .unwrap()
            .unwrap();
        assert_eq!(search.trees().len(), 1);
        assert_eq!(choice.mv, Move::new(Term::func("choose", [Term::constant("b")])));
    }

    #[test]
    fn test_trees_follow_played_moves() {
        let machine = PropnetMachine::from_description(&games::twin_counters()).unwrap();
        let factoring = find_independent_subgames(machine.propnet());
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut search = FactoredMcts::new(factoring, MctsConfig::default().with_seed(5).with_max_samples(40));
        search
            .select_move(Context::new(&machine, &role, &state), &mut long_clock())
            .unwrap();
        let press_a = Move::new(Term::func("press", [Term::constant("a")]));
        let next = machine.perform(&state, &[press_a.clone()]).unwrap();
        search.observe(Context::new(&machine, &role, &next), &[press_a]);
        assert_eq!(search.trees().len(), 2);
        let advanced = search.trees().iter().filter(|t| t.root_state() == &next).count();
        assert_eq!(advanced, 1);
    }
}
