//! Belief-weighted search for games with imperfect information.
//!
//! Before every move the [`BeliefTree`] is extended to the current turn.
//! Each surviving hypothesis gets its own [`GameTree`], all trees are
//! sampled round-robin, and every legal move is scored by the mean of its
//! per-tree scores weighted by the hypotheses' probabilities.

use log::{debug, info, warn};

use crate::ast::Term;
use crate::belief::BeliefTree;
use crate::error::SearchError;
use crate::machine::PerceptMachine;
use crate::search::clock::SearchClock;
use crate::search::mcts::MctsConfig;
use crate::search::tree::GameTree;
use crate::search::{Choice, Context, Strategy};
use crate::state::Move;

pub struct HypothesisSearch<M> {
    config: MctsConfig,
    max_hypotheses: usize,
    belief: Option<BeliefTree<M>>,
    /// Percepts received before the belief tree exists.
    pending: Vec<Vec<Term>>,
}

impl<M: PerceptMachine + Clone> HypothesisSearch<M> {
    pub fn new(config: MctsConfig) -> Self {
        Self {
            config,
            max_hypotheses: 64,
            belief: None,
            pending: Vec::new(),
        }
    }

    /// Keeps only the most probable hypotheses (default: 64).
    pub fn with_max_hypotheses(mut self, max: usize) -> Self {
        self.max_hypotheses = max.max(1);
        self
    }

    pub fn belief(&self) -> Option<&BeliefTree<M>> {
        self.belief.as_ref()
    }

    pub fn belief_mut(&mut self) -> Option<&mut BeliefTree<M>> {
        self.belief.as_mut()
    }

    /// Creates the belief tree for `ctx.role` if needed.
    pub fn init_belief(&mut self, ctx: Context<'_, M>) -> Result<&mut BeliefTree<M>, SearchError> {
        let belief = match self.belief.take() {
            Some(belief) if belief.role() == ctx.role => belief,
            _ => {
                let mut belief = BeliefTree::new(ctx.machine.clone(), ctx.role.clone())?;
                for percepts in self.pending.drain(..) {
                    belief.append_sees(percepts);
                }
                belief
            }
        };
        Ok(self.belief.insert(belief))
    }
}

impl<M: PerceptMachine + Clone> Strategy<M> for HypothesisSearch<M> {
    fn name(&self) -> &str {
        "hypothesis"
    }

    fn meta_game(&mut self, ctx: Context<'_, M>, _clock: &mut SearchClock) -> Result<(), SearchError> {
        self.init_belief(ctx)?;
        Ok(())
    }

    fn select_move(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
        let config = self.config.clone();
        let max_hypotheses = self.max_hypotheses;
        let belief = self.init_belief(ctx)?;

        let depth = belief.observations();
        if !belief.extend_to_depth(depth)? {
            warn!("hypothesis: no state agrees with the observations");
            return Ok(None);
        }
        let mut hypotheses = belief.possible_nodes_at_depth(depth);
        if hypotheses.len() > max_hypotheses {
            hypotheses.sort_by(|a, b| b.1.total_cmp(&a.1));
            hypotheses.truncate(max_hypotheses);
        }
        debug!("hypothesis: {} hypotheses at depth {}", hypotheses.len(), depth);

        let machine = belief.machine();
        let player = ctx.role.index();
        let mut trees: Vec<(GameTree, f64)> = hypotheses
            .iter()
            .map(|&(id, probability)| {
                let tree = GameTree::new(machine, belief.node(id).state().clone(), player, config.seed())
                    .with_exploration(config.exploration, config.opponent_cap);
                (tree, probability)
            })
            .collect();

        let mut samples = 0u64;
        let mut next = 0;
        while config.max_samples.map_or(true, |max| samples < max) && !clock.poll() {
            if trees[next].0.run_sample_until(machine, || clock.check())?.is_none() {
                break;
            }
            samples += 1;
            next = (next + 1) % trees.len();
        }

        let legal = ctx.legal_moves();
        let mut totals: Vec<(f64, f64)> = vec![(0.0, 0.0); legal.len()];
        for (tree, probability) in &trees {
            for (mv, score) in tree.move_scores() {
                if let Some(i) = legal.iter().position(|m| m == &mv) {
                    totals[i].0 += probability * score;
                    totals[i].1 += probability;
                }
            }
        }

        let mut best: Option<Choice> = None;
        for (mv, (sum, weight)) in legal.into_iter().zip(totals) {
            if weight <= 0.0 {
                continue;
            }
            let score = sum / weight;
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(Choice::new(mv, score));
            }
        }
        info!(
            "hypothesis: {} samples over {} trees, choice {:?}",
            samples,
            trees.len(),
            best.as_ref().map(|c| c.to_string())
        );
        Ok(best)
    }

    fn observe(&mut self, _ctx: Context<'_, M>, _joint: &[Move]) {}

    fn perceive(&mut self, percepts: &[Term]) {
        match &mut self.belief {
            Some(belief) => belief.append_sees(percepts.to_vec()),
            None => self.pending.push(percepts.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PropnetMachine;
    use crate::games;
    use crate::machine::StateMachine;
    use crate::search::clock::Deadline;
    use std::collections::HashMap;
    use std::time::Duration;
    use test_log::test;

    fn guess(side: &str) -> Move {
        Move::new(Term::func("guess", [Term::constant(side)]))
    }

    fn guesser_turn(known: Option<&str>) -> Choice {
        let machine = PropnetMachine::from_description(&games::hidden_coin()).unwrap();
        let role = machine.role_by_name(&Term::constant("guesser")).unwrap();
        let setter = machine.role_by_name(&Term::constant("setter")).unwrap();
        let start = machine.initial_state();
        let mut clock = SearchClock::new(Deadline::after(Duration::from_secs(30)));

        let mut search = HypothesisSearch::new(MctsConfig::default().with_seed(9).with_max_samples(40));
        search.meta_game(Context::new(&machine, &role, &start), &mut clock).unwrap();

        // The setter hides heads; the guesser only learns that the coin is set.
        let mut joint = vec![Move::new(Term::constant("wait")); 2];
        joint[setter.index()] = Move::new(Term::func("choose", [Term::constant("heads")]));
        let state = machine.perform(&start, &joint).unwrap();
        search.perceive(&machine.percepts(&state, &role));
        if let Some(side) = known {
            let mut truths = HashMap::new();
            truths.insert(Term::func("coin", [Term::constant(side)]), true);
            search.belief_mut().unwrap().set_known_truths(&truths);
        }
        search
            .select_move(Context::new(&machine, &role, &state), &mut clock)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_uncertain_guess_is_a_coin_flip() {
        let choice = guesser_turn(None);
        assert_eq!(choice.score, 50.0);
        assert_eq!(choice.mv, guess("heads"));
    }

    #[test]
    fn test_known_truth_decides_guess() {
        let choice = guesser_turn(Some("tails"));
        assert_eq!(choice.mv, guess("tails"));
        assert_eq!(choice.score, 100.0);
    }

    #[test]
    fn test_percepts_before_belief_are_kept() {
        let machine = PropnetMachine::from_description(&games::hidden_coin()).unwrap();
        let role = machine.role_by_name(&Term::constant("guesser")).unwrap();
        let state = machine.initial_state();
        let mut search: HypothesisSearch<PropnetMachine> = HypothesisSearch::new(MctsConfig::default());
        search.perceive(&[Term::constant("ready")]);
        let belief = search.init_belief(Context::new(&machine, &role, &state)).unwrap();
        assert_eq!(belief.observations(), 1);
    }
}
