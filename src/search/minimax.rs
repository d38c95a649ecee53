//! Paranoid minimax with optional alpha-beta pruning.
//!
//! The player maximizes its own goal while all other roles jointly minimize
//! it. Depth counts joint-move plies. Search below the configured depth
//! limit is replaced by a [`Heuristic`].
//!
//! Iterative deepening keeps the result of the last complete pass: when the
//! clock expires or the node budget runs out mid-pass, that pass is thrown
//! away. Only if the very first
//! pass is interrupted does the best root move found so far survive.

use std::time::Instant;

use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{MachineError, SearchError};
use crate::machine::StateMachine;
use crate::search::clock::{Deadline, SearchClock};
use crate::search::heuristic::Heuristic;
use crate::search::{Choice, Context, Strategy};
use crate::state::{JointMove, Move, Role, State};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DepthPolicy {
    /// Search to terminal states.
    Exhaustive,
    /// One pass limited to `d` plies.
    Fixed(usize),
    /// Passes at `start`, `start + step`, ... up to `max` plies.
    Iterative { start: usize, step: usize, max: usize },
    /// Passes at 1, 2, ... plies until this many nodes have been expanded
    /// over all passes.
    NodeBudget(u64),
}

impl Default for DepthPolicy {
    fn default() -> Self {
        DepthPolicy::Iterative {
            start: 1,
            step: 1,
            max: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimaxConfig {
    pub depth: DepthPolicy,
    /// Alpha-beta pruning (default: true)
    pub pruning: bool,
    /// Share of the remaining time a move may use (default: 0.5)
    pub budget_fraction: f64,
    /// Give every root move an equal slice of the budget (default: false)
    pub split_time_per_move: bool,
    /// Stop as soon as a root move scores 100 (default: true)
    pub stop_on_win: bool,
    /// Score of a root move whose line hits an ambiguous goal (default: 0)
    pub ambiguous_goal_score: f64,
    /// Seed for randomized heuristics (default: 0)
    pub seed: u64,
}

impl Default for MinimaxConfig {
    fn default() -> Self {
        Self {
            depth: DepthPolicy::default(),
            pruning: true,
            budget_fraction: 0.5,
            split_time_per_move: false,
            stop_on_win: true,
            ambiguous_goal_score: 0.0,
            seed: 0,
        }
    }
}

impl MinimaxConfig {
    pub fn with_depth(mut self, depth: DepthPolicy) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_pruning(mut self, pruning: bool) -> Self {
        self.pruning = pruning;
        self
    }

    pub fn with_budget_fraction(mut self, fraction: f64) -> Self {
        self.budget_fraction = fraction;
        self
    }

    pub fn with_split_time_per_move(mut self, split: bool) -> Self {
        self.split_time_per_move = split;
        self
    }

    pub fn with_stop_on_win(mut self, stop: bool) -> Self {
        self.stop_on_win = stop;
        self
    }

    pub fn with_ambiguous_goal_score(mut self, score: f64) -> Self {
        self.ambiguous_goal_score = score;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Result of one [`Minimax::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub choice: Choice,
    /// Depth limit of the pass that produced the choice; `None` if unlimited.
    pub depth: Option<usize>,
    /// No state was cut off by the depth limit.
    pub exact: bool,
    /// The pass finished before the deadline.
    pub complete: bool,
    /// Expected joint moves from the current state.
    pub principal_variation: Vec<JointMove>,
    /// Nodes expanded over all passes.
    pub nodes: u64,
}

struct Line {
    score: f64,
    pv: Vec<JointMove>,
}

struct RootResult {
    best: Option<(Move, Line)>,
    complete: bool,
}

/// Joint moves in role order with the player's move fixed to `mv`.
fn joint_moves_with<M: StateMachine>(
    machine: &M,
    state: &State,
    player: usize,
    mv: &Move,
) -> Result<Vec<JointMove>, MachineError> {
    let mut joints: Vec<JointMove> = vec![Vec::new()];
    for role in machine.roles() {
        let options = if role.index() == player {
            vec![mv.clone()]
        } else {
            let moves = machine.legal_moves(state, role);
            if moves.is_empty() {
                return Err(MachineError::NoLegalMoves {
                    role: role.to_string(),
                });
            }
            moves
        };
        joints = joints
            .into_iter()
            .flat_map(|prefix| {
                options.iter().map(move |o| {
                    let mut joint = prefix.clone();
                    joint.push(o.clone());
                    joint
                })
            })
            .collect();
    }
    Ok(joints)
}

/// One depth-limited pass.
struct Pass<'a, M> {
    machine: &'a M,
    role: &'a Role,
    limit: Option<usize>,
    config: &'a MinimaxConfig,
    heuristic: &'a Heuristic,
    rng: &'a mut ChaCha8Rng,
    node_budget: Option<u64>,
    /// Nodes counted on clocks other than the one passed down.
    spent: u64,
    cut_off: bool,
}

impl<M: StateMachine> Pass<'_, M> {
    fn max_value(
        &mut self,
        state: &State,
        depth: usize,
        mut alpha: f64,
        beta: f64,
        clock: &mut SearchClock,
    ) -> Result<Option<Line>, SearchError> {
        if clock.tick() || self.node_budget.is_some_and(|budget| self.spent + clock.nodes() > budget) {
            return Ok(None);
        }
        if self.machine.is_terminal(state) {
            let score = f64::from(self.machine.goal(state, self.role)?);
            return Ok(Some(Line { score, pv: Vec::new() }));
        }
        if self.limit.is_some_and(|limit| depth >= limit) {
            self.cut_off = true;
            let score = self
                .heuristic
                .evaluate(self.machine, state, self.role, &mut *self.rng, &mut || clock.check())?;
            if clock.is_expired() {
                return Ok(None);
            }
            return Ok(Some(Line { score, pv: Vec::new() }));
        }

        let moves = self.machine.legal_moves(state, self.role);
        if moves.is_empty() {
            return Err(SearchError::NoLegalMoves {
                role: self.role.to_string(),
            });
        }
        let mut best: Option<Line> = None;
        for mv in &moves {
            let Some(line) = self.min_value(state, mv, depth, alpha, beta, clock)? else {
                return Ok(None);
            };
            if best.as_ref().map_or(true, |b| line.score > b.score) {
                alpha = alpha.max(line.score);
                best = Some(line);
            }
            if self.config.pruning && alpha >= beta {
                break;
            }
        }
        Ok(best)
    }

    fn min_value(
        &mut self,
        state: &State,
        mv: &Move,
        depth: usize,
        alpha: f64,
        mut beta: f64,
        clock: &mut SearchClock,
    ) -> Result<Option<Line>, SearchError> {
        let joints = joint_moves_with(self.machine, state, self.role.index(), mv)?;
        let mut worst: Option<Line> = None;
        for joint in joints {
            let next = self.machine.perform(state, &joint)?;
            let Some(mut line) = self.max_value(&next, depth + 1, alpha, beta, clock)? else {
                return Ok(None);
            };
            if worst.as_ref().map_or(true, |w| line.score < w.score) {
                beta = beta.min(line.score);
                line.pv.insert(0, joint);
                worst = Some(line);
            }
            if self.config.pruning && alpha >= beta {
                break;
            }
        }
        Ok(worst)
    }

    fn root(&mut self, state: &State, clock: &mut SearchClock) -> Result<RootResult, SearchError> {
        let moves = self.machine.legal_moves(state, self.role);
        if moves.is_empty() {
            return Err(SearchError::NoLegalMoves {
                role: self.role.to_string(),
            });
        }
        let start = Instant::now();
        let slice = clock.deadline().remaining() / moves.len() as u32;

        let mut alpha = f64::NEG_INFINITY;
        let mut best: Option<(Move, Line)> = None;
        let mut complete = true;
        for (i, mv) in moves.into_iter().enumerate() {
            let result = if self.config.split_time_per_move {
                let mut child = clock.child(Deadline::at(start + slice * (i as u32 + 1)));
                self.spent = clock.nodes();
                let result = self.min_value(state, &mv, 0, alpha, f64::INFINITY, &mut child);
                clock.absorb(&child);
                self.spent = 0;
                result
            } else {
                self.min_value(state, &mv, 0, alpha, f64::INFINITY, clock)
            };
            let line = match result {
                Ok(Some(line)) => line,
                Ok(None) => {
                    complete = false;
                    if self.config.split_time_per_move && !clock.check() {
                        debug!("minimax: {} ran out of its time slice", mv);
                        continue;
                    }
                    break;
                }
                Err(SearchError::Machine(e @ MachineError::GoalAmbiguous { .. })) => {
                    warn!("minimax: {} leads to {}, scoring it {}", mv, e, self.config.ambiguous_goal_score);
                    Line {
                        score: self.config.ambiguous_goal_score,
                        pv: Vec::new(),
                    }
                }
                Err(e) => return Err(e),
            };
            let score = line.score;
            if best.as_ref().map_or(true, |(_, b)| score > b.score) {
                alpha = alpha.max(score);
                best = Some((mv, line));
            }
            if self.config.stop_on_win && score >= 100.0 {
                break;
            }
        }
        Ok(RootResult { best, complete })
    }
}

/// Minimax engine with a configurable depth policy and heuristic.
#[derive(Debug)]
pub struct Minimax {
    config: MinimaxConfig,
    heuristic: Heuristic,
    rng: ChaCha8Rng,
    last: Option<SearchOutcome>,
}

impl Default for Minimax {
    fn default() -> Self {
        Self::new(MinimaxConfig::default(), Heuristic::default())
    }
}

impl Minimax {
    pub fn new(config: MinimaxConfig, heuristic: Heuristic) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            heuristic,
            rng,
            last: None,
        }
    }

    pub fn config(&self) -> &MinimaxConfig {
        &self.config
    }

    pub fn heuristic(&self) -> &Heuristic {
        &self.heuristic
    }

    /// Outcome of the most recent search.
    pub fn last_outcome(&self) -> Option<&SearchOutcome> {
        self.last.as_ref()
    }

    fn run_pass<M: StateMachine>(
        &mut self,
        ctx: Context<'_, M>,
        limit: Option<usize>,
        clock: &mut SearchClock,
    ) -> Result<(RootResult, bool), SearchError> {
        let node_budget = match self.config.depth {
            DepthPolicy::NodeBudget(budget) => Some(budget),
            _ => None,
        };
        let mut pass = Pass {
            machine: ctx.machine,
            role: ctx.role,
            limit,
            config: &self.config,
            heuristic: &self.heuristic,
            rng: &mut self.rng,
            node_budget,
            spent: 0,
            cut_off: false,
        };
        let root = pass.root(ctx.state, clock)?;
        Ok((root, !pass.cut_off))
    }

    /// Searches `ctx.state` within the configured share of `clock`.
    ///
    /// Returns `None` only when not even one root move was evaluated.
    pub fn search<M: StateMachine>(
        &mut self,
        ctx: Context<'_, M>,
        clock: &mut SearchClock,
    ) -> Result<Option<SearchOutcome>, SearchError> {
        let mut budget = clock.child(clock.deadline().fraction(self.config.budget_fraction));
        let (mut limit, step, max) = match self.config.depth {
            DepthPolicy::Exhaustive => (None, 0, None),
            DepthPolicy::Fixed(d) => (Some(d), 0, Some(d)),
            DepthPolicy::Iterative { start, step, max } => (Some(start), step.max(1), Some(max)),
            DepthPolicy::NodeBudget(_) => (Some(1), 1, None),
        };

        let mut outcome: Option<SearchOutcome> = None;
        loop {
            let (root, exact) = self.run_pass(ctx, limit, &mut budget)?;
            let Some((mv, line)) = root.best else { break };
            let score = line.score;
            if !root.complete {
                debug!("minimax: pass at depth {:?} interrupted", limit);
                if outcome.is_none() {
                    outcome = Some(SearchOutcome {
                        choice: Choice::new(mv, score),
                        depth: limit,
                        exact: false,
                        complete: false,
                        principal_variation: line.pv,
                        nodes: 0,
                    });
                }
                break;
            }
            debug!("minimax: depth {:?} -> {} ({:.1}), exact={}", limit, mv, score, exact);
            outcome = Some(SearchOutcome {
                choice: Choice::new(mv, score),
                depth: limit,
                exact,
                complete: true,
                principal_variation: line.pv,
                nodes: 0,
            });
            if exact || (self.config.stop_on_win && score >= 100.0) {
                break;
            }
            match (limit, max) {
                (Some(d), Some(max)) if d < max => limit = Some((d + step).min(max)),
                (Some(d), None) => limit = Some(d + step),
                _ => break,
            }
        }

        clock.absorb(&budget);
        if let Some(outcome) = &mut outcome {
            outcome.nodes = budget.nodes();
            info!(
                "minimax: {} at depth {:?}, exact={}, complete={}, {} nodes in {:?}",
                outcome.choice,
                outcome.depth,
                outcome.exact,
                outcome.complete,
                outcome.nodes,
                budget.elapsed()
            );
        }
        self.last = outcome.clone();
        Ok(outcome)
    }
}

impl<M: StateMachine> Strategy<M> for Minimax {
    fn name(&self) -> &str {
        "minimax"
    }

    fn select_move(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
        Ok(self.search(ctx, clock)?.map(|outcome| outcome.choice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Term;
    use crate::eval::PropnetMachine;
    use crate::games;
    use std::time::Duration;
    use test_log::test;

    fn long_clock() -> SearchClock {
        SearchClock::new(Deadline::after(Duration::from_secs(60)))
    }

    fn search(machine: &PropnetMachine, role: usize, state: &State, config: MinimaxConfig) -> SearchOutcome {
        let role = machine.roles()[role].clone();
        let mut minimax = Minimax::new(config, Heuristic::Zero);
        minimax
            .search(Context::new(machine, &role, state), &mut long_clock())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_counting_reaches_target() {
        let machine = PropnetMachine::from_description(&games::counting(10)).unwrap();
        let outcome = search(&machine, 0, &machine.initial_state(), MinimaxConfig::default());
        assert_eq!(outcome.choice.mv, Move::new(Term::constant("increment")));
        assert_eq!(outcome.choice.score, 100.0);
        assert_eq!(outcome.depth, Some(10));
        assert!(outcome.complete);
        assert_eq!(outcome.principal_variation.len(), 10);
    }

    #[test]
    fn test_zero_sum_tree_value() {
        let machine = PropnetMachine::from_description(&games::zero_sum_tree()).unwrap();
        let config = MinimaxConfig::default().with_depth(DepthPolicy::Exhaustive);
        let outcome = search(&machine, 0, &machine.initial_state(), config);
        assert_eq!(outcome.choice.score, 50.0);
        // Both picks are worth 50; the first one found is kept.
        assert_eq!(outcome.choice.mv, Move::new(Term::func("pick", [Term::constant("l")])));
        assert!(outcome.exact);
        assert_eq!(outcome.principal_variation.len(), 3);
    }

    #[test]
    fn test_zero_sum_tree_for_minimizer() {
        let machine = PropnetMachine::from_description(&games::zero_sum_tree()).unwrap();
        let state = machine.initial_state();
        let joint = machine.legal_joint_moves(&state).unwrap().remove(0);
        let next = machine.perform(&state, &joint).unwrap();
        let config = MinimaxConfig::default().with_depth(DepthPolicy::Exhaustive);
        let outcome = search(&machine, 1, &next, config);
        // After (pick l), min holds max to 50 by answering l.
        assert_eq!(outcome.choice.score, 50.0);
        assert_eq!(outcome.choice.mv, Move::new(Term::func("pick", [Term::constant("l")])));
    }

    #[test]
    fn test_pruning_agrees_with_plain_minimax() {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let state = machine.initial_state();
        for depth in [1, 2, 3, 4] {
            let base = MinimaxConfig::default()
                .with_depth(DepthPolicy::Fixed(depth))
                .with_stop_on_win(false);
            let pruned = search(&machine, 0, &state, base.clone().with_pruning(true));
            let plain = search(&machine, 0, &state, base.with_pruning(false));
            assert_eq!(pruned.choice, plain.choice, "depth {}", depth);
            assert!(pruned.nodes <= plain.nodes);
        }
    }

    #[test]
    fn test_nim_first_player_wins() {
        let machine = PropnetMachine::from_description(&games::nim(4, 2)).unwrap();
        let config = MinimaxConfig::default().with_depth(DepthPolicy::Exhaustive);
        let outcome = search(&machine, 0, &machine.initial_state(), config);
        assert_eq!(outcome.choice.score, 100.0);
        assert_eq!(outcome.choice.mv, Move::new(Term::func("take", [Term::constant("1")])));
    }

    #[test]
    fn test_iterative_deepening_stops_when_exact() {
        let machine = PropnetMachine::from_description(&games::nim(3, 2)).unwrap();
        let config = MinimaxConfig::default().with_stop_on_win(false);
        let outcome = search(&machine, 1, &machine.initial_state(), config);
        assert!(outcome.exact);
        assert!(outcome.depth.unwrap() <= 3);
    }

    #[test]
    fn test_ambiguous_goal_scores_default() {
        let machine = PropnetMachine::from_description(&games::ambiguous_goal()).unwrap();
        let config = MinimaxConfig::default().with_ambiguous_goal_score(7.0);
        let outcome = search(&machine, 0, &machine.initial_state(), config);
        assert_eq!(outcome.choice.mv, Move::new(Term::constant("go")));
        assert_eq!(outcome.choice.score, 7.0);
    }

    #[test]
    fn test_expired_clock_keeps_partial_best() {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut minimax = Minimax::new(
            MinimaxConfig::default().with_depth(DepthPolicy::Exhaustive).with_budget_fraction(1.0),
            Heuristic::Zero,
        );
        let mut clock = SearchClock::new(Deadline::after(Duration::from_millis(30)));
        let start = Instant::now();
        let outcome = minimax.search(Context::new(&machine, &role, &state), &mut clock).unwrap();
        assert!(start.elapsed() < Duration::from_millis(80));
        assert!(outcome.is_some());
    }

    #[test]
    fn test_node_budget_deepens_to_a_win() {
        let machine = PropnetMachine::from_description(&games::counting(10)).unwrap();
        let config = MinimaxConfig::default().with_depth(DepthPolicy::NodeBudget(1000));
        let outcome = search(&machine, 0, &machine.initial_state(), config);
        assert_eq!(outcome.choice.score, 100.0);
        assert_eq!(outcome.depth, Some(10));
        assert!(outcome.nodes <= 1000);
    }

    #[test]
    fn test_node_budget_stops_search() {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let config = MinimaxConfig::default().with_depth(DepthPolicy::NodeBudget(200));
        let outcome = search(&machine, 0, &machine.initial_state(), config);
        // The budget is overrun by the one node that detects it.
        assert_eq!(outcome.nodes, 201);
        assert!(outcome.depth.is_some_and(|d| d >= 1));
        assert!(!outcome.exact);
        assert!(machine.legal_moves(&machine.initial_state(), &machine.roles()[0]).contains(&outcome.choice.mv));
    }

    #[test]
    fn test_split_time_per_move() {
        let machine = PropnetMachine::from_description(&games::one_ply_choice()).unwrap();
        let config = MinimaxConfig::default().with_split_time_per_move(true);
        let outcome = search(&machine, 0, &machine.initial_state(), config);
        assert_eq!(outcome.choice.mv, Move::new(Term::func("choose", [Term::constant("b")])));
        assert_eq!(outcome.choice.score, 90.0);
    }
}
