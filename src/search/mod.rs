//! Move selection under a wall-clock budget.
//!
//! Every engine implements [`Strategy`] for any [`StateMachine`]. A
//! [`Player`] owns the machine, the current state and one boxed strategy;
//! it turns a match host's deadline into a [`SearchClock`], asks the
//! strategy for a move and falls back to the first legal move whenever the
//! strategy fails or comes back empty-handed.
//!
//! Engines:
//!
//! - [`Minimax`]: paranoid minimax with optional alpha-beta pruning,
//!   depth policies and [`Heuristic`] evaluation at the horizon
//! - [`Mcts`] and [`ThreadedMcts`]: hybrid Monte Carlo tree search over a
//!   [`GameTree`]
//! - [`FactoredMcts`]: one tree per independent subgame
//! - [`HypothesisSearch`]: belief-weighted search for games with percepts
//! - [`Legal`] and [`Random`] baselines

use std::fmt;

use crate::ast::Term;
use crate::error::SearchError;
use crate::machine::StateMachine;
use crate::state::{Move, Role, State};

pub mod clock;
pub mod factored;
pub mod heuristic;
pub mod hypothesis;
pub mod mcts;
pub mod minimax;
pub mod player;
pub mod simple;
pub mod tree;

pub use clock::{Deadline, SearchClock};
pub use factored::FactoredMcts;
pub use heuristic::Heuristic;
pub use hypothesis::HypothesisSearch;
pub use mcts::{Mcts, MctsConfig, ThreadedMcts};
pub use minimax::{DepthPolicy, Minimax, MinimaxConfig, SearchOutcome};
pub use player::{LogObserver, MoveObserver, MoveSelected, Player, PlayerConfig};
pub use simple::{Legal, Random};
pub use tree::{GameTree, PendingSample};

/// A move recommended by a strategy, with its estimated value in `0..=100`.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub mv: Move,
    pub score: f64,
}

impl Choice {
    pub fn new(mv: Move, score: f64) -> Self {
        Self { mv, score }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.1})", self.mv, self.score)
    }
}

/// What a strategy sees of the match: the rules, its role, the current state.
pub struct Context<'a, M> {
    pub machine: &'a M,
    pub role: &'a Role,
    pub state: &'a State,
}

impl<M> Clone for Context<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Context<'_, M> {}

impl<'a, M: StateMachine> Context<'a, M> {
    pub fn new(machine: &'a M, role: &'a Role, state: &'a State) -> Self {
        Self { machine, role, state }
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        self.machine.legal_moves(self.state, self.role)
    }
}

pub trait Strategy<M: StateMachine> {
    fn name(&self) -> &str;

    /// Called once before the first move with the start clock.
    fn meta_game(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<(), SearchError> {
        let _ = (ctx, clock);
        Ok(())
    }

    /// Picks a move for `ctx.role` in `ctx.state`, or `None` when it has
    /// no opinion.
    fn select_move(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<Option<Choice>, SearchError>;

    /// Called after a joint move was played; `ctx.state` is the new state.
    fn observe(&mut self, ctx: Context<'_, M>, joint: &[Move]) {
        let _ = (ctx, joint);
    }

    /// Called with the percepts received at the start of a turn.
    fn perceive(&mut self, percepts: &[Term]) {
        let _ = percepts;
    }
}

impl<M: StateMachine, S: Strategy<M> + ?Sized> Strategy<M> for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn meta_game(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<(), SearchError> {
        (**self).meta_game(ctx, clock)
    }

    fn select_move(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
        (**self).select_move(ctx, clock)
    }

    fn observe(&mut self, ctx: Context<'_, M>, joint: &[Move]) {
        (**self).observe(ctx, joint)
    }

    fn perceive(&mut self, percepts: &[Term]) {
        (**self).perceive(percepts)
    }
}
