//! Error types.
//!
//! Compile-time errors abort match setup; [`MachineError`]s are raised per
//! query and are recoverable; [`SearchError`]s are what a strategy can report
//! to the [`Player`][crate::search::player::Player], which never lets them
//! escape move selection except where noted.

use thiserror::Error;

/// Malformed or unstratifiable rule set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompileError {
    #[error("no role declarations")]
    NoRoles,

    #[error("role '{role}' is declared more than once")]
    DuplicateRole { role: String },

    #[error("no rule or fact defines 'terminal'")]
    NoTerminal,

    #[error("relation '{relation}' cannot appear in a rule head: {rule}")]
    ReservedHead { relation: String, rule: String },

    #[error("variable ?{var} is not bound by a positive literal in {rule}")]
    UnsafeRule { var: String, rule: String },

    #[error("negation through recursion involving relation '{relation}'")]
    Unstratified { relation: String },

    #[error("goal value '{value}' is not an integer in 0..=100")]
    InvalidGoal { value: String },

    #[error("'init' must not depend on 'true' or 'does': {rule}")]
    DynamicInit { rule: String },

    #[error("the derived dependency graph has a cycle through {remaining} nodes")]
    Cycle { remaining: usize },
}

/// Failure of a single state-machine query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MachineError {
    #[error("{count} goal propositions are true at once for role '{role}'")]
    GoalAmbiguous { role: String, count: usize },

    #[error("no goal proposition is true for role '{role}'")]
    NoGoal { role: String },

    #[error("move '{mv}' is not a known input for role '{role}'")]
    UnknownMove { role: String, mv: String },

    #[error("joint move has {got} entries, expected one per role ({expected})")]
    JointMoveArity { expected: usize, got: usize },

    #[error("role '{role}' has no legal move in a non-terminal state")]
    NoLegalMoves { role: String },
}

/// Failure reported by a search strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SearchError {
    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error("no legal move for role '{role}'")]
    NoLegalMoves { role: String },

    #[error("search produced no move")]
    NoResult,

    #[error("search worker panicked")]
    WorkerPanicked,
}

/// Any error produced by this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("state machine error: {0}")]
    Machine(#[from] MachineError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),
}

/// Convenience type alias for Results using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
