//! Game states, moves and roles.

use std::fmt;

use crate::ast::Term;
use crate::bitset::BitSet;

/// Set of true base propositions, indexed by the machine's base order.
///
/// # Invariants
///
/// - Immutable once built; successor states are new values
/// - Only comparable with states of the same machine (same base universe)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct State {
    bits: BitSet,
}

impl State {
    pub fn from_bits(bits: BitSet) -> Self {
        Self { bits }
    }

    /// Returns true if the base with the given index holds.
    pub fn contains(&self, base: usize) -> bool {
        self.bits.contains(base)
    }

    /// Number of true bases.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Indices of the true bases.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter()
    }

    pub fn bits(&self) -> &BitSet {
        &self.bits
    }
}

impl FromIterator<usize> for State {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::from_bits(iter.into_iter().collect())
    }
}

/// One action of one role, e.g. `(mark 1 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Move(Term);

impl Move {
    pub fn new(term: Term) -> Self {
        Move(term)
    }

    pub fn term(&self) -> &Term {
        &self.0
    }
}

impl From<Term> for Move {
    fn from(term: Term) -> Self {
        Move(term)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One move per role, in role order.
pub type JointMove = Vec<Move>;

/// A player of the game with its fixed position in role order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Role {
    index: usize,
    name: Term,
}

impl Role {
    pub fn new(index: usize, name: Term) -> Self {
        Self { index, name }
    }

    /// Position in role order; indexes joint moves.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &Term {
        &self.name
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
