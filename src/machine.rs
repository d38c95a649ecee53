//! The state-machine interface between game rules and search.
//!
//! Search engines only talk to a [`StateMachine`]. The crate provides the
//! propnet evaluator ([`PropnetMachine`][crate::eval::PropnetMachine]), a
//! reference prover ([`ProverMachine`][crate::prover::ProverMachine]) and a
//! memoizing wrapper ([`CachedMachine`][crate::cache::CachedMachine]).

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::ast::Term;
use crate::error::MachineError;
use crate::state::{JointMove, Move, Role, State};

pub trait StateMachine {
    /// Roles in their fixed order.
    fn roles(&self) -> &[Role];

    fn initial_state(&self) -> State;

    fn is_terminal(&self, state: &State) -> bool;

    /// Goal value in `0..=100` of `role` in `state`.
    ///
    /// Fails with [`MachineError::GoalAmbiguous`] when several goals hold.
    fn goal(&self, state: &State, role: &Role) -> Result<u8, MachineError>;

    /// Legal moves of `role`, in a fixed order.
    fn legal_moves(&self, state: &State, role: &Role) -> Vec<Move>;

    /// Every move `role` can play in some state, in the order of
    /// [`legal_moves`][StateMachine::legal_moves].
    fn moves(&self, role: &Role) -> &[Move];

    /// Successor of `state` after a joint move, one entry per role.
    ///
    /// `None` plays nothing for that role (the null move of factored search).
    fn next_state(&self, state: &State, joint: &[Option<Move>]) -> Result<State, MachineError>;

    /// Sentences of the bases true in `state`.
    fn state_sentences(&self, state: &State) -> Vec<Term>;

    /// Base index of a sentence, if it belongs to the state universe.
    fn base_index(&self, sentence: &Term) -> Option<usize>;

    fn role_by_name(&self, name: &Term) -> Option<Role> {
        self.roles().iter().find(|r| r.name() == name).cloned()
    }

    /// Goal values of every role, in role order.
    fn goals(&self, state: &State) -> Result<Vec<u8>, MachineError> {
        self.roles().iter().map(|role| self.goal(state, role)).collect()
    }

    /// Successor after a complete joint move.
    fn perform(&self, state: &State, joint: &[Move]) -> Result<State, MachineError> {
        let joint: Vec<Option<Move>> = joint.iter().cloned().map(Some).collect();
        self.next_state(state, &joint)
    }

    /// Every combination of legal moves, role order, first role varying slowest.
    fn legal_joint_moves(&self, state: &State) -> Result<Vec<JointMove>, MachineError> {
        let mut per_role = Vec::with_capacity(self.roles().len());
        for role in self.roles() {
            let moves = self.legal_moves(state, role);
            if moves.is_empty() {
                return Err(MachineError::NoLegalMoves {
                    role: role.to_string(),
                });
            }
            per_role.push(moves);
        }
        let mut joints: Vec<JointMove> = vec![Vec::with_capacity(per_role.len())];
        for moves in &per_role {
            joints = joints
                .into_iter()
                .flat_map(|prefix| {
                    moves.iter().map(move |mv| {
                        let mut joint = prefix.clone();
                        joint.push(mv.clone());
                        joint
                    })
                })
                .collect();
        }
        Ok(joints)
    }

    fn random_joint_move<R: Rng + ?Sized>(&self, state: &State, rng: &mut R) -> Result<JointMove, MachineError>
    where
        Self: Sized,
    {
        self.roles()
            .iter()
            .map(|role| {
                self.legal_moves(state, role)
                    .choose(rng)
                    .cloned()
                    .ok_or_else(|| MachineError::NoLegalMoves {
                        role: role.to_string(),
                    })
            })
            .collect()
    }

    fn random_next_state<R: Rng + ?Sized>(&self, state: &State, rng: &mut R) -> Result<State, MachineError>
    where
        Self: Sized,
    {
        let joint = self.random_joint_move(state, rng)?;
        self.perform(state, &joint)
    }

    /// Plays uniformly random joint moves until a terminal state; returns it
    /// with the number of steps taken.
    fn depth_charge<R: Rng + ?Sized>(&self, state: &State, rng: &mut R) -> Result<(State, usize), MachineError>
    where
        Self: Sized,
    {
        let mut current = state.clone();
        let mut depth = 0;
        while !self.is_terminal(&current) {
            current = self.random_next_state(&current, rng)?;
            depth += 1;
        }
        Ok((current, depth))
    }

    /// [`depth_charge`][StateMachine::depth_charge] that asks `stop` before
    /// every step and gives up with `None` once it returns `true`.
    fn depth_charge_until<R, F>(
        &self,
        state: &State,
        rng: &mut R,
        mut stop: F,
    ) -> Result<Option<(State, usize)>, MachineError>
    where
        Self: Sized,
        R: Rng + ?Sized,
        F: FnMut() -> bool,
    {
        let mut current = state.clone();
        let mut depth = 0;
        while !self.is_terminal(&current) {
            if stop() {
                return Ok(None);
            }
            current = self.random_next_state(&current, rng)?;
            depth += 1;
        }
        Ok(Some((current, depth)))
    }
}

/// A state machine for games with percepts (`sees`).
pub trait PerceptMachine: StateMachine {
    /// Percepts of `role` in `state`, sorted by their text.
    fn percepts(&self, state: &State, role: &Role) -> Vec<Term>;
}
