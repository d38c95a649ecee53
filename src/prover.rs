//! Reference state machine evaluating the ground program directly.
//!
//! Slow but simple: every query re-derives all dynamic atoms stratum by
//! stratum. Used to cross-check the propnet and as a fallback when a game
//! does not compile to an acyclic circuit.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{rel, Atom, Description, Term};
use crate::bitset::BitSet;
use crate::error::{CompileError, MachineError};
use crate::eval::{MachineConfig, MissingGoal};
use crate::ground::{self, AtomId, GroundProgram};
use crate::machine::{PerceptMachine, StateMachine};
use crate::state::{Move, Role, State};

#[derive(Debug, Clone)]
pub struct ProverMachine {
    program: Arc<GroundProgram>,
    config: MachineConfig,
    roles: Vec<Role>,
    /// `true(base_i)` atom of every base.
    base_atoms: Vec<Option<AtomId>>,
    next_atoms: Vec<Option<AtomId>>,
    legal_atoms: Vec<Vec<Option<AtomId>>>,
    moves: Vec<Vec<Move>>,
    does_atoms: Vec<HashMap<Move, AtomId>>,
    base_index: HashMap<Term, usize>,
    terminal: Option<AtomId>,
    initial: State,
}

impl ProverMachine {
    pub fn new(program: Arc<GroundProgram>) -> Self {
        Self::with_config(program, MachineConfig::default())
    }

    pub fn with_config(program: Arc<GroundProgram>, config: MachineConfig) -> Self {
        let roles: Vec<Role> = program
            .roles()
            .iter()
            .enumerate()
            .map(|(i, name)| Role::new(i, name.clone()))
            .collect();
        let bases = program.bases();
        let base_atoms = bases
            .iter()
            .map(|b| program.lookup(&Atom::new(rel::TRUE, [b.clone()])))
            .collect();
        let next_atoms = bases
            .iter()
            .map(|b| program.lookup(&Atom::new(rel::NEXT, [b.clone()])))
            .collect();
        let mut initial = BitSet::new(bases.len());
        for (i, base) in bases.iter().enumerate() {
            let init = program.lookup(&Atom::new(rel::INIT, [base.clone()]));
            if init.and_then(|id| program.fixed(id)) == Some(true) {
                initial.insert(i);
            }
        }
        let legal_atoms = roles
            .iter()
            .map(|role| {
                program
                    .moves(role.index())
                    .iter()
                    .map(|mv| program.lookup(&Atom::new(rel::LEGAL, [role.name().clone(), mv.clone()])))
                    .collect()
            })
            .collect();
        let moves = roles
            .iter()
            .map(|role| program.moves(role.index()).iter().cloned().map(Move::new).collect())
            .collect();
        let does_atoms = roles
            .iter()
            .map(|role| {
                program
                    .moves(role.index())
                    .iter()
                    .filter_map(|mv| {
                        let id = program.lookup(&Atom::new(rel::DOES, [role.name().clone(), mv.clone()]))?;
                        Some((Move::new(mv.clone()), id))
                    })
                    .collect()
            })
            .collect();
        let base_index = bases.iter().enumerate().map(|(i, b)| (b.clone(), i)).collect();
        let terminal = program.lookup(&Atom::prop(rel::TERMINAL));
        Self {
            program,
            config,
            roles,
            base_atoms,
            next_atoms,
            legal_atoms,
            moves,
            does_atoms,
            base_index,
            terminal,
            initial: State::from_bits(initial),
        }
    }

    pub fn from_description(description: &Description) -> Result<Self, CompileError> {
        Ok(Self::new(Arc::new(ground::ground(description)?)))
    }

    pub fn program(&self) -> &Arc<GroundProgram> {
        &self.program
    }

    /// Truth of every atom given a state and an optional set of played `does` atoms.
    fn derive(&self, state: &State, does: &[AtomId]) -> Vec<bool> {
        let program = &*self.program;
        let mut values: Vec<bool> = (0..program.atoms().len())
            .map(|id| program.fixed(id).unwrap_or(false))
            .collect();
        for i in state.iter() {
            if let Some(Some(id)) = self.base_atoms.get(i) {
                values[*id] = true;
            }
        }
        for &id in does {
            values[id] = true;
        }
        for stratum in program.strata() {
            let rules = &program.rules()[stratum.clone()];
            loop {
                let mut changed = false;
                for rule in rules {
                    if values[rule.head] {
                        continue;
                    }
                    if rule.pos.iter().all(|&p| values[p]) && rule.neg.iter().all(|&n| !values[n]) {
                        values[rule.head] = true;
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }
        }
        values
    }

    fn holds(values: &[bool], atom: Option<AtomId>) -> bool {
        atom.is_some_and(|id| values[id])
    }
}

impl StateMachine for ProverMachine {
    fn roles(&self) -> &[Role] {
        &self.roles
    }

    fn initial_state(&self) -> State {
        self.initial.clone()
    }

    fn is_terminal(&self, state: &State) -> bool {
        let values = self.derive(state, &[]);
        Self::holds(&values, self.terminal)
    }

    fn goal(&self, state: &State, role: &Role) -> Result<u8, MachineError> {
        let values = self.derive(state, &[]);
        let satisfied: Vec<u8> = self
            .program
            .goals(role.index())
            .into_iter()
            .filter(|&(id, _)| values[id])
            .map(|(_, value)| value)
            .collect();
        match satisfied.as_slice() {
            [value] => Ok(*value),
            [] => match self.config.missing_goal {
                MissingGoal::Zero => Ok(0),
                MissingGoal::Error => Err(MachineError::NoGoal {
                    role: role.to_string(),
                }),
            },
            many => Err(MachineError::GoalAmbiguous {
                role: role.to_string(),
                count: many.len(),
            }),
        }
    }

    fn moves(&self, role: &Role) -> &[Move] {
        &self.moves[role.index()]
    }

    fn legal_moves(&self, state: &State, role: &Role) -> Vec<Move> {
        let values = self.derive(state, &[]);
        self.program
            .moves(role.index())
            .iter()
            .zip(&self.legal_atoms[role.index()])
            .filter(|(_, &atom)| Self::holds(&values, atom))
            .map(|(mv, _)| Move::new(mv.clone()))
            .collect()
    }

    fn next_state(&self, state: &State, joint: &[Option<Move>]) -> Result<State, MachineError> {
        if joint.len() != self.roles.len() {
            return Err(MachineError::JointMoveArity {
                expected: self.roles.len(),
                got: joint.len(),
            });
        }
        let mut does = Vec::with_capacity(joint.len());
        for (role, mv) in self.roles.iter().zip(joint) {
            let Some(mv) = mv else { continue };
            let id = self.does_atoms[role.index()]
                .get(mv)
                .ok_or_else(|| MachineError::UnknownMove {
                    role: role.to_string(),
                    mv: mv.to_string(),
                })?;
            does.push(*id);
        }
        let values = self.derive(state, &does);
        let mut bits = BitSet::new(self.next_atoms.len());
        for (i, &atom) in self.next_atoms.iter().enumerate() {
            if Self::holds(&values, atom) {
                bits.insert(i);
            }
        }
        Ok(State::from_bits(bits))
    }

    fn state_sentences(&self, state: &State) -> Vec<Term> {
        state.iter().map(|i| self.program.bases()[i].clone()).collect()
    }

    fn base_index(&self, sentence: &Term) -> Option<usize> {
        self.base_index.get(sentence).copied()
    }
}

impl PerceptMachine for ProverMachine {
    fn percepts(&self, state: &State, role: &Role) -> Vec<Term> {
        let values = self.derive(state, &[]);
        self.program
            .sees(role.index())
            .into_iter()
            .filter(|&(id, _)| values[id])
            .map(|(_, percept)| percept)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PropnetMachine;
    use crate::games;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    /// Plays random games on the propnet and checks every query against the prover.
    fn cross_check(description: &Description, games_to_play: usize) {
        let propnet = PropnetMachine::from_description(description).unwrap();
        let prover = ProverMachine::from_description(description).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        assert_eq!(propnet.initial_state(), prover.initial_state());
        for _ in 0..games_to_play {
            let mut state = propnet.initial_state();
            loop {
                assert_eq!(propnet.is_terminal(&state), prover.is_terminal(&state));
                assert_eq!(propnet.goals(&state), prover.goals(&state));
                for role in propnet.roles() {
                    assert_eq!(propnet.legal_moves(&state, role), prover.legal_moves(&state, role));
                    assert_eq!(propnet.percepts(&state, role), prover.percepts(&state, role));
                }
                if propnet.is_terminal(&state) {
                    break;
                }
                let joint = propnet.random_joint_move(&state, &mut rng).unwrap();
                let next = propnet.perform(&state, &joint).unwrap();
                assert_eq!(next, prover.perform(&state, &joint).unwrap());
                state = next;
            }
        }
    }

    #[test]
    fn test_agrees_with_propnet_counting() {
        cross_check(&games::counting(6), 1);
    }

    #[test]
    fn test_agrees_with_propnet_nim() {
        cross_check(&games::nim(3, 2), 10);
    }

    #[test]
    fn test_agrees_with_propnet_tic_tac_toe() {
        cross_check(&games::tic_tac_toe(), 20);
    }

    #[test]
    fn test_agrees_with_propnet_hidden_coin() {
        cross_check(&games::hidden_coin(), 5);
    }

    #[test]
    fn test_agrees_with_propnet_twin_counters() {
        cross_check(&games::twin_counters(), 10);
    }

    #[test]
    fn test_null_moves() {
        let prover = ProverMachine::from_description(&games::twin_counters()).unwrap();
        let state = prover.initial_state();
        let next = prover.next_state(&state, &[None]).unwrap();
        // Counters only advance when pressed; the frame axioms keep both.
        assert_eq!(next, state);
    }
}
