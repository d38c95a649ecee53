//! Propnet evaluation.
//!
//! Truth values live in a value buffer indexed by [`NodeId`], never in the
//! circuit itself: [`propagate`] is a pure function of the propnet and the
//! buffer. A [`PropnetMachine`] pairs a shared `Arc<Propnet>` with a private
//! buffer, so cloning one yields an independent evaluator for another thread.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::ast::{Description, Term};
use crate::bitset::BitSet;
use crate::compile;
use crate::error::{CompileError, MachineError};
use crate::machine::{PerceptMachine, StateMachine};
use crate::node::Component;
use crate::propnet::Propnet;
use crate::state::{Move, Role, State};

/// Behavior when no goal proposition holds for a role.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum MissingGoal {
    /// Report a goal of 0.
    #[default]
    Zero,
    /// Fail with [`MachineError::NoGoal`].
    Error,
}

#[derive(Debug, Copy, Clone, Default)]
pub struct MachineConfig {
    pub missing_goal: MissingGoal,
}

impl MachineConfig {
    pub fn with_missing_goal(mut self, missing_goal: MissingGoal) -> Self {
        self.missing_goal = missing_goal;
        self
    }
}

/// Computes every derived node of `net` in schedule order.
///
/// State nodes and constants must already hold their values.
pub fn propagate(net: &Propnet, values: &mut [bool]) {
    for &id in net.order() {
        let value = match net.node(id) {
            Component::Constant(value) => *value,
            Component::Proposition { input: Some(input), .. } => values[input.index()],
            Component::Proposition { input: None, .. } => values[id.index()],
            Component::And(inputs) => inputs.iter().all(|i| values[i.index()]),
            Component::Or(inputs) => inputs.iter().any(|i| values[i.index()]),
            Component::Not(input) => !values[input.index()],
            Component::Transition(input) => values[input.index()],
        };
        values[id.index()] = value;
    }
}

/// A value buffer with constants set and all state nodes false.
pub fn fresh_values(net: &Propnet) -> Vec<bool> {
    net.nodes()
        .iter()
        .map(|c| matches!(c, Component::Constant(true)))
        .collect()
}

struct Buffer {
    values: Vec<bool>,
    /// State whose move-free propagation the buffer currently holds.
    loaded: Option<State>,
}

/// [`StateMachine`] backed by a compiled propnet.
pub struct PropnetMachine {
    net: Arc<Propnet>,
    config: MachineConfig,
    buffer: RefCell<Buffer>,
}

impl PropnetMachine {
    pub fn new(net: Arc<Propnet>) -> Self {
        Self::with_config(net, MachineConfig::default())
    }

    pub fn with_config(net: Arc<Propnet>, config: MachineConfig) -> Self {
        let values = fresh_values(&net);
        Self {
            net,
            config,
            buffer: RefCell::new(Buffer { values, loaded: None }),
        }
    }

    /// Grounds, compiles and wraps a game description.
    pub fn from_description(description: &Description) -> Result<Self, CompileError> {
        Ok(Self::new(Arc::new(compile::compile(description)?)))
    }

    pub fn propnet(&self) -> &Arc<Propnet> {
        &self.net
    }

    pub fn config(&self) -> MachineConfig {
        self.config
    }

    /// Marks bases from `state`, clears inputs and init.
    fn mark_state(&self, values: &mut [bool], state: &State) {
        for (i, base) in self.net.bases().iter().enumerate() {
            values[base.index()] = state.contains(i);
        }
        for role in 0..self.net.roles().len() {
            for input in &self.net.role_nodes(role).inputs {
                values[input.index()] = false;
            }
        }
        values[self.net.init().index()] = false;
    }

    /// Runs `f` on a buffer holding the propagated values of `state` with no moves.
    fn with_state<T>(&self, state: &State, f: impl FnOnce(&[bool]) -> T) -> T {
        let mut buffer = self.buffer.borrow_mut();
        if buffer.loaded.as_ref() != Some(state) {
            self.mark_state(&mut buffer.values, state);
            propagate(&self.net, &mut buffer.values);
            buffer.loaded = Some(state.clone());
        }
        f(&buffer.values)
    }

    fn read_transitions(&self, values: &[bool]) -> State {
        let mut bits = BitSet::new(self.net.bases().len());
        for i in 0..self.net.bases().len() {
            if values[self.net.transition(i).index()] {
                bits.insert(i);
            }
        }
        State::from_bits(bits)
    }
}

impl Clone for PropnetMachine {
    /// Shares the circuit, allocates a fresh value buffer.
    fn clone(&self) -> Self {
        Self::with_config(Arc::clone(&self.net), self.config)
    }
}

impl fmt::Debug for PropnetMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropnetMachine")
            .field("net", &self.net)
            .field("config", &self.config)
            .finish()
    }
}

impl StateMachine for PropnetMachine {
    fn roles(&self) -> &[Role] {
        self.net.roles()
    }

    fn initial_state(&self) -> State {
        let mut buffer = self.buffer.borrow_mut();
        buffer.loaded = None;
        let values = &mut buffer.values;
        self.mark_state(values, &State::default());
        values[self.net.init().index()] = true;
        propagate(&self.net, values);
        let state = self.read_transitions(values);
        values[self.net.init().index()] = false;
        debug!("initial_state: {} true bases", state.len());
        state
    }

    fn is_terminal(&self, state: &State) -> bool {
        let terminal = self.net.terminal();
        self.with_state(state, |values| values[terminal.index()])
    }

    fn goal(&self, state: &State, role: &Role) -> Result<u8, MachineError> {
        let goals = &self.net.role_nodes(role.index()).goals;
        let satisfied: Vec<u8> = self.with_state(state, |values| {
            goals
                .iter()
                .filter(|(node, _)| values[node.index()])
                .map(|&(_, value)| value)
                .collect()
        });
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

    fn legal_moves(&self, state: &State, role: &Role) -> Vec<Move> {
        let nodes = self.net.role_nodes(role.index());
        self.with_state(state, |values| {
            nodes
                .legals
                .iter()
                .zip(&nodes.moves)
                .filter(|(legal, _)| values[legal.index()])
                .map(|(_, mv)| mv.clone())
                .collect()
        })
    }

    fn moves(&self, role: &Role) -> &[Move] {
        &self.net.role_nodes(role.index()).moves
    }

    fn next_state(&self, state: &State, joint: &[Option<Move>]) -> Result<State, MachineError> {
        let roles = self.net.roles();
        if joint.len() != roles.len() {
            return Err(MachineError::JointMoveArity {
                expected: roles.len(),
                got: joint.len(),
            });
        }

        let mut buffer = self.buffer.borrow_mut();
        buffer.loaded = None;
        let values = &mut buffer.values;
        self.mark_state(values, state);
        for (role, mv) in roles.iter().zip(joint) {
            let Some(mv) = mv else { continue };
            let nodes = self.net.role_nodes(role.index());
            let position = nodes.position(mv).ok_or_else(|| MachineError::UnknownMove {
                role: role.to_string(),
                mv: mv.to_string(),
            })?;
            values[nodes.inputs[position].index()] = true;
        }
        propagate(&self.net, values);
        Ok(self.read_transitions(values))
    }

    fn state_sentences(&self, state: &State) -> Vec<Term> {
        state.iter().map(|i| self.net.base_sentence(i).clone()).collect()
    }

    fn base_index(&self, sentence: &Term) -> Option<usize> {
        self.net.base_index(sentence)
    }
}

impl PerceptMachine for PropnetMachine {
    fn percepts(&self, state: &State, role: &Role) -> Vec<Term> {
        let sees = &self.net.role_nodes(role.index()).sees;
        self.with_state(state, |values| {
            sees.iter()
                .filter(|(node, _)| values[node.index()])
                .map(|(_, percept)| percept.clone())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Literal, Rule};
    use crate::games;
    use test_log::test;

    fn machine(description: &Description) -> PropnetMachine {
        PropnetMachine::from_description(description).unwrap()
    }

    fn count_of(m: &PropnetMachine, state: &State) -> String {
        m.state_sentences(state).iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_counting_walkthrough() {
        let m = machine(&games::counting(10));
        let robot = m.roles()[0].clone();
        let mut state = m.initial_state();
        assert_eq!(count_of(&m, &state), "(count 0)");

        for step in 0..10 {
            assert!(!m.is_terminal(&state), "terminal too early at step {}", step);
            assert_eq!(m.goal(&state, &robot), Ok(0));
            let moves = m.legal_moves(&state, &robot);
            assert_eq!(moves.len(), 1);
            assert_eq!(moves[0].to_string(), "increment");
            state = m.perform(&state, &moves).unwrap();
        }
        assert!(m.is_terminal(&state));
        assert_eq!(count_of(&m, &state), "(count 10)");
        assert_eq!(m.goal(&state, &robot), Ok(100));
    }

    #[test]
    fn test_next_state_is_deterministic() {
        let m = machine(&games::tic_tac_toe());
        let state = m.initial_state();
        for joint in m.legal_joint_moves(&state).unwrap() {
            let a = m.perform(&state, &joint).unwrap();
            let b = m.perform(&state, &joint).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_null_move_marks_nothing() {
        let m = machine(&games::counting(3));
        let state = m.initial_state();
        let next = m.next_state(&state, &[None]).unwrap();
        // Without an increment the counter has no successor fact.
        assert!(next.is_empty());
    }

    #[test]
    fn test_joint_move_arity() {
        let m = machine(&games::tic_tac_toe());
        let state = m.initial_state();
        assert_eq!(
            m.next_state(&state, &[None]),
            Err(MachineError::JointMoveArity { expected: 2, got: 1 })
        );
    }

    #[test]
    fn test_unknown_move() {
        let m = machine(&games::counting(3));
        let state = m.initial_state();
        let bogus = Move::new(Term::constant("jump"));
        assert!(matches!(
            m.next_state(&state, &[Some(bogus)]),
            Err(MachineError::UnknownMove { .. })
        ));
    }

    #[test]
    fn test_goal_ambiguous() {
        let m = machine(&games::ambiguous_goal());
        let role = m.roles()[0].clone();
        let state = m.initial_state();
        let moves = m.legal_moves(&state, &role);
        let end = m.perform(&state, &moves[..1]).unwrap();
        assert!(m.is_terminal(&end));
        assert!(matches!(m.goal(&end, &role), Err(MachineError::GoalAmbiguous { count: 2, .. })));
    }

    #[test]
    fn test_missing_goal_policy() {
        let mut description = games::counting(2);
        // Drop the "otherwise 0" goal rule.
        let rules: Vec<Rule> = description
            .rules()
            .iter()
            .filter(|r| !(r.head.is("goal") && r.body.iter().any(|l| matches!(l, Literal::Neg(_)))))
            .cloned()
            .collect();
        description = rules.into_iter().collect();

        let net = Arc::new(compile::compile(&description).unwrap());
        let lenient = PropnetMachine::new(Arc::clone(&net));
        let strict = PropnetMachine::with_config(net, MachineConfig::default().with_missing_goal(MissingGoal::Error));
        let state = lenient.initial_state();
        let role = lenient.roles()[0].clone();
        assert_eq!(lenient.goal(&state, &role), Ok(0));
        assert!(matches!(strict.goal(&state, &role), Err(MachineError::NoGoal { .. })));
    }

    #[test]
    fn test_clone_is_independent() {
        let a = machine(&games::tic_tac_toe());
        let b = a.clone();
        assert!(Arc::ptr_eq(a.propnet(), b.propnet()));
        let s0 = a.initial_state();
        let joint = a.legal_joint_moves(&s0).unwrap().remove(0);
        let s1 = a.perform(&s0, &joint).unwrap();
        // Interleaved queries on two evaluators do not disturb each other.
        assert!(!b.is_terminal(&s1));
        assert_eq!(a.legal_moves(&s0, &a.roles()[0]).len(), 9);
        assert_eq!(b.legal_moves(&s1, &b.roles()[1]).len(), 8);
    }

    #[test]
    fn test_percepts() {
        let m = machine(&games::hidden_coin());
        let state = m.initial_state();
        let guesser = m.role_by_name(&Term::constant("guesser")).unwrap();
        assert!(m.percepts(&state, &guesser).is_empty());

        let setter = m.role_by_name(&Term::constant("setter")).unwrap();
        let joint = vec![
            m.legal_moves(&state, &setter)[0].clone(),
            m.legal_moves(&state, &guesser)[0].clone(),
        ];
        let next = m.perform(&state, &joint).unwrap();
        assert_eq!(
            m.percepts(&next, &guesser).iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            vec!["ready"]
        );
    }
}
