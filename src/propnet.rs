//! Compiled propositional network.
//!
//! A [`Propnet`] owns the node arena and every index the evaluator needs:
//! bases with their transitions, per-role legal/input/goal/percept nodes, the
//! terminal and init propositions, and the precomputed evaluation order.
//! It is immutable after compilation and shared between evaluators through an
//! `Arc`.

use std::collections::HashMap;
use std::fmt;

use crate::ast::Term;
use crate::bitset::BitSet;
use crate::node::{Component, NodeId};
use crate::state::{Move, Role};

/// Nodes designated for one role.
///
/// # Invariants
///
/// - `legals[i]` and `inputs[i]` both correspond to `moves[i]`
#[derive(Debug, Clone, Default)]
pub struct RoleNodes {
    pub legals: Vec<NodeId>,
    pub inputs: Vec<NodeId>,
    pub moves: Vec<Move>,
    pub goals: Vec<(NodeId, u8)>,
    pub sees: Vec<(NodeId, Term)>,
    pub(crate) move_index: HashMap<Move, usize>,
}

impl RoleNodes {
    /// Position of a move in this role's lists.
    pub fn position(&self, mv: &Move) -> Option<usize> {
        self.move_index.get(mv).copied()
    }
}

/// What a proposition stands for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PropositionKind {
    Base,
    Input,
    Init,
    View,
}

pub struct Propnet {
    pub(crate) nodes: Vec<Component>,
    pub(crate) roles: Vec<Role>,
    pub(crate) bases: Vec<NodeId>,
    pub(crate) base_sentences: Vec<Term>,
    pub(crate) base_index: HashMap<Term, usize>,
    pub(crate) transitions: Vec<NodeId>,
    pub(crate) role_nodes: Vec<RoleNodes>,
    pub(crate) input_owner: HashMap<NodeId, (usize, usize)>,
    pub(crate) terminal: NodeId,
    pub(crate) init: NodeId,
    /// Base, input and init propositions.
    pub(crate) state_nodes: BitSet,
    pub(crate) order: Vec<NodeId>,
    pub(crate) layers: usize,
}

impl Propnet {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Component {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[Component] {
        &self.nodes
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Base propositions; position `i` is base index `i` of a state.
    pub fn bases(&self) -> &[NodeId] {
        &self.bases
    }

    pub fn base_sentence(&self, index: usize) -> &Term {
        &self.base_sentences[index]
    }

    pub fn base_sentences(&self) -> &[Term] {
        &self.base_sentences
    }

    pub fn base_index(&self, sentence: &Term) -> Option<usize> {
        self.base_index.get(sentence).copied()
    }

    /// Transition feeding base `index`.
    pub fn transition(&self, index: usize) -> NodeId {
        self.transitions[index]
    }

    pub fn role_nodes(&self, role: usize) -> &RoleNodes {
        &self.role_nodes[role]
    }

    /// Role index and move position of an input proposition.
    pub fn input_owner(&self, id: NodeId) -> Option<(usize, usize)> {
        self.input_owner.get(&id).copied()
    }

    pub fn terminal(&self) -> NodeId {
        self.terminal
    }

    pub fn init(&self) -> NodeId {
        self.init
    }

    /// True for base, input and init propositions.
    pub fn is_state_node(&self, id: NodeId) -> bool {
        self.state_nodes.contains(id.index())
    }

    pub fn proposition_kind(&self, id: NodeId) -> Option<PropositionKind> {
        match self.node(id) {
            Component::Proposition { input: None, .. } if id == self.init => Some(PropositionKind::Init),
            Component::Proposition { input: None, .. } => Some(PropositionKind::Input),
            Component::Proposition { input: Some(i), .. } => match self.node(*i) {
                Component::Transition(_) => Some(PropositionKind::Base),
                _ => Some(PropositionKind::View),
            },
            _ => None,
        }
    }

    /// Derived nodes in evaluation order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of scheduling layers.
    pub fn depth(&self) -> usize {
        self.layers
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.nodes.iter().filter(|c| c.kind() == kind).count()
    }
}

impl fmt::Debug for Propnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Propnet")
            .field("nodes", &self.nodes.len())
            .field("roles", &self.roles.len())
            .field("bases", &self.bases.len())
            .field("inputs", &self.input_owner.len())
            .field("scheduled", &self.order.len())
            .field("layers", &self.layers)
            .finish()
    }
}
