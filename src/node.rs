use std::fmt;
use std::slice;

use crate::ast::Atom;

/// Index of a component in a propnet arena.
///
/// # Invariants
///
/// - Only meaningful for the propnet that issued it
/// - Doubles as the index into an evaluation value buffer
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// One circuit component.
///
/// The set of kinds is closed. Truth values are not stored here but in a
/// value buffer indexed by [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Constant(bool),
    /// A named proposition. Without an input it is state (an input or the
    /// init proposition); fed by a [`Component::Transition`] it is a base;
    /// otherwise it is a view of its input.
    Proposition { sentence: Atom, input: Option<NodeId> },
    And(Box<[NodeId]>),
    Or(Box<[NodeId]>),
    Not(NodeId),
    /// Carries the next value of the base proposition it feeds.
    Transition(NodeId),
}

impl Component {
    pub fn inputs(&self) -> &[NodeId] {
        match self {
            Component::Constant(_) => &[],
            Component::Proposition { input, .. } => input.as_slice(),
            Component::And(inputs) | Component::Or(inputs) => inputs,
            Component::Not(input) | Component::Transition(input) => slice::from_ref(input),
        }
    }

    pub fn is_proposition(&self) -> bool {
        matches!(self, Component::Proposition { .. })
    }

    pub fn sentence(&self) -> Option<&Atom> {
        match self {
            Component::Proposition { sentence, .. } => Some(sentence),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Component::Constant(_) => "const",
            Component::Proposition { .. } => "prop",
            Component::And(_) => "and",
            Component::Or(_) => "or",
            Component::Not(_) => "not",
            Component::Transition(_) => "transition",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_inputs() {
        let a = NodeId::new(1);
        let b = NodeId::new(2);
        assert!(Component::Constant(true).inputs().is_empty());
        assert_eq!(Component::And(vec![a, b].into()).inputs(), &[a, b]);
        assert_eq!(Component::Not(a).inputs(), &[a]);
        let view = Component::Proposition {
            sentence: Atom::prop("terminal"),
            input: Some(b),
        };
        assert_eq!(view.inputs(), &[b]);
        assert_eq!(view.sentence().map(|s| s.to_string()), Some("terminal".to_string()));
    }
}
