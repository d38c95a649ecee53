//! Belief-state tracking for games with imperfect information.
//!
//! A [`BeliefTree`] enumerates every joint-move history from the initial
//! state and prunes those whose predicted percepts disagree with what the
//! player actually saw. Nodes start [`Possibility::Unknown`] and are marked
//! once the observation for their turn is available; marking a node
//! impossible marks its whole subtree.

use std::collections::HashMap;

use log::{debug, warn};

use crate::ast::Term;
use crate::error::MachineError;
use crate::machine::PerceptMachine;
use crate::state::{JointMove, Role, State};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Possibility {
    Unknown,
    Possible,
    Impossible,
}

/// One state hypothesis.
#[derive(Debug, Clone)]
pub struct BeliefNode {
    state: State,
    parent: Option<usize>,
    joint: Option<JointMove>,
    /// Probability of the edge from the parent.
    probability: f64,
    depth: usize,
    terminal: bool,
    possibility: Possibility,
    children: Option<Vec<usize>>,
}

impl BeliefNode {
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Joint move leading here from the parent.
    pub fn joint_move(&self) -> Option<&JointMove> {
        self.joint.as_ref()
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn possibility(&self) -> Possibility {
        self.possibility
    }

    /// Child indices, `None` until successors are built.
    pub fn children(&self) -> Option<&[usize]> {
        self.children.as_deref()
    }
}

pub struct BeliefTree<M> {
    machine: M,
    role: Role,
    nodes: Vec<BeliefNode>,
    /// Percepts observed at the start of turn `i + 1`, sorted by text.
    sees: Vec<Vec<Term>>,
    /// Base index -> known truth value.
    known: HashMap<usize, bool>,
}

impl<M: PerceptMachine> BeliefTree<M> {
    /// Root is the initial state, marked possible, with successors built.
    pub fn new(machine: M, role: Role) -> Result<Self, MachineError> {
        let state = machine.initial_state();
        let terminal = machine.is_terminal(&state);
        let mut tree = Self {
            machine,
            role,
            nodes: vec![BeliefNode {
                state,
                parent: None,
                joint: None,
                probability: 1.0,
                depth: 0,
                terminal,
                possibility: Possibility::Possible,
                children: None,
            }],
            sees: Vec::new(),
            known: HashMap::new(),
        };
        tree.build_successors(0)?;
        Ok(tree)
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, id: usize) -> &BeliefNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Number of recorded observations.
    pub fn observations(&self) -> usize {
        self.sees.len()
    }

    /// Records what the player saw at the start of the next turn.
    pub fn append_sees(&mut self, mut percepts: Vec<Term>) {
        percepts.sort_by_cached_key(|t| t.to_string());
        self.sees.push(percepts);
    }

    /// Records base truths inferred independently of percepts.
    ///
    /// Sentences outside the game's base universe are ignored. Only nodes
    /// marked after this call are checked against them.
    pub fn set_known_truths(&mut self, truths: &HashMap<Term, bool>) {
        for (sentence, &value) in truths {
            match self.machine.base_index(sentence) {
                Some(index) => {
                    self.known.insert(index, value);
                }
                None => debug!("set_known_truths: {} is not a base", sentence),
            }
        }
    }

    fn build_successors(&mut self, id: usize) -> Result<(), MachineError> {
        if self.nodes[id].children.is_some() {
            return Ok(());
        }
        if self.nodes[id].terminal {
            self.nodes[id].children = Some(Vec::new());
            return Ok(());
        }
        let state = self.nodes[id].state.clone();
        let joints = self.machine.legal_joint_moves(&state)?;
        let probability = 1.0 / joints.len() as f64;
        let depth = self.nodes[id].depth + 1;
        let mut children = Vec::with_capacity(joints.len());
        for joint in joints {
            let next = self.machine.perform(&state, &joint)?;
            let terminal = self.machine.is_terminal(&next);
            children.push(self.nodes.len());
            self.nodes.push(BeliefNode {
                state: next,
                parent: Some(id),
                joint: Some(joint),
                probability,
                depth,
                terminal,
                possibility: Possibility::Unknown,
                children: None,
            });
        }
        self.nodes[id].children = Some(children);
        Ok(())
    }

    /// Marks a node; impossibility spreads to every descendant.
    fn mark(&mut self, id: usize, possibility: Possibility) {
        self.nodes[id].possibility = possibility;
        if possibility != Possibility::Impossible {
            return;
        }
        let mut stack: Vec<usize> = self.nodes[id].children.clone().unwrap_or_default();
        while let Some(child) = stack.pop() {
            self.nodes[child].possibility = Possibility::Impossible;
            if let Some(grandchildren) = &self.nodes[child].children {
                stack.extend(grandchildren.iter().copied());
            }
        }
    }

    fn conflicts_with_known(&self, state: &State) -> bool {
        self.known.iter().any(|(&index, &value)| state.contains(index) != value)
    }

    /// Decides whether the node `id` agrees with the observation `seen`.
    fn mark_successor(&mut self, id: usize, seen: &[Term]) {
        let state = &self.nodes[id].state;
        let predicted = self.machine.percepts(state, &self.role);
        let possibility = if predicted.as_slice() != seen || self.conflicts_with_known(state) {
            Possibility::Impossible
        } else {
            Possibility::Possible
        };
        self.mark(id, possibility);
    }

    fn extend(&mut self, id: usize, depth: usize) -> Result<bool, MachineError> {
        let node_depth = self.nodes[id].depth;
        if node_depth == depth {
            return Ok(self.nodes[id].possibility == Possibility::Possible);
        }
        self.build_successors(id)?;
        let children = self.nodes[id].children.clone().unwrap_or_default();
        let seen = self.sees[node_depth].clone();
        let mut found = false;
        for child in children {
            if self.nodes[child].possibility == Possibility::Unknown {
                self.mark_successor(child, &seen);
            }
            if self.nodes[child].possibility == Possibility::Possible {
                found |= self.extend(child, depth)?;
            }
        }
        Ok(found)
    }

    /// Builds and marks the tree down to `depth`; returns whether any
    /// hypothesis at that depth survives.
    ///
    /// Depth `d` needs `d` recorded observations; deeper requests are
    /// clamped to what has been observed.
    pub fn extend_to_depth(&mut self, depth: usize) -> Result<bool, MachineError> {
        let depth = if depth > self.sees.len() {
            warn!(
                "extend_to_depth: only {} observations recorded, clamping depth {}",
                self.sees.len(),
                depth
            );
            self.sees.len()
        } else {
            depth
        };
        let found = self.extend(0, depth)?;
        debug!("extend_to_depth({}): {} nodes, found={}", depth, self.nodes.len(), found);
        Ok(found)
    }

    /// Possible nodes at `depth` with the product of edge probabilities
    /// along their path.
    pub fn possible_nodes_at_depth(&self, depth: usize) -> Vec<(usize, f64)> {
        let mut result = Vec::new();
        let mut stack = vec![(0usize, 1.0f64)];
        while let Some((id, probability)) = stack.pop() {
            let node = &self.nodes[id];
            if node.possibility != Possibility::Possible {
                continue;
            }
            if node.depth == depth {
                result.push((id, probability));
                continue;
            }
            if let Some(children) = &node.children {
                for &child in children.iter().rev() {
                    stack.push((child, probability * self.nodes[child].probability));
                }
            }
        }
        result
    }
}
