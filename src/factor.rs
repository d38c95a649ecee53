//! Independent subgame detection.
//!
//! A game factors when its terminal condition splits into parts driven by
//! disjoint sets of moves. The analysis runs once over the compiled propnet:
//!
//! 1. walk down from the terminal proposition through views, `OR` gates and
//!    transitions; every `AND`/`NOT` reached is a *subterminal*;
//! 2. collect the input propositions each subterminal depends on;
//! 3. drop subterminals with no inputs, merge those that share an input;
//! 4. every surviving group becomes a [`Subgame`] listing, per role, the
//!    moves of its inputs plus the null move.

use std::fmt;

use log::{debug, info};
use num_bigint::BigUint;

use crate::bitset::BitSet;
use crate::node::{Component, NodeId};
use crate::propnet::Propnet;
use crate::state::Move;

/// Moves relevant to one independent part of the game.
///
/// # Invariants
///
/// - every role's list ends with the null move (`None`)
/// - non-null moves are sorted by their text
#[derive(Clone, PartialEq, Eq)]
pub struct Subgame {
    inputs: BitSet,
    moves: Vec<Vec<Option<Move>>>,
}

impl Subgame {
    /// Input propositions (by node index) this subgame depends on.
    pub fn inputs(&self) -> &BitSet {
        &self.inputs
    }

    /// Relevant moves of `role`, null move last.
    pub fn moves(&self, role: usize) -> &[Option<Move>] {
        &self.moves[role]
    }

    pub fn role_moves(&self) -> &[Vec<Option<Move>>] {
        &self.moves
    }

    pub fn contains(&self, role: usize, mv: &Move) -> bool {
        self.moves[role].iter().flatten().any(|m| m == mv)
    }

    /// Size of the joint-move space: the product of per-role move counts.
    pub fn joint_move_count(&self) -> BigUint {
        self.moves
            .iter()
            .fold(BigUint::from(1u32), |acc, m| acc * BigUint::from(m.len()))
    }

    /// Maps a full joint move onto this subgame: moves outside it become null.
    pub fn project(&self, joint: &[Move]) -> Vec<Option<Move>> {
        joint
            .iter()
            .enumerate()
            .map(|(role, mv)| self.contains(role, mv).then(|| mv.clone()))
            .collect()
    }
}

impl fmt::Debug for Subgame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subgame")
            .field("inputs", &self.inputs.len())
            .field("moves", &self.moves.iter().map(Vec::len).collect::<Vec<_>>())
            .finish()
    }
}

/// Result of the factoring analysis.
#[derive(Debug, Clone, Default)]
pub struct Factoring {
    subgames: Vec<Subgame>,
}

impl Factoring {
    pub fn subgames(&self) -> &[Subgame] {
        &self.subgames
    }

    pub fn len(&self) -> usize {
        self.subgames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subgames.is_empty()
    }

    /// Fewer than two subgames: factored search has nothing to gain.
    pub fn is_degenerate(&self) -> bool {
        self.subgames.len() < 2
    }
}

/// `AND`/`NOT` components the terminal condition decomposes into.
fn subterminals(net: &Propnet) -> Vec<NodeId> {
    let terminal = net.terminal();
    let start = match net.node(terminal) {
        Component::Proposition { input: Some(input), .. } => *input,
        _ => terminal,
    };
    let mut found = Vec::new();
    let mut visited = BitSet::new(net.len());
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        if !visited.insert(id.index()) {
            continue;
        }
        match net.node(id) {
            Component::And(_) | Component::Not(_) => found.push(id),
            component => stack.extend(component.inputs().iter().copied()),
        }
    }
    if found.is_empty() {
        found.push(terminal);
    }
    found.sort();
    found
}

/// Input propositions reachable backwards from `start`, init excluded.
fn relevant_inputs(net: &Propnet, start: NodeId) -> BitSet {
    let mut inputs = BitSet::new(net.len());
    let mut visited = BitSet::new(net.len());
    visited.insert(start.index());
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        for &input in net.node(id).inputs() {
            if !visited.insert(input.index()) {
                continue;
            }
            stack.push(input);
            if net.input_owner(input).is_some() {
                inputs.insert(input.index());
            }
        }
    }
    inputs
}

/// Merges groups sharing an input until all are pairwise disjoint.
fn merge_overlapping(mut groups: Vec<BitSet>) -> Vec<BitSet> {
    let mut merged = true;
    while merged {
        merged = false;
        'outer: for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                if groups[i].intersects(&groups[j]) {
                    let other = groups.swap_remove(j);
                    groups[i].union_with(&other);
                    merged = true;
                    break 'outer;
                }
            }
        }
    }
    groups
}

/// Splits the game into subgames with pairwise-disjoint move sets.
pub fn find_independent_subgames(net: &Propnet) -> Factoring {
    let candidates = subterminals(net);
    debug!("find_independent_subgames: {} subterminal candidates", candidates.len());

    let groups: Vec<BitSet> = candidates
        .iter()
        .map(|&start| relevant_inputs(net, start))
        .filter(|inputs| !inputs.is_empty())
        .collect();
    let mut groups = merge_overlapping(groups);
    groups.sort_by_key(|g| g.iter().next());

    let roles = net.roles().len();
    let subgames: Vec<Subgame> = groups
        .into_iter()
        .map(|inputs| {
            let mut moves: Vec<Vec<Option<Move>>> = vec![Vec::new(); roles];
            for (role, list) in moves.iter_mut().enumerate() {
                let nodes = net.role_nodes(role);
                let mut relevant: Vec<&Move> = nodes
                    .inputs
                    .iter()
                    .zip(&nodes.moves)
                    .filter(|(input, _)| inputs.contains(input.index()))
                    .map(|(_, mv)| mv)
                    .collect();
                relevant.sort_by_cached_key(|mv| mv.to_string());
                list.extend(relevant.into_iter().cloned().map(Some));
                list.push(None);
            }
            Subgame { inputs, moves }
        })
        .collect();

    for (i, subgame) in subgames.iter().enumerate() {
        debug!(
            "subgame {}: {} inputs, {} joint moves",
            i,
            subgame.inputs.len(),
            subgame.joint_move_count()
        );
    }
    info!("find_independent_subgames: {} subgames", subgames.len());
    Factoring { subgames }
}
