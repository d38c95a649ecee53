//! Topological scheduling of derived nodes.
//!
//! State nodes (bases, inputs, init) and constants have their values set
//! before propagation. Every other node is derived: the schedule lists them
//! layer by layer, each layer containing the nodes whose derived inputs all
//! lie in earlier layers.

use log::debug;

use crate::bitset::BitSet;
use crate::error::CompileError;
use crate::node::{Component, NodeId};

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub order: Vec<NodeId>,
    pub layers: usize,
}

fn is_derived(nodes: &[Component], state_nodes: &BitSet, index: usize) -> bool {
    !state_nodes.contains(index) && !matches!(nodes[index], Component::Constant(_))
}

/// Orders the derived nodes of `nodes`, failing if they form a cycle.
pub fn compute_order(nodes: &[Component], state_nodes: &BitSet) -> Result<Schedule, CompileError> {
    let n = nodes.len();
    let mut unresolved = vec![0usize; n];
    let mut outputs: Vec<Vec<u32>> = vec![Vec::new(); n];
    let mut total = 0;

    for (i, node) in nodes.iter().enumerate() {
        if !is_derived(nodes, state_nodes, i) {
            continue;
        }
        total += 1;
        for input in node.inputs() {
            if is_derived(nodes, state_nodes, input.index()) {
                unresolved[i] += 1;
                outputs[input.index()].push(i as u32);
            }
        }
    }

    let mut order = Vec::with_capacity(total);
    let mut layers = 0;
    let mut layer: Vec<usize> = (0..n)
        .filter(|&i| is_derived(nodes, state_nodes, i) && unresolved[i] == 0)
        .collect();
    while !layer.is_empty() {
        layers += 1;
        let mut next = Vec::new();
        for &i in &layer {
            order.push(NodeId::new(i));
            for &o in &outputs[i] {
                let o = o as usize;
                unresolved[o] -= 1;
                if unresolved[o] == 0 {
                    next.push(o);
                }
            }
        }
        layer = next;
    }

    if order.len() < total {
        return Err(CompileError::Cycle {
            remaining: total - order.len(),
        });
    }
    debug!("compute_order: {} derived nodes in {} layers", order.len(), layers);
    Ok(Schedule { order, layers })
}

/// Checks that every derived input of each scheduled node is scheduled earlier.
pub fn is_valid_order(nodes: &[Component], state_nodes: &BitSet, order: &[NodeId]) -> bool {
    let mut position = vec![usize::MAX; nodes.len()];
    for (p, id) in order.iter().enumerate() {
        position[id.index()] = p;
    }
    let all_scheduled = (0..nodes.len())
        .filter(|&i| is_derived(nodes, state_nodes, i))
        .all(|i| position[i] != usize::MAX);
    all_scheduled
        && order.iter().enumerate().all(|(p, id)| {
            nodes[id.index()]
                .inputs()
                .iter()
                .filter(|input| is_derived(nodes, state_nodes, input.index()))
                .all(|input| position[input.index()] < p)
        })
}
