//! Rule compiler: ground program to propositional network.
//!
//! Propositions are created on demand, starting from the designated atoms
//! (legal, goal, terminal, sees) and the `next` atom of every base, so only
//! the part of the rules that can influence play ends up in the circuit.
//!
//! Each base `X` is fed by a transition computing
//! `OR(init AND init_X, NOT init AND next_X)`, where `init_X` is known at
//! compile time and folded away.

use std::collections::HashMap;

use log::{debug, info};

use crate::ast::{rel, Atom, Description};
use crate::bitset::BitSet;
use crate::error::CompileError;
use crate::ground::{self, AtomId, GroundProgram};
use crate::node::{Component, NodeId};
use crate::propnet::{Propnet, RoleNodes};
use crate::schedule;
use crate::state::{Move, Role};

/// Grounds and compiles a game description.
pub fn compile(description: &Description) -> Result<Propnet, CompileError> {
    let program = ground::ground(description)?;
    compile_program(&program)
}

/// Compiles an already grounded program.
pub fn compile_program(program: &GroundProgram) -> Result<Propnet, CompileError> {
    let mut builder = Builder::new(program);

    // State nodes first: bases, inputs, init.
    let mut base_index = HashMap::new();
    let mut bases = Vec::with_capacity(program.bases().len());
    for (i, sentence) in program.bases().iter().enumerate() {
        let atom = Atom::new(rel::TRUE, [sentence.clone()]);
        let id = builder.add(Component::Proposition {
            sentence: atom.clone(),
            input: None,
        });
        if let Some(atom_id) = program.lookup(&atom) {
            builder.props.insert(atom_id, id);
        }
        base_index.insert(sentence.clone(), i);
        bases.push(id);
    }

    let roles: Vec<Role> = program
        .roles()
        .iter()
        .enumerate()
        .map(|(i, name)| Role::new(i, name.clone()))
        .collect();
    let mut role_nodes: Vec<RoleNodes> = vec![RoleNodes::default(); roles.len()];
    let mut input_owner = HashMap::new();
    for (r, role) in roles.iter().enumerate() {
        for (position, mv) in program.moves(r).iter().enumerate() {
            let atom = Atom::new(rel::DOES, [role.name().clone(), mv.clone()]);
            let id = builder.add(Component::Proposition {
                sentence: atom.clone(),
                input: None,
            });
            if let Some(atom_id) = program.lookup(&atom) {
                builder.props.insert(atom_id, id);
            }
            input_owner.insert(id, (r, position));
            let nodes = &mut role_nodes[r];
            nodes.inputs.push(id);
            nodes.moves.push(Move::new(mv.clone()));
            nodes.move_index.insert(Move::new(mv.clone()), position);
        }
    }

    let init = builder.add(Component::Proposition {
        sentence: Atom::prop(rel::INIT),
        input: None,
    });
    let state_len = builder.nodes.len();

    // Designated propositions.
    for (r, role) in roles.iter().enumerate() {
        for mv in program.moves(r) {
            let atom = Atom::new(rel::LEGAL, [role.name().clone(), mv.clone()]);
            let legal = builder.view(&atom);
            role_nodes[r].legals.push(legal);
        }
        for (atom_id, value) in program.goals(r) {
            let goal = builder.view(program.atom(atom_id));
            role_nodes[r].goals.push((goal, value));
        }
        for (atom_id, percept) in program.sees(r) {
            let sees = builder.view(program.atom(atom_id));
            role_nodes[r].sees.push((sees, percept));
        }
    }
    let terminal = builder.view(&Atom::prop(rel::TERMINAL));

    // Transitions.
    let not_init = builder.negate(init);
    let mut transitions = Vec::with_capacity(bases.len());
    for (i, sentence) in program.bases().iter().enumerate() {
        let next = match program.lookup(&Atom::new(rel::NEXT, [sentence.clone()])) {
            Some(atom_id) => builder.proposition(atom_id),
            None => builder.constant(false),
        };
        let initially = program
            .lookup(&Atom::new(rel::INIT, [sentence.clone()]))
            .and_then(|atom_id| program.fixed(atom_id))
            .unwrap_or(false);
        let stepped = builder.add(Component::And(vec![not_init, next].into()));
        let input = if initially {
            builder.add(Component::Or(vec![init, stepped].into()))
        } else {
            stepped
        };
        let transition = builder.add(Component::Transition(input));
        builder.set_input(bases[i], transition);
        transitions.push(transition);
    }
    builder.drain();

    let mut state_nodes = BitSet::new(builder.nodes.len());
    state_nodes.extend(0..state_len);
    let schedule = schedule::compute_order(&builder.nodes, &state_nodes)?;

    let propnet = Propnet {
        nodes: builder.nodes,
        roles,
        bases,
        base_sentences: program.bases().to_vec(),
        base_index,
        transitions,
        role_nodes,
        input_owner,
        terminal,
        init,
        state_nodes,
        order: schedule.order,
        layers: schedule.layers,
    };
    info!(
        "compile: {} nodes ({} and, {} or, {} not), {} layers",
        propnet.len(),
        propnet.count_kind("and"),
        propnet.count_kind("or"),
        propnet.count_kind("not"),
        propnet.depth()
    );
    Ok(propnet)
}

struct Builder<'a> {
    program: &'a GroundProgram,
    nodes: Vec<Component>,
    constants: [Option<NodeId>; 2],
    props: HashMap<AtomId, NodeId>,
    negations: HashMap<NodeId, NodeId>,
    rules_by_head: HashMap<AtomId, Vec<usize>>,
    pending: Vec<(AtomId, NodeId)>,
}

impl<'a> Builder<'a> {
    fn new(program: &'a GroundProgram) -> Self {
        let mut rules_by_head: HashMap<AtomId, Vec<usize>> = HashMap::new();
        for (i, rule) in program.rules().iter().enumerate() {
            rules_by_head.entry(rule.head).or_default().push(i);
        }
        Self {
            program,
            nodes: Vec::new(),
            constants: [None, None],
            props: HashMap::new(),
            negations: HashMap::new(),
            rules_by_head,
            pending: Vec::new(),
        }
    }

    fn add(&mut self, component: Component) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(component);
        id
    }

    fn constant(&mut self, value: bool) -> NodeId {
        if let Some(id) = self.constants[value as usize] {
            return id;
        }
        let id = self.add(Component::Constant(value));
        self.constants[value as usize] = Some(id);
        id
    }

    fn negate(&mut self, id: NodeId) -> NodeId {
        if let Component::Constant(value) = self.nodes[id.index()] {
            return self.constant(!value);
        }
        if let Some(&negated) = self.negations.get(&id) {
            return negated;
        }
        let negated = self.add(Component::Not(id));
        self.negations.insert(id, negated);
        negated
    }

    fn set_input(&mut self, id: NodeId, new_input: NodeId) {
        if let Component::Proposition { input, .. } = &mut self.nodes[id.index()] {
            *input = Some(new_input);
        }
    }

    /// Node computing an atom: a constant for static atoms, otherwise a
    /// proposition whose definition is built by [`Builder::drain`].
    fn proposition(&mut self, atom_id: AtomId) -> NodeId {
        let program = self.program;
        if let Some(value) = program.fixed(atom_id) {
            return self.constant(value);
        }
        if let Some(&id) = self.props.get(&atom_id) {
            return id;
        }
        let atom = program.atom(atom_id);
        // State atoms without a node can never hold.
        if atom.is(rel::TRUE) || atom.is(rel::DOES) {
            return self.constant(false);
        }
        let id = self.add(Component::Proposition {
            sentence: atom.clone(),
            input: None,
        });
        self.props.insert(atom_id, id);
        self.pending.push((atom_id, id));
        id
    }

    /// Like [`Builder::proposition`], but always yields a proposition node.
    fn view(&mut self, atom: &Atom) -> NodeId {
        let atom_id = self.program.lookup(atom);
        let node = match atom_id {
            Some(atom_id) => self.proposition(atom_id),
            None => self.constant(false),
        };
        if self.nodes[node.index()].is_proposition() {
            return node;
        }
        let id = self.add(Component::Proposition {
            sentence: atom.clone(),
            input: Some(node),
        });
        if let Some(atom_id) = atom_id {
            self.props.insert(atom_id, id);
        }
        id
    }

    /// Builds the definitions of all pending propositions.
    fn drain(&mut self) {
        let program = self.program;
        while let Some((atom_id, prop)) = self.pending.pop() {
            let rule_ids = self.rules_by_head.get(&atom_id).cloned().unwrap_or_default();
            let mut bodies = Vec::with_capacity(rule_ids.len());
            for r in rule_ids {
                let rule = &program.rules()[r];
                let mut literals = Vec::with_capacity(rule.pos.len() + rule.neg.len());
                for &p in &rule.pos {
                    literals.push(self.proposition(p));
                }
                for &n in &rule.neg {
                    let node = self.proposition(n);
                    literals.push(self.negate(node));
                }
                let body = match literals.len() {
                    0 => self.constant(true),
                    1 => literals[0],
                    _ => self.add(Component::And(literals.into())),
                };
                bodies.push(body);
            }
            let definition = match bodies.len() {
                0 => self.constant(false),
                1 => bodies[0],
                _ => self.add(Component::Or(bodies.into())),
            };
            self.set_input(prop, definition);
        }
        debug!("drain: {} nodes, {} propositions", self.nodes.len(), self.props.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games;
    use crate::propnet::PropositionKind;
    use crate::schedule::is_valid_order;
    use test_log::test;

    #[test]
    fn test_compile_counting() {
        let net = compile(&games::counting(10)).unwrap();
        assert_eq!(net.roles().len(), 1);
        assert_eq!(net.bases().len(), 11);
        assert_eq!(net.role_nodes(0).moves.len(), 1);
        assert_eq!(net.role_nodes(0).goals.len(), 2);
        assert_eq!(net.proposition_kind(net.terminal()), Some(PropositionKind::View));
        assert_eq!(net.proposition_kind(net.bases()[0]), Some(PropositionKind::Base));
        assert_eq!(net.proposition_kind(net.init()), Some(PropositionKind::Init));
        assert_eq!(net.proposition_kind(net.role_nodes(0).inputs[0]), Some(PropositionKind::Input));
    }

    #[test]
    fn test_schedule_is_topological() {
        for description in [games::counting(5), games::nim(2, 3), games::tic_tac_toe(), games::twin_counters()] {
            let net = compile(&description).unwrap();
            assert!(is_valid_order(net.nodes(), &net.state_nodes, net.order()));
        }
    }

    #[test]
    fn test_legal_input_bijection() {
        let net = compile(&games::tic_tac_toe()).unwrap();
        for r in 0..net.roles().len() {
            let nodes = net.role_nodes(r);
            assert_eq!(nodes.legals.len(), nodes.inputs.len());
            for (i, &input) in nodes.inputs.iter().enumerate() {
                assert_eq!(net.input_owner(input), Some((r, i)));
                assert_eq!(nodes.position(&nodes.moves[i]), Some(i));
            }
        }
    }
}
