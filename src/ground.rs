//! Validation and grounding of game descriptions.
//!
//! Grounding instantiates every rule over an over-approximated domain of
//! atoms, evaluates the relations that do not depend on `true`/`does` once,
//! and folds them away. What is left is a [`GroundProgram`] of propositional
//! rules over dynamic atoms, consumed both by the circuit compiler and by the
//! reference prover.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use log::{debug, info};

use crate::ast::{rel, Atom, Description, Literal, Rule, Symbol, Term};
use crate::error::CompileError;
use crate::logic::{self, apply_atom, Subst};

/// Index of an atom in a [`GroundProgram`].
pub type AtomId = usize;

/// `head :- pos_1, ..., not neg_1, ...` over atom ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroundRule {
    pub head: AtomId,
    pub pos: Vec<AtomId>,
    pub neg: Vec<AtomId>,
}

#[derive(Debug, Clone)]
pub struct GroundProgram {
    atoms: Vec<Atom>,
    index: HashMap<Atom, AtomId>,
    /// Truth of static atoms, `None` for dynamic ones.
    fixed: Vec<Option<bool>>,
    /// Rules with dynamic heads, sorted by stratum.
    rules: Vec<GroundRule>,
    strata: Vec<Range<usize>>,
    roles: Vec<Term>,
    bases: Vec<Term>,
    moves: Vec<Vec<Term>>,
}

impl GroundProgram {
    pub fn roles(&self) -> &[Term] {
        &self.roles
    }

    /// Sentences that can hold in a state, sorted by their text.
    pub fn bases(&self) -> &[Term] {
        &self.bases
    }

    /// Moves that can ever be legal for the role, sorted by their text.
    pub fn moves(&self, role: usize) -> &[Term] {
        &self.moves[role]
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, id: AtomId) -> &Atom {
        &self.atoms[id]
    }

    pub fn lookup(&self, atom: &Atom) -> Option<AtomId> {
        self.index.get(atom).copied()
    }

    /// Compile-time truth of a static atom, `None` if the atom is dynamic.
    pub fn fixed(&self, id: AtomId) -> Option<bool> {
        self.fixed[id]
    }

    pub fn rules(&self) -> &[GroundRule] {
        &self.rules
    }

    /// Rule ranges, one per stratum, in evaluation order.
    pub fn strata(&self) -> &[Range<usize>] {
        &self.strata
    }

    /// Atoms of the given relation, in interning order.
    pub fn atoms_of<'a>(&'a self, relation: &'a str) -> impl Iterator<Item = AtomId> + 'a {
        self.atoms.iter().enumerate().filter(move |(_, a)| a.is(relation)).map(|(id, _)| id)
    }

    /// Goal atoms of a role with their values.
    pub fn goals(&self, role: usize) -> Vec<(AtomId, u8)> {
        let name = &self.roles[role];
        let mut goals: Vec<(AtomId, u8)> = self
            .atoms_of(rel::GOAL)
            .filter(|&id| self.fixed[id] != Some(false))
            .filter_map(|id| {
                let atom = &self.atoms[id];
                let value = atom.args[1].as_number()?;
                (&atom.args[0] == name).then_some((id, value as u8))
            })
            .collect();
        goals.sort_by_key(|&(_, value)| value);
        goals
    }

    /// Percept atoms of a role with the percept term.
    pub fn sees(&self, role: usize) -> Vec<(AtomId, Term)> {
        let name = &self.roles[role];
        let mut sees: Vec<(AtomId, Term)> = self
            .atoms_of(rel::SEES)
            .filter(|&id| self.fixed[id] != Some(false))
            .filter(|&id| self.atoms[id].arity() == 2 && &self.atoms[id].args[0] == name)
            .map(|id| (id, self.atoms[id].args[1].clone()))
            .collect();
        sees.sort_by_cached_key(|(_, t)| t.to_string());
        sees
    }

    fn intern(&mut self, atom: Atom) -> AtomId {
        if let Some(&id) = self.index.get(&atom) {
            return id;
        }
        let id = self.atoms.len();
        self.index.insert(atom.clone(), id);
        self.atoms.push(atom);
        id
    }
}

/// Atoms that may hold in some reachable situation, indexed by relation
/// and by relation plus first argument.
#[derive(Default)]
struct Domain {
    atoms: HashSet<Atom>,
    by_relation: HashMap<Symbol, Vec<Atom>>,
    by_first: HashMap<(Symbol, Term), Vec<Atom>>,
}

impl Domain {
    fn insert(&mut self, atom: Atom) -> bool {
        if !self.atoms.insert(atom.clone()) {
            return false;
        }
        if let Some(first) = atom.args.first() {
            self.by_first
                .entry((atom.relation.clone(), first.clone()))
                .or_default()
                .push(atom.clone());
        }
        self.by_relation.entry(atom.relation.clone()).or_default().push(atom);
        true
    }

    /// Inserts `atom` together with the `true`/`does` atom it implies;
    /// every atom that is new is also pushed to `fresh`.
    fn insert_with_implied(&mut self, atom: Atom, fresh: &mut Vec<Atom>) {
        let implied = if (atom.is(rel::INIT) || atom.is(rel::NEXT)) && atom.arity() == 1 {
            Some(Atom::new(rel::TRUE, atom.args.iter().cloned()))
        } else if atom.is(rel::LEGAL) && atom.arity() == 2 {
            Some(Atom::new(rel::DOES, atom.args.iter().cloned()))
        } else {
            None
        };
        for atom in std::iter::once(atom).chain(implied) {
            if self.insert(atom.clone()) {
                fresh.push(atom);
            }
        }
    }

    fn has_relation(&self, relation: &Symbol) -> bool {
        self.by_relation.contains_key(relation)
    }

    /// Atoms that can match `pattern` under `subst`.
    fn candidates(&self, pattern: &Atom, subst: &Subst) -> &[Atom] {
        let first = pattern.args.first().map(|t| logic::apply(t, subst));
        let atoms = match first {
            Some(first) if first.is_ground() => self.by_first.get(&(pattern.relation.clone(), first)),
            _ => self.by_relation.get(&pattern.relation),
        };
        atoms.map(Vec::as_slice).unwrap_or_default()
    }
}

/// Nested-loop join of `patterns`, each matched against its own domain.
fn join(patterns: &[(&Atom, &Domain)], subst: &Subst, f: &mut dyn FnMut(&Subst)) {
    let Some(((first, domain), rest)) = patterns.split_first() else {
        f(subst);
        return;
    };
    for candidate in domain.candidates(first, subst) {
        let mut extended = subst.clone();
        if logic::match_atom(first, candidate, &mut extended) {
            join(rest, &extended, f);
        }
    }
}

/// Calls `f` with every substitution satisfying the rule's positive
/// literals and `distinct` constraints over `domain`.
///
/// With `delta`, only substitutions that match at least one positive
/// literal against an atom of `delta` are produced; substitutions may then
/// repeat.
fn solve(rule: &Rule, domain: &Domain, delta: Option<&Domain>, f: &mut dyn FnMut(&Subst)) {
    let positives: Vec<&Atom> = rule
        .body
        .iter()
        .filter_map(|l| match l {
            Literal::Pos(a) => Some(a),
            _ => None,
        })
        .collect();
    let mut emit = |subst: &Subst| {
        let distinct = rule.body.iter().all(|l| match l {
            Literal::Distinct(a, b) => logic::apply(a, subst) != logic::apply(b, subst),
            _ => true,
        });
        if distinct {
            f(subst);
        }
    };
    let Some(delta) = delta else {
        let patterns: Vec<(&Atom, &Domain)> = positives.iter().map(|&a| (a, domain)).collect();
        join(&patterns, &Subst::new(), &mut emit);
        return;
    };
    for (i, pattern) in positives.iter().enumerate() {
        if !delta.has_relation(&pattern.relation) {
            continue;
        }
        let patterns: Vec<(&Atom, &Domain)> = positives
            .iter()
            .enumerate()
            .map(|(j, &a)| (a, if j == i { delta } else { domain }))
            .collect();
        join(&patterns, &Subst::new(), &mut emit);
    }
}

/// Validates and grounds a game description.
pub fn ground(description: &Description) -> Result<GroundProgram, CompileError> {
    let rules = prepare(description)?;
    let roles = collect_roles(&rules)?;
    if !rules.iter().any(|r| r.head.is(rel::TERMINAL)) {
        return Err(CompileError::NoTerminal);
    }

    let strata = logic::stratify(&rules)?;
    let dynamic = logic::dynamic_relations(&rules);
    if let Some(rule) = rules.iter().find(|r| r.head.is(rel::INIT) && dynamic.contains(&r.head.relation)) {
        return Err(CompileError::DynamicInit { rule: rule.to_string() });
    }

    // Positive fixpoint: an over-approximation of every atom that can hold.
    // After the first round, only rules with a body atom found in the
    // previous round are joined again.
    let mut domain = Domain::default();
    let mut delta: Option<Domain> = None;
    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut fresh = Vec::new();
        for rule in &rules {
            let mut heads = Vec::new();
            solve(rule, &domain, delta.as_ref(), &mut |subst| heads.push(apply_atom(&rule.head, subst)));
            for head in heads {
                domain.insert_with_implied(head, &mut fresh);
            }
        }
        if fresh.is_empty() {
            break;
        }
        let mut next = Domain::default();
        for atom in fresh {
            next.insert(atom);
        }
        delta = Some(next);
    }
    debug!("ground: domain of {} atoms after {} rounds", domain.atoms.len(), rounds);

    let mut program = GroundProgram {
        atoms: Vec::new(),
        index: HashMap::new(),
        fixed: Vec::new(),
        rules: Vec::new(),
        strata: Vec::new(),
        roles,
        bases: Vec::new(),
        moves: Vec::new(),
    };

    // Instantiate every rule over the domain.
    let mut instances: Vec<(GroundRule, usize)> = Vec::new();
    let mut seen: HashSet<GroundRule> = HashSet::new();
    for rule in &rules {
        let mut substs = Vec::new();
        solve(rule, &domain, None, &mut |subst| substs.push(subst.clone()));
        for subst in substs {
            let head = program.intern(apply_atom(&rule.head, &subst));
            let mut pos = Vec::new();
            let mut neg = Vec::new();
            for literal in &rule.body {
                match literal {
                    Literal::Pos(a) => pos.push(program.intern(apply_atom(a, &subst))),
                    Literal::Neg(a) => {
                        let atom = apply_atom(a, &subst);
                        // An atom outside the domain never holds.
                        if domain.atoms.contains(&atom) {
                            neg.push(program.intern(atom));
                        }
                    }
                    Literal::Distinct(..) | Literal::Or(_) => {}
                }
            }
            let ground_rule = GroundRule { head, pos, neg };
            if seen.insert(ground_rule.clone()) {
                instances.push((ground_rule, strata.of(&rule.head.relation)));
            }
        }
    }

    // State and move atoms are referenced by the compiler even when no rule mentions them.
    for atom in domain.atoms.iter().filter(|a| a.is(rel::TRUE) || a.is(rel::DOES)) {
        program.intern(atom.clone());
    }

    // Exact values of static atoms.
    let is_dynamic = |program: &GroundProgram, id: AtomId| dynamic.contains(&program.atoms[id].relation);
    let mut value = vec![false; program.atoms.len()];
    for stratum in 0..strata.count() {
        loop {
            let mut changed = false;
            for (r, s) in &instances {
                if *s != stratum || value[r.head] || is_dynamic(&program, r.head) {
                    continue;
                }
                if r.pos.iter().all(|&p| value[p]) && r.neg.iter().all(|&n| !value[n]) {
                    value[r.head] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
    let fixed: Vec<Option<bool>> = (0..program.atoms.len())
        .map(|id| if is_dynamic(&program, id) { None } else { Some(value[id]) })
        .collect();
    program.fixed = fixed;

    // Fold static literals out of dynamic rules.
    let mut folded: Vec<(GroundRule, usize)> = Vec::new();
    for (rule, stratum) in instances {
        if program.fixed[rule.head].is_some() {
            continue;
        }
        let fixed = &program.fixed;
        if rule.pos.iter().any(|&p| fixed[p] == Some(false)) || rule.neg.iter().any(|&n| fixed[n] == Some(true)) {
            continue;
        }
        let pos = rule.pos.into_iter().filter(|&p| fixed[p].is_none()).collect();
        let neg = rule.neg.into_iter().filter(|&n| fixed[n].is_none()).collect();
        folded.push((GroundRule { head: rule.head, pos, neg }, stratum));
    }
    folded.sort_by_key(|&(_, stratum)| stratum);
    let mut start = 0;
    for stratum in 0..strata.count() {
        let end = start + folded[start..].iter().take_while(|(_, s)| *s == stratum).count();
        program.strata.push(start..end);
        start = end;
    }
    program.rules = folded.into_iter().map(|(rule, _)| rule).collect();

    // Goal values.
    for id in program.atoms_of(rel::GOAL).collect::<Vec<_>>() {
        let atom = &program.atoms[id];
        let valid = atom.arity() == 2 && matches!(atom.args[1].as_number(), Some(0..=100));
        if !valid {
            let value = atom.args.get(1).map_or_else(|| atom.to_string(), |t| t.to_string());
            return Err(CompileError::InvalidGoal { value });
        }
    }

    // State universe and move lists.
    let mut bases: Vec<Term> = domain
        .by_relation
        .get(rel::TRUE)
        .into_iter()
        .flatten()
        .filter(|a| a.arity() == 1)
        .map(|a| a.args[0].clone())
        .collect();
    bases.sort_by_cached_key(|t| t.to_string());
    program.bases = bases;

    let mut moves: Vec<Vec<Term>> = vec![Vec::new(); program.roles.len()];
    for id in program.atoms_of(rel::LEGAL).collect::<Vec<_>>() {
        if program.fixed[id] == Some(false) {
            continue;
        }
        let atom = &program.atoms[id];
        if atom.arity() != 2 {
            continue;
        }
        if let Some(r) = program.roles.iter().position(|role| role == &atom.args[0]) {
            moves[r].push(atom.args[1].clone());
        }
    }
    for list in &mut moves {
        list.sort_by_cached_key(|t| t.to_string());
        list.dedup();
    }
    program.moves = moves;

    info!(
        "ground: {} atoms, {} dynamic rules in {} strata, {} bases, {} roles",
        program.atoms.len(),
        program.rules.len(),
        program.strata.len(),
        program.bases.len(),
        program.roles.len()
    );
    Ok(program)
}

/// Rejects reserved heads, expands disjunctions, checks safety.
fn prepare(description: &Description) -> Result<Vec<Rule>, CompileError> {
    let mut rules = Vec::with_capacity(description.len());
    for rule in description.rules() {
        let head = &rule.head;
        if head.is(rel::TRUE) || head.is(rel::DOES) || head.is(rel::DISTINCT) {
            return Err(CompileError::ReservedHead {
                relation: head.relation.to_string(),
                rule: rule.to_string(),
            });
        }
        for expanded in logic::expand_disjunctions(rule) {
            logic::check_safety(&expanded)?;
            rules.push(expanded);
        }
    }
    Ok(rules)
}

fn collect_roles(rules: &[Rule]) -> Result<Vec<Term>, CompileError> {
    let mut roles: Vec<Term> = Vec::new();
    for rule in rules.iter().filter(|r| r.head.is(rel::ROLE) && r.is_fact() && r.head.arity() == 1) {
        let role = rule.head.args[0].clone();
        if roles.contains(&role) {
            return Err(CompileError::DuplicateRole { role: role.to_string() });
        }
        roles.push(role);
    }
    if roles.is_empty() {
        return Err(CompileError::NoRoles);
    }
    Ok(roles)
}
