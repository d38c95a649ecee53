//! Rule-level analysis: substitutions, disjunction expansion, safety and
//! stratification.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::ast::{rel, Atom, Literal, Rule, Symbol, Term};
use crate::error::CompileError;

/// Variable bindings.
pub type Subst = HashMap<Symbol, Term>;

pub fn apply(term: &Term, subst: &Subst) -> Term {
    match term {
        Term::Const(_) => term.clone(),
        Term::Var(name) => subst.get(name).cloned().unwrap_or_else(|| term.clone()),
        Term::Func(name, args) => Term::Func(name.clone(), args.iter().map(|a| apply(a, subst)).collect()),
    }
}

pub fn apply_atom(atom: &Atom, subst: &Subst) -> Atom {
    Atom {
        relation: atom.relation.clone(),
        args: atom.args.iter().map(|a| apply(a, subst)).collect(),
    }
}

/// One-way matching of `pattern` against a ground term, extending `subst`.
///
/// On failure `subst` may hold partial bindings; callers match on a copy.
pub fn match_term(pattern: &Term, ground: &Term, subst: &mut Subst) -> bool {
    match (pattern, ground) {
        (Term::Var(name), _) => match subst.get(name) {
            Some(bound) => bound == ground,
            None => {
                subst.insert(name.clone(), ground.clone());
                true
            }
        },
        (Term::Const(a), Term::Const(b)) => a == b,
        (Term::Func(f, xs), Term::Func(g, ys)) => {
            f == g && xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| match_term(x, y, subst))
        }
        _ => false,
    }
}

pub fn match_atom(pattern: &Atom, ground: &Atom, subst: &mut Subst) -> bool {
    pattern.relation == ground.relation
        && pattern.args.len() == ground.args.len()
        && pattern.args.iter().zip(&ground.args).all(|(p, g)| match_term(p, g, subst))
}

/// Splits every `or` literal, producing one rule per combination of disjuncts.
pub fn expand_disjunctions(rule: &Rule) -> Vec<Rule> {
    let mut bodies: Vec<Vec<Literal>> = vec![Vec::new()];
    for literal in &rule.body {
        let options = flatten_or(literal);
        let mut next = Vec::with_capacity(bodies.len() * options.len());
        for body in &bodies {
            for option in &options {
                let mut extended = body.clone();
                extended.push(option.clone());
                next.push(extended);
            }
        }
        bodies = next;
    }
    bodies.into_iter().map(|body| Rule::new(rule.head.clone(), body)).collect()
}

fn flatten_or(literal: &Literal) -> Vec<Literal> {
    match literal {
        Literal::Or(disjuncts) => disjuncts.iter().flat_map(flatten_or).collect(),
        other => vec![other.clone()],
    }
}

/// Checks that every variable of the head, of a negated literal or of a
/// `distinct` occurs in some positive literal. Expects an `or`-free rule.
pub fn check_safety(rule: &Rule) -> Result<(), CompileError> {
    let mut bound = BTreeSet::new();
    for literal in &rule.body {
        if let Literal::Pos(atom) = literal {
            atom.collect_vars(&mut bound);
        }
    }

    let mut needed = BTreeSet::new();
    rule.head.collect_vars(&mut needed);
    for literal in &rule.body {
        match literal {
            Literal::Neg(atom) => atom.collect_vars(&mut needed),
            Literal::Distinct(a, b) => {
                a.collect_vars(&mut needed);
                b.collect_vars(&mut needed);
            }
            Literal::Pos(_) | Literal::Or(_) => {}
        }
    }

    match needed.difference(&bound).next() {
        Some(var) => Err(CompileError::UnsafeRule {
            var: var.to_string(),
            rule: rule.to_string(),
        }),
        None => Ok(()),
    }
}

/// Relation strata: a head's stratum is at least that of every positive body
/// relation and strictly greater than that of every negated one.
#[derive(Debug, Clone, Default)]
pub struct Strata {
    stratum: HashMap<Symbol, usize>,
    count: usize,
}

impl Strata {
    pub fn of(&self, relation: &str) -> usize {
        self.stratum.get(relation).copied().unwrap_or(0)
    }

    /// Number of strata.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Computes strata of `or`-free rules, or fails on negation through recursion.
pub fn stratify(rules: &[Rule]) -> Result<Strata, CompileError> {
    let mut relations: HashSet<Symbol> = HashSet::new();
    for rule in rules {
        relations.insert(rule.head.relation.clone());
        for literal in &rule.body {
            if let Literal::Pos(a) | Literal::Neg(a) = literal {
                relations.insert(a.relation.clone());
            }
        }
    }
    let limit = relations.len();

    let mut stratum: HashMap<Symbol, usize> = relations.into_iter().map(|r| (r, 0)).collect();
    loop {
        let mut changed = false;
        for rule in rules {
            let head = &rule.head.relation;
            let mut level = stratum[head];
            for literal in &rule.body {
                let required = match literal {
                    Literal::Pos(a) => stratum[&a.relation],
                    Literal::Neg(a) => stratum[&a.relation] + 1,
                    Literal::Distinct(..) | Literal::Or(_) => continue,
                };
                level = level.max(required);
            }
            if level > limit {
                return Err(CompileError::Unstratified {
                    relation: head.to_string(),
                });
            }
            if level > stratum[head] {
                stratum.insert(head.clone(), level);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let count = stratum.values().copied().max().map_or(0, |m| m + 1);
    debug!("stratify: {} relations in {} strata", stratum.len(), count);
    Ok(Strata { stratum, count })
}

/// Relations whose truth depends, directly or transitively, on `true` or `does`.
pub fn dynamic_relations(rules: &[Rule]) -> HashSet<Symbol> {
    let mut dynamic: HashSet<Symbol> = [rel::TRUE, rel::DOES].into_iter().map(Symbol::from).collect();
    loop {
        let mut changed = false;
        for rule in rules {
            if dynamic.contains(&rule.head.relation) {
                continue;
            }
            let depends = rule.body.iter().any(|literal| match literal {
                Literal::Pos(a) | Literal::Neg(a) => dynamic.contains(&a.relation),
                Literal::Distinct(..) | Literal::Or(_) => false,
            });
            if depends {
                dynamic.insert(rule.head.relation.clone());
                changed = true;
            }
        }
        if !changed {
            return dynamic;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn atom(rel: &str, args: &[Term]) -> Atom {
        Atom::new(rel, args.iter().cloned())
    }

    #[test]
    fn test_match_binds_and_checks() {
        let pattern = atom("cell", &[Term::var("x"), Term::var("x")]);
        let mut subst = Subst::new();
        assert!(match_atom(&pattern, &atom("cell", &[Term::number(1), Term::number(1)]), &mut subst));
        assert_eq!(subst.get("x"), Some(&Term::number(1)));

        let mut subst = Subst::new();
        assert!(!match_atom(&pattern, &atom("cell", &[Term::number(1), Term::number(2)]), &mut subst));
    }

    #[test]
    fn test_match_nested() {
        let pattern = Term::func("mark", [Term::var("x"), Term::constant("o")]);
        let ground = Term::func("mark", [Term::number(3), Term::constant("o")]);
        let mut subst = Subst::new();
        assert!(match_term(&pattern, &ground, &mut subst));
        assert_eq!(apply(&pattern, &subst), ground);
    }

    #[test]
    fn test_expand_disjunctions() {
        let rule = Rule::new(
            Atom::prop("terminal"),
            [
                Literal::or([Literal::pos(Atom::prop("a")), Literal::pos(Atom::prop("b"))]),
                Literal::or([Literal::pos(Atom::prop("c")), Literal::pos(Atom::prop("d"))]),
            ],
        );
        let expanded = expand_disjunctions(&rule);
        assert_eq!(expanded.len(), 4);
        assert_eq!(expanded[0].to_string(), "(<= terminal a c)");
        assert_eq!(expanded[3].to_string(), "(<= terminal b d)");
    }

    #[test]
    fn test_unsafe_negation() {
        let rule = Rule::new(
            atom("p", &[Term::var("x")]),
            [
                Literal::pos(atom("q", &[Term::var("x")])),
                Literal::neg(atom("r", &[Term::var("y")])),
            ],
        );
        assert!(matches!(check_safety(&rule), Err(CompileError::UnsafeRule { var, .. }) if var == "y"));
    }

    #[test]
    fn test_stratify_negation() {
        let rules = vec![
            Rule::new(Atom::prop("p"), [Literal::neg(Atom::prop("q"))]),
            Rule::new(Atom::prop("q"), [Literal::pos(Atom::prop("r"))]),
        ];
        let strata = stratify(&rules).unwrap();
        assert!(strata.of("p") > strata.of("q"));
        assert_eq!(strata.count(), 2);
    }

    #[test]
    fn test_stratify_rejects_negative_cycle() {
        let rules = vec![
            Rule::new(Atom::prop("p"), [Literal::neg(Atom::prop("q"))]),
            Rule::new(Atom::prop("q"), [Literal::pos(Atom::prop("p"))]),
        ];
        assert!(matches!(stratify(&rules), Err(CompileError::Unstratified { .. })));
    }

    #[test]
    fn test_dynamic_relations() {
        let rules = vec![
            Rule::new(Atom::prop("open"), [Literal::pos(atom("true", &[Term::constant("door")]))]),
            Rule::new(Atom::prop("win"), [Literal::neg(Atom::prop("open"))]),
            Rule::fact(atom("succ", &[Term::number(1), Term::number(2)])),
        ];
        let dynamic = dynamic_relations(&rules);
        assert!(dynamic.contains("open"));
        assert!(dynamic.contains("win"));
        assert!(!dynamic.contains("succ"));
    }
}
