//! Abstract syntax of game descriptions.
//!
//! A game is a [`Description`]: an ordered list of [`Rule`]s over [`Atom`]s and
//! [`Term`]s. Text parsing is not part of this crate; descriptions are built
//! with the constructors below and print back as KIF:
//!
//! ```
//! use ggp_rs::ast::{Atom, Literal, Rule, Term};
//!
//! let rule = Rule::new(
//!     Atom::new("legal", [Term::var("r"), Term::constant("noop")]),
//!     [Literal::pos(Atom::new("role", [Term::var("r")]))],
//! );
//! assert_eq!(rule.to_string(), "(<= (legal ?r noop) (role ?r))");
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Interned-by-sharing name of a constant, function, variable or relation.
pub type Symbol = Arc<str>;

/// Names of the relations with a fixed meaning.
pub mod rel {
    pub const ROLE: &str = "role";
    pub const INIT: &str = "init";
    pub const TRUE: &str = "true";
    pub const NEXT: &str = "next";
    pub const LEGAL: &str = "legal";
    pub const DOES: &str = "does";
    pub const GOAL: &str = "goal";
    pub const TERMINAL: &str = "terminal";
    pub const SEES: &str = "sees";
    pub const DISTINCT: &str = "distinct";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Const(Symbol),
    Var(Symbol),
    Func(Symbol, Vec<Term>),
}

impl Term {
    pub fn constant(name: &str) -> Self {
        Term::Const(name.into())
    }

    /// Variable named `name`; a leading `?` is accepted and stripped.
    pub fn var(name: &str) -> Self {
        Term::Var(name.trim_start_matches('?').into())
    }

    pub fn number(value: i64) -> Self {
        Term::Const(value.to_string().into())
    }

    pub fn func(name: &str, args: impl IntoIterator<Item = Term>) -> Self {
        let args: Vec<Term> = args.into_iter().collect();
        if args.is_empty() {
            Term::Const(name.into())
        } else {
            Term::Func(name.into(), args)
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Const(_) => true,
            Term::Var(_) => false,
            Term::Func(_, args) => args.iter().all(Term::is_ground),
        }
    }

    /// Parses a constant as an integer (used for goal values).
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Term::Const(name) => name.parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn collect_vars(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Term::Const(_) => {}
            Term::Var(name) => {
                out.insert(name.clone());
            }
            Term::Func(_, args) => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Const(name) => write!(f, "{}", name),
            Term::Var(name) => write!(f, "?{}", name),
            Term::Func(name, args) => {
                write!(f, "({}", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A relation applied to arguments, e.g. `(cell 1 1 b)` or `terminal`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom {
    pub relation: Symbol,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(relation: &str, args: impl IntoIterator<Item = Term>) -> Self {
        Self {
            relation: relation.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Zero-arity atom such as `terminal`.
    pub fn prop(relation: &str) -> Self {
        Self::new(relation, [])
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn is(&self, relation: &str) -> bool {
        &*self.relation == relation
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::is_ground)
    }

    pub(crate) fn collect_vars(&self, out: &mut BTreeSet<Symbol>) {
        for arg in &self.args {
            arg.collect_vars(out);
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.relation);
        }
        write!(f, "({}", self.relation)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Pos(Atom),
    Neg(Atom),
    Distinct(Term, Term),
    Or(Vec<Literal>),
}

impl Literal {
    pub fn pos(atom: Atom) -> Self {
        Literal::Pos(atom)
    }

    pub fn neg(atom: Atom) -> Self {
        Literal::Neg(atom)
    }

    pub fn distinct(lhs: Term, rhs: Term) -> Self {
        Literal::Distinct(lhs, rhs)
    }

    pub fn or(disjuncts: impl IntoIterator<Item = Literal>) -> Self {
        Literal::Or(disjuncts.into_iter().collect())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Pos(atom) => write!(f, "{}", atom),
            Literal::Neg(atom) => write!(f, "(not {})", atom),
            Literal::Distinct(a, b) => write!(f, "(distinct {} {})", a, b),
            Literal::Or(disjuncts) => {
                write!(f, "(or")?;
                for d in disjuncts {
                    write!(f, " {}", d)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// `head :- body`. Facts have an empty body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<Literal>,
}

impl Rule {
    pub fn new(head: Atom, body: impl IntoIterator<Item = Literal>) -> Self {
        Self {
            head,
            body: body.into_iter().collect(),
        }
    }

    pub fn fact(head: Atom) -> Self {
        Self { head, body: Vec::new() }
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.body.is_empty() {
            return write!(f, "{}", self.head);
        }
        write!(f, "(<= {}", self.head)?;
        for literal in &self.body {
            write!(f, " {}", literal)?;
        }
        write!(f, ")")
    }
}

/// A complete game description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    rules: Vec<Rule>,
}

impl Description {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<Rule> for Description {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl Extend<Rule> for Description {
    fn extend<I: IntoIterator<Item = Rule>>(&mut self, iter: I) {
        self.rules.extend(iter);
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}
