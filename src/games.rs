//! Small built-in games.
//!
//! These descriptions are used throughout the tests, benchmarks and demos.
//! Each one exercises a particular corner: static folding (`counting`),
//! alternating turns (`nim`, `tic_tac_toe`), independent subgames
//! (`twin_counters`), known minimax values (`zero_sum_tree`), percepts
//! (`hidden_coin`) and broken goal definitions (`ambiguous_goal`).

use crate::ast::{Atom, Description, Literal, Rule, Term};

fn c(name: &str) -> Term {
    Term::constant(name)
}

fn v(name: &str) -> Term {
    Term::var(name)
}

fn n(value: i64) -> Term {
    Term::number(value)
}

fn f<const N: usize>(name: &str, args: [Term; N]) -> Term {
    Term::func(name, args)
}

fn a<const N: usize>(relation: &str, args: [Term; N]) -> Atom {
    Atom::new(relation, args)
}

fn t(sentence: Term) -> Literal {
    Literal::pos(a("true", [sentence]))
}

fn p(atom: Atom) -> Literal {
    Literal::pos(atom)
}

fn not(atom: Atom) -> Literal {
    Literal::neg(atom)
}

fn fact(atom: Atom) -> Rule {
    Rule::fact(atom)
}

fn rule<const N: usize>(head: Atom, body: [Literal; N]) -> Rule {
    Rule::new(head, body)
}

/// Single player increments a counter from 0; the game ends at `target`.
///
/// Goal is 100 at the target and 0 otherwise.
pub fn counting(target: i64) -> Description {
    let mut d = Description::new();
    d.push(fact(a("role", [c("robot")])));
    d.push(fact(a("init", [f("count", [n(0)])])));
    for i in 0..target {
        d.push(fact(a("succ", [n(i), n(i + 1)])));
    }
    d.push(fact(a("legal", [c("robot"), c("increment")])));
    d.push(rule(
        a("next", [f("count", [v("y")])]),
        [
            t(f("count", [v("x")])),
            p(a("does", [c("robot"), c("increment")])),
            p(a("succ", [v("x"), v("y")])),
        ],
    ));
    d.push(rule(a("terminal", []), [t(f("count", [n(target)]))]));
    d.push(rule(a("goal", [c("robot"), n(100)]), [t(f("count", [n(target)]))]));
    d.push(rule(a("goal", [c("robot"), n(0)]), [not(a("true", [f("count", [n(target)])]))]));
    d
}

/// Two players alternately take between 1 and `max_take` stones from a pile;
/// whoever takes the last stone wins.
pub fn nim(stones: i64, max_take: i64) -> Description {
    let mut d = Description::new();
    d.push(fact(a("role", [c("first")])));
    d.push(fact(a("role", [c("second")])));
    d.push(fact(a("init", [f("stones", [n(stones)])])));
    d.push(fact(a("init", [f("control", [c("first")])])));
    // (after ?n ?k ?m): taking ?k from ?n leaves ?m.
    for from in 1..=stones {
        for take in 1..=max_take.min(from) {
            d.push(fact(a("after", [n(from), n(take), n(from - take)])));
        }
    }
    d.push(rule(
        a("legal", [v("p"), f("take", [v("k")])]),
        [
            t(f("control", [v("p")])),
            t(f("stones", [v("n")])),
            p(a("after", [v("n"), v("k"), v("m")])),
        ],
    ));
    d.push(rule(
        a("legal", [v("p"), c("noop")]),
        [
            p(a("role", [v("p")])),
            t(f("control", [v("q")])),
            Literal::distinct(v("p"), v("q")),
        ],
    ));
    d.push(rule(
        a("next", [f("stones", [v("m")])]),
        [
            p(a("does", [v("p"), f("take", [v("k")])])),
            t(f("stones", [v("n")])),
            p(a("after", [v("n"), v("k"), v("m")])),
        ],
    ));
    d.push(rule(a("next", [f("control", [c("second")])]), [t(f("control", [c("first")]))]));
    d.push(rule(a("next", [f("control", [c("first")])]), [t(f("control", [c("second")]))]));
    d.push(rule(
        a("next", [f("took", [v("p")])]),
        [p(a("does", [v("p"), f("take", [v("k")])]))],
    ));
    d.push(rule(a("terminal", []), [t(f("stones", [n(0)]))]));
    d.push(rule(a("goal", [v("p"), n(100)]), [t(f("took", [v("p")]))]));
    d.push(rule(
        a("goal", [v("p"), n(0)]),
        [p(a("role", [v("p")])), not(a("true", [f("took", [v("p")])]))],
    ));
    d
}

/// Classic noughts and crosses between `xplayer` and `oplayer`.
pub fn tic_tac_toe() -> Description {
    let mut d = Description::new();
    d.push(fact(a("role", [c("xplayer")])));
    d.push(fact(a("role", [c("oplayer")])));
    for m in 1..=3 {
        for k in 1..=3 {
            d.push(fact(a("init", [f("cell", [n(m), n(k), c("b")])])));
        }
    }
    d.push(fact(a("init", [f("control", [c("xplayer")])])));

    let cell = |m: Term, k: Term, w: Term| t(f("cell", [m, k, w]));
    let mark = |m: &str, k: &str| f("mark", [v(m), v(k)]);

    d.push(rule(
        a("next", [f("cell", [v("m"), v("n"), c("x")])]),
        [p(a("does", [c("xplayer"), mark("m", "n")])), cell(v("m"), v("n"), c("b"))],
    ));
    d.push(rule(
        a("next", [f("cell", [v("m"), v("n"), c("o")])]),
        [p(a("does", [c("oplayer"), mark("m", "n")])), cell(v("m"), v("n"), c("b"))],
    ));
    d.push(rule(
        a("next", [f("cell", [v("m"), v("n"), v("w")])]),
        [cell(v("m"), v("n"), v("w")), Literal::distinct(v("w"), c("b"))],
    ));
    d.push(rule(
        a("next", [f("cell", [v("m"), v("n"), c("b")])]),
        [
            p(a("does", [v("w"), mark("j", "k")])),
            cell(v("m"), v("n"), c("b")),
            Literal::or([Literal::distinct(v("m"), v("j")), Literal::distinct(v("n"), v("k"))]),
        ],
    ));
    d.push(rule(a("next", [f("control", [c("oplayer")])]), [t(f("control", [c("xplayer")]))]));
    d.push(rule(a("next", [f("control", [c("xplayer")])]), [t(f("control", [c("oplayer")]))]));

    d.push(rule(
        a("row", [v("m"), v("x")]),
        [cell(v("m"), n(1), v("x")), cell(v("m"), n(2), v("x")), cell(v("m"), n(3), v("x"))],
    ));
    d.push(rule(
        a("column", [v("n"), v("x")]),
        [cell(n(1), v("n"), v("x")), cell(n(2), v("n"), v("x")), cell(n(3), v("n"), v("x"))],
    ));
    d.push(rule(
        a("diagonal", [v("x")]),
        [cell(n(1), n(1), v("x")), cell(n(2), n(2), v("x")), cell(n(3), n(3), v("x"))],
    ));
    d.push(rule(
        a("diagonal", [v("x")]),
        [cell(n(1), n(3), v("x")), cell(n(2), n(2), v("x")), cell(n(3), n(1), v("x"))],
    ));
    d.push(rule(a("line", [v("x")]), [p(a("row", [v("m"), v("x")]))]));
    d.push(rule(a("line", [v("x")]), [p(a("column", [v("m"), v("x")]))]));
    d.push(rule(a("line", [v("x")]), [p(a("diagonal", [v("x")]))]));
    d.push(rule(a("open", []), [cell(v("m"), v("n"), c("b"))]));

    d.push(rule(
        a("legal", [v("w"), mark("x", "y")]),
        [cell(v("x"), v("y"), c("b")), t(f("control", [v("w")]))],
    ));
    d.push(rule(a("legal", [c("xplayer"), c("noop")]), [t(f("control", [c("oplayer")]))]));
    d.push(rule(a("legal", [c("oplayer"), c("noop")]), [t(f("control", [c("xplayer")]))]));

    for (me, mine, theirs) in [("xplayer", "x", "o"), ("oplayer", "o", "x")] {
        d.push(rule(a("goal", [c(me), n(100)]), [p(a("line", [c(mine)]))]));
        d.push(rule(
            a("goal", [c(me), n(50)]),
            [not(a("line", [c("x")])), not(a("line", [c("o")])), not(a("open", []))],
        ));
        d.push(rule(a("goal", [c(me), n(0)]), [p(a("line", [c(theirs)]))]));
    }
    d.push(rule(a("terminal", []), [p(a("line", [c("x")]))]));
    d.push(rule(a("terminal", []), [p(a("line", [c("o")]))]));
    d.push(rule(a("terminal", []), [not(a("open", []))]));
    d
}

/// One player presses either of two independent counters; the game ends as
/// soon as one of them reaches 3.
///
/// Finishing counter `a` is worth 100, finishing `b` is worth 40. The two
/// counters share no state, so the game splits into two subgames.
pub fn twin_counters() -> Description {
    let mut d = Description::new();
    d.push(fact(a("role", [c("p")])));
    for i in 0..3 {
        d.push(fact(a("succ", [n(i), n(i + 1)])));
    }
    for counter in ["a", "b"] {
        let press = f("press", [c(counter)]);
        d.push(fact(a("init", [f(counter, [n(0)])])));
        d.push(fact(a("legal", [c("p"), press.clone()])));
        d.push(rule(
            a("next", [f(counter, [v("y")])]),
            [
                t(f(counter, [v("x")])),
                p(a("does", [c("p"), press.clone()])),
                p(a("succ", [v("x"), v("y")])),
            ],
        ));
        d.push(rule(
            a("next", [f(counter, [v("x")])]),
            [t(f(counter, [v("x")])), not(a("does", [c("p"), press]))],
        ));
        d.push(rule(a("terminal", []), [t(f(counter, [n(3)]))]));
    }
    d.push(rule(a("goal", [c("p"), n(100)]), [t(f("a", [n(3)]))]));
    d.push(rule(a("goal", [c("p"), n(40)]), [t(f("b", [n(3)]))]));
    d.push(rule(
        a("goal", [c("p"), n(0)]),
        [not(a("true", [f("a", [n(3)])])), not(a("true", [f("b", [n(3)])]))],
    ));
    d
}

/// Three-ply zero-sum game with leaf values known in advance.
///
/// `max` picks `l` or `r`, `min` answers with `l` or `r`, then `max` picks
/// once more. Payoffs for `max` are
///
/// | path | `l` | `r` |
/// |------|-----|-----|
/// | `ll` | 30  | 50  |
/// | `lr` | 60  | 20  |
/// | `rl` | 10  | 50  |
/// | `rr` | 70  | 40  |
///
/// and `min` gets the complement. Both first moves are worth 50 to `max`.
pub fn zero_sum_tree() -> Description {
    let mut d = Description::new();
    d.push(fact(a("role", [c("max")])));
    d.push(fact(a("role", [c("min")])));
    d.push(fact(a("init", [f("phase", [n(0)])])));
    for side in ["l", "r"] {
        let pick = f("pick", [c(side)]);
        d.push(rule(a("legal", [c("max"), pick.clone()]), [t(f("phase", [n(0)]))]));
        d.push(rule(a("legal", [c("min"), pick.clone()]), [t(f("phase", [n(1)]))]));
        d.push(rule(a("legal", [c("max"), pick]), [t(f("phase", [n(2)]))]));
    }
    d.push(rule(a("legal", [c("min"), c("noop")]), [t(f("phase", [n(0)]))]));
    d.push(rule(a("legal", [c("max"), c("noop")]), [t(f("phase", [n(1)]))]));
    d.push(rule(a("legal", [c("min"), c("noop")]), [t(f("phase", [n(2)]))]));
    for i in 0..3 {
        d.push(rule(a("next", [f("phase", [n(i + 1)])]), [t(f("phase", [n(i)]))]));
    }
    d.push(rule(
        a("next", [f("first", [v("x")])]),
        [t(f("phase", [n(0)])), p(a("does", [c("max"), f("pick", [v("x")])]))],
    ));
    d.push(rule(
        a("next", [f("second", [v("y")])]),
        [p(a("does", [c("min"), f("pick", [v("y")])]))],
    ));
    d.push(rule(
        a("next", [f("third", [v("z")])]),
        [t(f("phase", [n(2)])), p(a("does", [c("max"), f("pick", [v("z")])]))],
    ));
    d.push(rule(a("next", [f("first", [v("x")])]), [t(f("first", [v("x")]))]));
    d.push(rule(a("next", [f("second", [v("y")])]), [t(f("second", [v("y")]))]));
    for (x, y, z, value) in [
        ("l", "l", "l", 30),
        ("l", "l", "r", 50),
        ("l", "r", "l", 60),
        ("l", "r", "r", 20),
        ("r", "l", "l", 10),
        ("r", "l", "r", 50),
        ("r", "r", "l", 70),
        ("r", "r", "r", 40),
    ] {
        d.push(fact(a("leaf", [c(x), c(y), c(z), n(value), n(100 - value)])));
    }
    d.push(rule(a("terminal", []), [t(f("phase", [n(3)]))]));
    let path = || {
        [
            t(f("first", [v("x")])),
            t(f("second", [v("y")])),
            t(f("third", [v("z")])),
            p(a("leaf", [v("x"), v("y"), v("z"), v("v"), v("w")])),
        ]
    };
    d.push(rule(a("goal", [c("max"), v("v")]), path()));
    d.push(rule(a("goal", [c("min"), v("w")]), path()));
    d
}

/// Single decision: `(choose a)` scores 20, `(choose b)` 90, `(choose c)` 50.
pub fn one_ply_choice() -> Description {
    let mut d = Description::new();
    d.push(fact(a("role", [c("solo")])));
    d.push(fact(a("init", [c("start")])));
    for (option, value) in [("a", 20), ("b", 90), ("c", 50)] {
        d.push(rule(a("legal", [c("solo"), f("choose", [c(option)])]), [t(c("start"))]));
        d.push(rule(a("goal", [c("solo"), n(value)]), [t(f("chose", [c(option)]))]));
    }
    d.push(rule(
        a("next", [f("chose", [v("x")])]),
        [p(a("does", [c("solo"), f("choose", [v("x")])]))],
    ));
    d.push(rule(a("terminal", []), [t(f("chose", [v("x")]))]));
    d
}

/// A `setter` hides a coin, a `guesser` then guesses it.
///
/// The guesser only sees `ready` once the coin is set; the setter sees the
/// coin. Guessing right is worth 100 to the guesser.
pub fn hidden_coin() -> Description {
    let mut d = Description::new();
    d.push(fact(a("role", [c("setter")])));
    d.push(fact(a("role", [c("guesser")])));
    d.push(fact(a("init", [f("step", [c("set")])])));
    for side in ["heads", "tails"] {
        d.push(rule(
            a("legal", [c("setter"), f("choose", [c(side)])]),
            [t(f("step", [c("set")]))],
        ));
        d.push(rule(
            a("legal", [c("guesser"), f("guess", [c(side)])]),
            [t(f("step", [c("guess")]))],
        ));
    }
    d.push(rule(a("legal", [c("guesser"), c("wait")]), [t(f("step", [c("set")]))]));
    d.push(rule(a("legal", [c("setter"), c("wait")]), [t(f("step", [c("guess")]))]));
    d.push(rule(
        a("next", [f("coin", [v("c")])]),
        [p(a("does", [c("setter"), f("choose", [v("c")])]))],
    ));
    d.push(rule(a("next", [f("coin", [v("c")])]), [t(f("coin", [v("c")]))]));
    d.push(rule(
        a("next", [f("guessed", [v("c")])]),
        [p(a("does", [c("guesser"), f("guess", [v("c")])]))],
    ));
    d.push(rule(a("next", [f("step", [c("guess")])]), [t(f("step", [c("set")]))]));
    d.push(rule(a("next", [f("step", [c("done")])]), [t(f("step", [c("guess")]))]));
    d.push(rule(a("sees", [c("guesser"), c("ready")]), [t(f("step", [c("guess")]))]));
    d.push(rule(a("sees", [c("setter"), f("coin", [v("c")])]), [t(f("coin", [v("c")]))]));
    d.push(rule(
        a("right", []),
        [t(f("coin", [v("c")])), t(f("guessed", [v("c")]))],
    ));
    d.push(rule(a("terminal", []), [t(f("step", [c("done")]))]));
    d.push(rule(a("goal", [c("guesser"), n(100)]), [p(a("right", []))]));
    d.push(rule(a("goal", [c("guesser"), n(0)]), [not(a("right", []))]));
    d.push(rule(a("goal", [c("setter"), n(100)]), [not(a("right", []))]));
    d.push(rule(a("goal", [c("setter"), n(0)]), [p(a("right", []))]));
    d
}

/// One move leads to a terminal state where two goal values hold at once.
pub fn ambiguous_goal() -> Description {
    let mut d = Description::new();
    d.push(fact(a("role", [c("solo")])));
    d.push(fact(a("init", [c("start")])));
    d.push(rule(a("legal", [c("solo"), c("go")]), [t(c("start"))]));
    d.push(rule(a("next", [c("done")]), [p(a("does", [c("solo"), c("go")]))]));
    d.push(rule(a("terminal", []), [t(c("done"))]));
    d.push(rule(a("goal", [c("solo"), n(50)]), [t(c("done"))]));
    d.push(rule(a("goal", [c("solo"), n(60)]), [t(c("done"))]));
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground::ground;
    use test_log::test;

    #[test]
    fn test_all_games_ground() {
        for (name, description) in [
            ("counting", counting(4)),
            ("nim", nim(5, 3)),
            ("tic_tac_toe", tic_tac_toe()),
            ("twin_counters", twin_counters()),
            ("zero_sum_tree", zero_sum_tree()),
            ("one_ply_choice", one_ply_choice()),
            ("hidden_coin", hidden_coin()),
            ("ambiguous_goal", ambiguous_goal()),
        ] {
            assert!(ground(&description).is_ok(), "{} failed to ground", name);
        }
    }

    #[test]
    fn test_tic_tac_toe_moves() {
        let program = ground(&tic_tac_toe()).unwrap();
        // Nine marks plus noop for each role.
        assert_eq!(program.moves(0).len(), 10);
        assert_eq!(program.moves(1).len(), 10);
        assert_eq!(program.bases().len(), 27 + 2);
    }
}
