//! # ggp-rs: a General Game Playing core
//!
//! **`ggp-rs`** compiles declarative game rules into a propositional network
//! (*propnet*) and plays the resulting game under a wall-clock budget.
//!
//! ## From rules to moves
//!
//! 1. A game is described by logical rules ([`ast::Description`]): `role`,
//!    `init`, `legal`, `next`, `goal`, `terminal` and optionally `sees`.
//! 2. [`ground`] validates the rules and instantiates them over the
//!    reachable domain.
//! 3. [`compile`] turns the ground program into a boolean circuit
//!    ([`propnet::Propnet`]) with a topological evaluation order
//!    ([`schedule`]).
//! 4. [`eval::PropnetMachine`] evaluates the circuit behind the
//!    [`machine::StateMachine`] interface.
//! 5. The engines in [`search`] drive a state machine until their deadline
//!    and pick a move; a [`search::Player`] wraps them for a match.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use ggp_rs::eval::PropnetMachine;
//! use ggp_rs::games;
//! use ggp_rs::machine::StateMachine;
//! use ggp_rs::search::{Deadline, Minimax, Player, PlayerConfig};
//!
//! let machine = PropnetMachine::from_description(&games::counting(5)).unwrap();
//! let role = machine.roles()[0].clone();
//! let mut player = Player::new(machine, role, Box::new(Minimax::default()))
//!     .with_config(PlayerConfig::default().with_safety_margin(Duration::ZERO));
//!
//! let mv = player.select_move(Deadline::after(Duration::from_secs(1))).unwrap();
//! assert_eq!(mv.to_string(), "increment");
//! ```
//!
//! ## Core Components
//!
//! - **[`propnet`]**, **[`compile`]**, **[`schedule`]**: the circuit and how it is built.
//! - **[`eval`]**: propagation over an explicit value buffer.
//! - **[`prover`]**: a second state machine working on the ground rules directly.
//! - **[`cache`]**: memoization of state-machine queries.
//! - **[`factor`]**: detection of independent subgames.
//! - **[`search`]**: minimax, Monte Carlo tree search and the player.
//! - **[`belief`]**: state hypotheses for games with imperfect information.
//! - **[`dot`]**: Graphviz output of a propnet.

pub mod ast;
pub mod belief;
pub mod bitset;
pub mod cache;
pub mod compile;
pub mod dot;
pub mod error;
pub mod eval;
pub mod factor;
pub mod games;
pub mod ground;
pub mod logic;
pub mod machine;
pub mod node;
pub mod propnet;
pub mod prover;
pub mod schedule;
pub mod search;
pub mod state;

pub use error::{Error, Result};
