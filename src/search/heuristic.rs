//! Static evaluation of non-terminal states at the depth limit.
//!
//! Every heuristic returns a value in `0..=100` from the point of view of
//! one role, comparable with goal values. Mobility is the share of a role's
//! moves that are legal, scaled to that range.

use rand::Rng;

use crate::error::MachineError;
use crate::machine::StateMachine;
use crate::state::{Role, State};

/// Mobility-based scores are capped below a win.
const MOBILITY_CAP: f64 = 99.0;

/// Legal moves of `role` as a percentage of all its moves.
fn mobility<M: StateMachine>(machine: &M, state: &State, role: &Role) -> f64 {
    let total = machine.moves(role).len();
    if total == 0 {
        return 0.0;
    }
    let legal = machine.legal_moves(state, role).len();
    (100.0 * legal as f64 / total as f64).min(MOBILITY_CAP)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Heuristic {
    /// Every cut-off state is worth nothing.
    #[default]
    Zero,
    /// The role's goal value in the state, as if the game ended there.
    GoalProximity,
    /// Share of the role's moves that are legal.
    Mobility,
    /// Average mobility of the other roles.
    OpponentMobility,
    /// Mean goal over random playouts; the mean of those finished when
    /// stopped early.
    MonteCarlo { samples: usize },
    /// Weighted mean of other heuristics.
    Weighted(Vec<(f64, Heuristic)>),
}

impl Heuristic {
    /// Scores `state` for `role`. `stop` is asked between playout steps.
    pub fn evaluate<M, R, F>(
        &self,
        machine: &M,
        state: &State,
        role: &Role,
        rng: &mut R,
        stop: &mut F,
    ) -> Result<f64, MachineError>
    where
        M: StateMachine,
        R: Rng + ?Sized,
        F: FnMut() -> bool,
    {
        match self {
            Heuristic::Zero => Ok(0.0),
            Heuristic::GoalProximity => Ok(machine.goal(state, role).map_or(0.0, f64::from)),
            Heuristic::Mobility => Ok(mobility(machine, state, role)),
            Heuristic::OpponentMobility => {
                let roles = machine.roles();
                if roles.len() < 2 {
                    return Ok(0.0);
                }
                let total: f64 = roles
                    .iter()
                    .filter(|r| r.index() != role.index())
                    .map(|r| mobility(machine, state, r))
                    .sum();
                Ok(total / (roles.len() - 1) as f64)
            }
            Heuristic::MonteCarlo { samples } => {
                let mut total = 0.0;
                let mut finished = 0;
                for _ in 0..*samples {
                    let Some((last, _)) = machine.depth_charge_until(state, rng, &mut *stop)? else {
                        break;
                    };
                    total += f64::from(machine.goal(&last, role)?);
                    finished += 1;
                }
                if finished == 0 {
                    return Ok(0.0);
                }
                Ok(total / f64::from(finished))
            }
            Heuristic::Weighted(parts) => {
                let weight: f64 = parts.iter().map(|(w, _)| w).sum();
                if weight <= 0.0 {
                    return Ok(0.0);
                }
                let mut total = 0.0;
                for (w, part) in parts {
                    total += w * part.evaluate(machine, state, role, rng, stop)?;
                }
                Ok(total / weight)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PropnetMachine;
    use crate::games;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    fn setup() -> (PropnetMachine, State, Role, Role) {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let state = machine.initial_state();
        let x = machine.roles()[0].clone();
        let o = machine.roles()[1].clone();
        (machine, state, x, o)
    }

    fn eval<M: StateMachine>(h: &Heuristic, machine: &M, state: &State, role: &Role) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        h.evaluate(machine, state, role, &mut rng, &mut || false).unwrap()
    }

    #[test]
    fn test_mobility_is_a_share_of_all_moves() {
        let (machine, state, x, o) = setup();
        // Nine of ten moves for xplayer, only noop for oplayer.
        assert_eq!(machine.moves(&x).len(), 10);
        assert_eq!(eval(&Heuristic::Mobility, &machine, &state, &x), 90.0);
        assert_eq!(eval(&Heuristic::Mobility, &machine, &state, &o), 10.0);
        assert_eq!(eval(&Heuristic::OpponentMobility, &machine, &state, &o), 90.0);
        assert_eq!(eval(&Heuristic::OpponentMobility, &machine, &state, &x), 10.0);
    }

    #[test]
    fn test_full_mobility_stays_below_a_win() {
        let machine = PropnetMachine::from_description(&games::counting(3)).unwrap();
        let state = machine.initial_state();
        let role = machine.roles()[0].clone();
        assert_eq!(eval(&Heuristic::Mobility, &machine, &state, &role), 99.0);
    }

    #[test]
    fn test_goal_proximity_and_zero() {
        let machine = PropnetMachine::from_description(&games::counting(3)).unwrap();
        let state = machine.initial_state();
        let role = machine.roles()[0].clone();
        assert_eq!(eval(&Heuristic::GoalProximity, &machine, &state, &role), 0.0);
        assert_eq!(eval(&Heuristic::Zero, &machine, &state, &role), 0.0);
        assert_eq!(eval(&Heuristic::OpponentMobility, &machine, &state, &role), 0.0);
    }

    #[test]
    fn test_monte_carlo_on_forced_win() {
        let machine = PropnetMachine::from_description(&games::counting(4)).unwrap();
        let state = machine.initial_state();
        let role = machine.roles()[0].clone();
        assert_eq!(eval(&Heuristic::MonteCarlo { samples: 10 }, &machine, &state, &role), 100.0);
    }

    #[test]
    fn test_monte_carlo_stops_early() {
        let machine = PropnetMachine::from_description(&games::counting(4)).unwrap();
        let state = machine.initial_state();
        let role = machine.roles()[0].clone();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let h = Heuristic::MonteCarlo { samples: 10 };
        // Room for exactly one playout of four steps.
        let mut steps = 0;
        let mut stop = || {
            steps += 1;
            steps > 4
        };
        assert_eq!(h.evaluate(&machine, &state, &role, &mut rng, &mut stop).unwrap(), 100.0);
        assert_eq!(steps, 5);
        assert_eq!(h.evaluate(&machine, &state, &role, &mut rng, &mut || true).unwrap(), 0.0);
    }

    #[test]
    fn test_weighted_mean() {
        let (machine, state, x, _) = setup();
        let h = Heuristic::Weighted(vec![(1.0, Heuristic::Mobility), (3.0, Heuristic::Zero)]);
        assert_eq!(eval(&h, &machine, &state, &x), 22.5);
        assert_eq!(eval(&Heuristic::Weighted(vec![]), &machine, &state, &x), 0.0);
    }
}
