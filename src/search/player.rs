//! The match-facing player: state tracking, deadlines and fallbacks.

use std::fmt;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::ast::Term;
use crate::error::SearchError;
use crate::machine::StateMachine;
use crate::search::clock::{Deadline, SearchClock};
use crate::search::{Context, Strategy};
use crate::state::{Move, Role, State};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Time kept back from every deadline (default: 1000 ms)
    pub safety_margin: Duration,
    /// Propagate strategy failures instead of falling back (default: false)
    pub fail_fast: bool,
    /// Clock poll interval in expanded nodes (default: 16)
    pub poll_interval: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_millis(1000),
            fail_fast: false,
            poll_interval: 16,
        }
    }
}

impl PlayerConfig {
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_poll_interval(mut self, interval: u64) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Notification sent after every move selection.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveSelected {
    pub turn: usize,
    pub legal: Vec<Move>,
    pub chosen: Move,
    /// Strategy's estimate; `None` on fallback.
    pub score: Option<f64>,
    pub elapsed: Duration,
    /// The first legal move was played because the strategy had no answer.
    pub fallback: bool,
}

pub trait MoveObserver {
    fn on_move_selected(&mut self, event: &MoveSelected);
}

impl<F: FnMut(&MoveSelected)> MoveObserver for F {
    fn on_move_selected(&mut self, event: &MoveSelected) {
        self(event)
    }
}

/// Logs every selection at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl MoveObserver for LogObserver {
    fn on_move_selected(&mut self, event: &MoveSelected) {
        info!(
            "turn {}: {} of {} legal moves, score {:?}, {:?}{}",
            event.turn,
            event.chosen,
            event.legal.len(),
            event.score,
            event.elapsed,
            if event.fallback { " (fallback)" } else { "" }
        );
    }
}

pub struct Player<M> {
    machine: M,
    role: Role,
    state: State,
    turn: usize,
    strategy: Box<dyn Strategy<M> + Send>,
    observers: Vec<Box<dyn MoveObserver + Send>>,
    config: PlayerConfig,
}

impl<M: StateMachine> Player<M> {
    /// A player at the initial state.
    pub fn new(machine: M, role: Role, strategy: Box<dyn Strategy<M> + Send>) -> Self {
        let state = machine.initial_state();
        Self {
            machine,
            role,
            state,
            turn: 0,
            strategy,
            observers: Vec::new(),
            config: PlayerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn MoveObserver + Send>) {
        self.observers.push(observer);
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Number of joint moves played so far.
    pub fn turn(&self) -> usize {
        self.turn
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn is_terminal(&self) -> bool {
        self.machine.is_terminal(&self.state)
    }

    fn clock(&self, deadline: Deadline) -> SearchClock {
        SearchClock::new(deadline.reserve(self.config.safety_margin)).with_poll_interval(self.config.poll_interval)
    }

    /// Lets the strategy prepare until `deadline` minus the safety margin.
    pub fn meta_game(&mut self, deadline: Deadline) -> Result<(), SearchError> {
        let mut clock = self.clock(deadline);
        let ctx = Context::new(&self.machine, &self.role, &self.state);
        match self.strategy.meta_game(ctx, &mut clock) {
            Ok(()) => Ok(()),
            Err(e) if self.config.fail_fast => Err(e),
            Err(e) => {
                warn!("{}: meta game failed: {}", self.strategy.name(), e);
                Ok(())
            }
        }
    }

    /// Picks a move before `deadline` minus the safety margin.
    ///
    /// Falls back to the first legal move when the strategy fails, returns
    /// nothing, or returns an illegal move.
    pub fn select_move(&mut self, deadline: Deadline) -> Result<Move, SearchError> {
        let start = Instant::now();
        let legal = self.machine.legal_moves(&self.state, &self.role);
        let Some(first) = legal.first().cloned() else {
            return Err(SearchError::NoLegalMoves {
                role: self.role.to_string(),
            });
        };

        let mut clock = self.clock(deadline);
        let ctx = Context::new(&self.machine, &self.role, &self.state);
        let outcome = self.strategy.select_move(ctx, &mut clock);
        let name = self.strategy.name();
        let (chosen, score) = match outcome {
            Ok(Some(choice)) if legal.contains(&choice.mv) => (Some(choice.mv), Some(choice.score)),
            Ok(Some(choice)) => {
                warn!("{}: chose illegal move {}", name, choice.mv);
                if self.config.fail_fast {
                    return Err(SearchError::NoResult);
                }
                (None, None)
            }
            Ok(None) => {
                warn!("{}: no move found", name);
                if self.config.fail_fast {
                    return Err(SearchError::NoResult);
                }
                (None, None)
            }
            Err(e) => {
                warn!("{}: search failed: {}", name, e);
                if self.config.fail_fast {
                    return Err(e);
                }
                (None, None)
            }
        };

        let fallback = chosen.is_none();
        let chosen = chosen.unwrap_or(first);
        let event = MoveSelected {
            turn: self.turn,
            legal,
            chosen: chosen.clone(),
            score,
            elapsed: start.elapsed(),
            fallback,
        };
        for observer in &mut self.observers {
            observer.on_move_selected(&event);
        }
        Ok(chosen)
    }

    /// Advances to the state after `joint` and tells the strategy.
    pub fn play(&mut self, joint: &[Move]) -> Result<(), SearchError> {
        self.state = self.machine.perform(&self.state, joint)?;
        self.turn += 1;
        let ctx = Context::new(&self.machine, &self.role, &self.state);
        self.strategy.observe(ctx, joint);
        Ok(())
    }

    /// Forwards what the role saw at the start of this turn.
    pub fn perceive(&mut self, percepts: &[Term]) {
        self.strategy.perceive(percepts);
    }
}

impl<M: fmt::Debug> fmt::Debug for Player<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("machine", &self.machine)
            .field("role", &self.role)
            .field("turn", &self.turn)
            .field("observers", &self.observers.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PropnetMachine;
    use crate::games;
    use crate::search::mcts::{Mcts, MctsConfig};
    use crate::search::simple::Legal;
    use crate::search::Choice;
    use std::sync::{Arc, Mutex};
    use test_log::test;

    /// Always fails, or always answers with a move nobody can play.
    struct Broken {
        illegal: bool,
    }

    impl<M: StateMachine> Strategy<M> for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn select_move(&mut self, _ctx: Context<'_, M>, _clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
            if self.illegal {
                Ok(Some(Choice::new(Move::new(Term::constant("nonsense")), 100.0)))
            } else {
                Err(SearchError::NoResult)
            }
        }
    }

    fn recorded(player: &mut Player<PropnetMachine>) -> Arc<Mutex<Vec<MoveSelected>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        player.add_observer(Box::new(move |e: &MoveSelected| sink.lock().unwrap().push(e.clone())));
        events
    }

    fn tic_tac_toe_player(strategy: Box<dyn Strategy<PropnetMachine> + Send>) -> Player<PropnetMachine> {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let role = machine.roles()[0].clone();
        Player::new(machine, role, strategy).with_config(PlayerConfig::default().with_safety_margin(Duration::ZERO))
    }

    #[test]
    fn test_fallback_on_failure() {
        for illegal in [false, true] {
            let mut player = tic_tac_toe_player(Box::new(Broken { illegal }));
            let events = recorded(&mut player);
            let legal = player.machine().legal_moves(player.state(), player.role());
            let mv = player.select_move(Deadline::after(Duration::from_secs(1))).unwrap();
            assert_eq!(mv, legal[0]);
            let events = events.lock().unwrap();
            assert_eq!(events.len(), 1);
            assert!(events[0].fallback);
            assert_eq!(events[0].score, None);
        }
    }

    #[test]
    fn test_fail_fast() {
        let mut player = tic_tac_toe_player(Box::new(Broken { illegal: false }));
        player = player.with_config(PlayerConfig::default().with_fail_fast(true));
        let result = player.select_move(Deadline::after(Duration::from_secs(1)));
        assert_eq!(result, Err(SearchError::NoResult));
    }

    #[test]
    fn test_play_advances_state() {
        let mut player = tic_tac_toe_player(Box::new(Legal));
        let events = recorded(&mut player);
        let mv = player.select_move(Deadline::after(Duration::from_secs(1))).unwrap();
        let joint = vec![mv, Move::new(Term::constant("noop"))];
        let expected = player.machine().perform(player.state(), &joint).unwrap();
        player.play(&joint).unwrap();
        assert_eq!(player.state(), &expected);
        assert_eq!(player.turn(), 1);
        assert!(!events.lock().unwrap()[0].fallback);
    }

    #[test]
    fn test_no_legal_move_is_an_error() {
        let machine = PropnetMachine::from_description(&games::one_ply_choice()).unwrap();
        let role = machine.roles()[0].clone();
        let mut player = Player::new(machine, role, Box::new(Legal));
        player
            .play(&[Move::new(Term::func("choose", [Term::constant("a")]))])
            .unwrap();
        assert!(player.is_terminal());
        let result = player.select_move(Deadline::after(Duration::from_secs(1)));
        assert!(matches!(result, Err(SearchError::NoLegalMoves { .. })));
    }

    #[test]
    fn test_safety_margin_is_reserved() {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let role = machine.roles()[0].clone();
        let mut player = Player::new(machine, role, Box::new(Mcts::new(MctsConfig::default().with_seed(1))))
            .with_config(PlayerConfig::default().with_safety_margin(Duration::from_millis(900)));
        let start = Instant::now();
        player.select_move(Deadline::after(Duration::from_millis(1000))).unwrap();
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
