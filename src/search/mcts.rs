//! Monte Carlo tree search engines.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::SearchError;
use crate::machine::StateMachine;
use crate::search::clock::SearchClock;
use crate::search::tree::GameTree;
use crate::search::{Choice, Context, Strategy};
use crate::state::Move;

/// Parameters shared by the tree search engines.
#[derive(Debug, Clone, PartialEq)]
pub struct MctsConfig {
    /// Exploration constant, divided by the number of player moves (default: 45)
    pub exploration: f64,
    /// Upper bound of the opponent exploration factor (default: 2)
    pub opponent_cap: f64,
    /// Playout seed; `None` draws one per tree (default: `None`)
    pub seed: Option<u64>,
    /// Stop after this many samples per move even if time remains (default: `None`)
    pub max_samples: Option<u64>,
    /// Sampling threads of [`ThreadedMcts`] (default: 1)
    pub workers: usize,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            exploration: 45.0,
            opponent_cap: 2.0,
            seed: None,
            max_samples: None,
            workers: 1,
        }
    }
}

impl MctsConfig {
    pub fn with_exploration(mut self, exploration: f64) -> Self {
        self.exploration = exploration;
        self
    }

    pub fn with_opponent_cap(mut self, cap: f64) -> Self {
        self.opponent_cap = cap;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_samples(mut self, samples: u64) -> Self {
        self.max_samples = Some(samples);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub(crate) fn seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| rand::rng().random())
    }

    pub(crate) fn new_tree<M: StateMachine>(&self, ctx: Context<'_, M>) -> GameTree {
        GameTree::new(ctx.machine, ctx.state.clone(), ctx.role.index(), self.seed())
            .with_exploration(self.exploration, self.opponent_cap)
    }
}

/// Samples into `tree` until the clock expires or `max_samples` are taken.
///
/// The deadline is read before every sample and every playout step; a
/// playout cut short by it is abandoned.
pub(crate) fn sample_until<M: StateMachine>(
    tree: &mut GameTree,
    machine: &M,
    clock: &mut SearchClock,
    max_samples: Option<u64>,
) -> Result<u64, SearchError> {
    let mut samples = 0;
    while max_samples.map_or(true, |max| samples < max) && !clock.poll() {
        if tree.run_sample_until(machine, || clock.check())?.is_none() {
            break;
        }
        samples += 1;
    }
    Ok(samples)
}

/// Converts the tree's recommendation into a [`Choice`]; a null move is no choice.
pub(crate) fn tree_choice(tree: &GameTree) -> Option<Choice> {
    match tree.best_move() {
        Some((Some(mv), score)) => Some(Choice::new(mv, score)),
        _ => None,
    }
}

/// Single-threaded hybrid MCTS, reusing its tree across turns.
#[derive(Debug, Default)]
pub struct Mcts {
    config: MctsConfig,
    tree: Option<GameTree>,
}

impl Mcts {
    pub fn new(config: MctsConfig) -> Self {
        Self { config, tree: None }
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    pub fn tree(&self) -> Option<&GameTree> {
        self.tree.as_ref()
    }

    /// The tree rooted at `ctx.state`, reused when possible.
    fn tree_for<M: StateMachine>(&mut self, ctx: Context<'_, M>) -> Result<&mut GameTree, SearchError> {
        let reusable = match &mut self.tree {
            Some(tree) if tree.player() == ctx.role.index() => tree.advance_to_state(ctx.machine, ctx.state)?,
            _ => false,
        };
        if !reusable {
            debug!("mcts: starting a fresh tree");
        }
        if !reusable {
            self.tree = Some(self.config.new_tree(ctx));
        }
        Ok(self.tree.as_mut().expect("tree was just ensured"))
    }
}

impl<M: StateMachine> Strategy<M> for Mcts {
    fn name(&self) -> &str {
        "mcts"
    }

    fn meta_game(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<(), SearchError> {
        let max_samples = self.config.max_samples;
        let tree = self.tree_for(ctx)?;
        let samples = sample_until(tree, ctx.machine, clock, max_samples)?;
        info!("mcts: {} samples during meta game, {} nodes", samples, tree.len());
        Ok(())
    }

    fn select_move(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
        let max_samples = self.config.max_samples;
        let tree = self.tree_for(ctx)?;
        let samples = sample_until(tree, ctx.machine, clock, max_samples)?;
        let choice = tree_choice(tree);
        info!(
            "mcts: {} samples, {} nodes, root visits {}, choice {:?}",
            samples,
            tree.len(),
            tree.root_visits(),
            choice.as_ref().map(|c| c.to_string())
        );
        Ok(choice)
    }

    fn observe(&mut self, ctx: Context<'_, M>, joint: &[Move]) {
        if let Some(tree) = &mut self.tree {
            if let Err(e) = tree.advance_by_moves(ctx.machine, joint) {
                warn!("mcts: dropping tree, cannot advance: {}", e);
                self.tree = None;
            }
        }
    }
}

/// MCTS sampling on worker threads while the caller waits for the deadline.
///
/// Each worker owns a clone of the state machine and its own playout rng;
/// all of them sample into one tree behind a mutex. The lock is held to
/// select and to backpropagate, never during a playout.
#[derive(Debug, Default)]
pub struct ThreadedMcts {
    config: MctsConfig,
    tree: Option<Arc<Mutex<GameTree>>>,
}

impl ThreadedMcts {
    pub fn new(config: MctsConfig) -> Self {
        Self { config, tree: None }
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    /// Shared handle to the current tree.
    pub fn tree(&self) -> Option<Arc<Mutex<GameTree>>> {
        self.tree.clone()
    }

    fn tree_for<M: StateMachine>(&mut self, ctx: Context<'_, M>) -> Result<Arc<Mutex<GameTree>>, SearchError> {
        if let Some(shared) = &self.tree {
            let mut tree = shared.lock().map_err(|_| SearchError::WorkerPanicked)?;
            if tree.player() == ctx.role.index() && tree.advance_to_state(ctx.machine, ctx.state)? {
                return Ok(Arc::clone(shared));
            }
        }
        debug!("threaded mcts: starting a fresh tree");
        let shared = Arc::new(Mutex::new(self.config.new_tree(ctx)));
        self.tree = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Runs the workers until the clock expires; returns the samples taken.
    fn sample<M: StateMachine + Clone + Send>(
        &self,
        shared: &Mutex<GameTree>,
        machine: &M,
        clock: &mut SearchClock,
    ) -> Result<u64, SearchError> {
        let stop = AtomicBool::new(false);
        let taken = AtomicU64::new(0);
        let max_samples = self.config.max_samples;
        let workers = self.config.workers.max(1);
        let seed = self.config.seed();

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let machine = machine.clone();
                    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(worker as u64));
                    let (stop, taken) = (&stop, &taken);
                    scope.spawn(move || -> Result<(), SearchError> {
                        while !stop.load(Ordering::Relaxed) {
                            if let Some(max) = max_samples {
                                if taken.fetch_add(1, Ordering::Relaxed) >= max {
                                    break;
                                }
                            }
                            let pending = shared
                                .lock()
                                .map_err(|_| SearchError::WorkerPanicked)?
                                .begin_sample(&machine)?;
                            let goal = pending.resolve(&machine, &mut rng, || stop.load(Ordering::Relaxed));
                            let mut tree = shared.lock().map_err(|_| SearchError::WorkerPanicked)?;
                            match goal {
                                Ok(Some(goal)) => tree.finish_sample(pending, goal),
                                Ok(None) => tree.abandon_sample(pending),
                                Err(e) => {
                                    tree.abandon_sample(pending);
                                    return Err(e);
                                }
                            }
                        }
                        Ok(())
                    })
                })
                .collect();

            while !clock.check() && !handles.iter().all(|h| h.is_finished()) {
                thread::sleep(clock.deadline().remaining().min(Duration::from_millis(2)));
            }
            stop.store(true, Ordering::Relaxed);

            let mut result = Ok(());
            for handle in handles {
                let outcome = handle.join().unwrap_or(Err(SearchError::WorkerPanicked));
                if let Err(e) = outcome {
                    warn!("threaded mcts: worker failed: {}", e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
            result
        })?;

        let tree = shared.lock().map_err(|_| SearchError::WorkerPanicked)?;
        Ok(tree.samples())
    }
}

impl<M: StateMachine + Clone + Send> Strategy<M> for ThreadedMcts {
    fn name(&self) -> &str {
        "threaded-mcts"
    }

    fn meta_game(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<(), SearchError> {
        let shared = self.tree_for(ctx)?;
        let samples = self.sample(&shared, ctx.machine, clock)?;
        info!("threaded mcts: {} samples during meta game", samples);
        Ok(())
    }

    fn select_move(&mut self, ctx: Context<'_, M>, clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
        let shared = self.tree_for(ctx)?;
        if let Err(e) = self.sample(&shared, ctx.machine, clock) {
            if matches!(e, SearchError::WorkerPanicked) {
                self.tree = None;
            }
            return Err(e);
        }
        let tree = shared.lock().map_err(|_| SearchError::WorkerPanicked)?;
        let choice = tree_choice(&tree);
        info!(
            "threaded mcts: {} workers, {} nodes, root visits {}, choice {:?}",
            self.config.workers,
            tree.len(),
            tree.root_visits(),
            choice.as_ref().map(|c| c.to_string())
        );
        Ok(choice)
    }

    fn observe(&mut self, ctx: Context<'_, M>, joint: &[Move]) {
        let Some(shared) = &self.tree else { return };
        let advanced = match shared.lock() {
            Ok(mut tree) => tree.advance_by_moves(ctx.machine, joint),
            Err(_) => Err(SearchError::WorkerPanicked),
        };
        if let Err(e) = advanced {
            warn!("threaded mcts: dropping tree, cannot advance: {}", e);
            self.tree = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Term;
    use crate::eval::PropnetMachine;
    use crate::games;
    use crate::search::clock::Deadline;
    use crate::state::Role;
    use test_log::test;

    fn long_clock() -> SearchClock {
        SearchClock::new(Deadline::after(Duration::from_secs(30)))
    }

    fn choose(option: &str) -> Move {
        Move::new(Term::func("choose", [Term::constant(option)]))
    }

    fn solo() -> (PropnetMachine, Role) {
        let machine = PropnetMachine::from_description(&games::one_ply_choice()).unwrap();
        let role = machine.roles()[0].clone();
        (machine, role)
    }

    #[test]
    fn test_mcts_finds_best_choice() {
        let (machine, role) = solo();
        let state = machine.initial_state();
        let mut mcts = Mcts::new(MctsConfig::default().with_seed(1).with_max_samples(100));
        let choice = mcts
            .select_move(Context::new(&machine, &role, &state), &mut long_clock())
            .unwrap()
            .unwrap();
        assert_eq!(choice.mv, choose("b"));
        assert_eq!(choice.score, 90.0);
        assert_eq!(mcts.tree().unwrap().samples(), 100);
    }

    #[test]
    fn test_mcts_stops_at_deadline() {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut mcts = Mcts::new(MctsConfig::default().with_seed(1));
        let mut clock = SearchClock::new(Deadline::after(Duration::from_millis(50)));
        let start = std::time::Instant::now();
        let choice = mcts.select_move(Context::new(&machine, &role, &state), &mut clock).unwrap();
        assert!(choice.is_some());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_mcts_reuses_tree_after_observe() {
        let machine = PropnetMachine::from_description(&games::nim(5, 2)).unwrap();
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut mcts = Mcts::new(MctsConfig::default().with_seed(3).with_max_samples(200));
        mcts.select_move(Context::new(&machine, &role, &state), &mut long_clock())
            .unwrap();
        let joint = machine.legal_joint_moves(&state).unwrap().remove(0);
        let next = machine.perform(&state, &joint).unwrap();
        Strategy::<PropnetMachine>::observe(&mut mcts, Context::new(&machine, &role, &next), &joint);
        let tree = mcts.tree().unwrap();
        assert_eq!(tree.root_state(), &next);
        assert!(tree.root_visits() > 0);
    }

    #[test]
    fn test_threaded_mcts_finds_best_choice() {
        let (machine, role) = solo();
        let state = machine.initial_state();
        let mut mcts = ThreadedMcts::new(MctsConfig::default().with_seed(1).with_max_samples(300).with_workers(2));
        let choice = mcts
            .select_move(Context::new(&machine, &role, &state), &mut long_clock())
            .unwrap()
            .unwrap();
        assert_eq!(choice.mv, choose("b"));
        let tree = mcts.tree().unwrap();
        let samples = tree.lock().unwrap().samples();
        assert!(samples >= 300);
    }

    #[test]
    fn test_mcts_stops_mid_playout() {
        let machine = PropnetMachine::from_description(&games::counting(300)).unwrap();
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut mcts = Mcts::new(MctsConfig::default().with_seed(1));
        let budget = Duration::from_millis(10);
        let mut clock = SearchClock::new(Deadline::after(budget));
        let start = std::time::Instant::now();
        mcts.select_move(Context::new(&machine, &role, &state), &mut clock).unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed < budget + Duration::from_millis(20), "took {:?}", elapsed);
    }

    fn threaded_samples(workers: usize) -> u64 {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut mcts = ThreadedMcts::new(MctsConfig::default().with_seed(5).with_workers(workers));
        let mut clock = SearchClock::new(Deadline::after(Duration::from_millis(200)));
        mcts.select_move(Context::new(&machine, &role, &state), &mut clock).unwrap();
        let tree = mcts.tree().unwrap();
        let samples = tree.lock().unwrap().samples();
        samples
    }

    #[test]
    fn test_threaded_workers_sample_in_parallel() {
        if thread::available_parallelism().map_or(1, |n| n.get()) < 2 {
            return;
        }
        let one = threaded_samples(1);
        let two = threaded_samples(2);
        assert!(two > one, "one worker: {}, two workers: {}", one, two);
    }

    #[test]
    fn test_threaded_mcts_respects_deadline() {
        let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let role = machine.roles()[0].clone();
        let state = machine.initial_state();
        let mut mcts = ThreadedMcts::new(MctsConfig::default().with_workers(2));
        let mut clock = SearchClock::new(Deadline::after(Duration::from_millis(50)));
        let start = std::time::Instant::now();
        let choice = mcts.select_move(Context::new(&machine, &role, &state), &mut clock).unwrap();
        assert!(choice.is_some());
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
