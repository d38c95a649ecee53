//! Baseline strategies.

use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::SearchError;
use crate::machine::StateMachine;
use crate::search::clock::SearchClock;
use crate::search::{Choice, Context, Strategy};

/// Always plays the first legal move.
#[derive(Debug, Default, Clone, Copy)]
pub struct Legal;

impl<M: StateMachine> Strategy<M> for Legal {
    fn name(&self) -> &str {
        "legal"
    }

    fn select_move(&mut self, ctx: Context<'_, M>, _clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
        Ok(ctx.legal_moves().into_iter().next().map(|mv| Choice::new(mv, 0.0)))
    }
}

/// Plays a uniformly random legal move.
#[derive(Debug, Clone)]
pub struct Random {
    rng: ChaCha8Rng,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl<M: StateMachine> Strategy<M> for Random {
    fn name(&self) -> &str {
        "random"
    }

    fn select_move(&mut self, ctx: Context<'_, M>, _clock: &mut SearchClock) -> Result<Option<Choice>, SearchError> {
        let moves = ctx.legal_moves();
        Ok(moves.choose(&mut self.rng).cloned().map(|mv| Choice::new(mv, 0.0)))
    }
}
