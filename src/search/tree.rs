//! Arena-allocated search tree for hybrid Monte Carlo tree search.
//!
//! Each node stores its state, one move list per role and a slot per joint
//! move combination. The combination index puts the player's move first:
//!
//! ```text
//! combo = player_index + n_player * (opponent indices, mixed radix, role order)
//! ```
//!
//! so the children answering player move `i` are `i, i + n_player, ...`.
//! The player's list is sorted by text with the null move last.
//!
//! Selection is paranoid: for every player move the opponents are assumed
//! to answer with the combination that looks worst for the player, and the
//! player picks the move whose worst answer looks best.
//!
//! A sample runs in three steps so that the playout can happen outside any
//! lock: [`begin_sample`][GameTree::begin_sample] selects and expands,
//! [`PendingSample::resolve`] plays out, and
//! [`finish_sample`][GameTree::finish_sample] backpropagates. A begun
//! sample already counts as a visit along its path, with zero utility,
//! until it is finished or abandoned.

use std::fmt;

use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{MachineError, SearchError};
use crate::factor::Subgame;
use crate::machine::StateMachine;
use crate::state::{Move, State};

struct TreeNode {
    state: State,
    terminal: bool,
    /// Player's goal, meaningful for terminal nodes.
    goal: u8,
    moves: Vec<Vec<Option<Move>>>,
    children: Vec<Option<usize>>,
    visits: u64,
    utility: u64,
}

impl TreeNode {
    /// Terminal goal, or the mean sampled utility.
    fn score(&self) -> f64 {
        if self.terminal {
            f64::from(self.goal)
        } else if self.visits == 0 {
            0.0
        } else {
            self.utility as f64 / self.visits as f64
        }
    }

    /// Has an exact or sampled value.
    fn is_scored(&self) -> bool {
        self.terminal || self.visits > 0
    }
}

/// Goal of role `player` in `state`, 0 when the rules give none.
fn player_goal<M: StateMachine>(machine: &M, state: &State, player: usize) -> u8 {
    let role = &machine.roles()[player];
    machine.goal(state, role).unwrap_or_else(|e| {
        warn!("goal of {} unavailable, scoring 0: {}", role, e);
        0
    })
}

/// A sample between selection and backpropagation.
///
/// Must be finished or abandoned on the tree that began it before that
/// tree is advanced.
#[derive(Debug)]
pub struct PendingSample {
    path: Vec<usize>,
    player: usize,
    /// Known goal of a terminal leaf.
    goal: Option<u8>,
    state: State,
}

impl PendingSample {
    /// State the playout starts from.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Goal of the leaf, from a random playout unless the leaf is terminal.
    ///
    /// `stop` is asked before every playout step; `None` means it gave up.
    pub fn resolve<M, R, F>(&self, machine: &M, rng: &mut R, stop: F) -> Result<Option<u8>, SearchError>
    where
        M: StateMachine,
        R: Rng + ?Sized,
        F: FnMut() -> bool,
    {
        if let Some(goal) = self.goal {
            return Ok(Some(goal));
        }
        let last = machine.depth_charge_until(&self.state, rng, stop)?;
        Ok(last.map(|(last, _)| player_goal(machine, &last, self.player)))
    }
}

pub struct GameTree {
    nodes: Vec<TreeNode>,
    root: usize,
    player: usize,
    /// Subgame a restricted tree plays in; `None` for the full game.
    subgame: Option<Subgame>,
    exploration: f64,
    opponent_cap: f64,
    rng: ChaCha8Rng,
    samples: u64,
}

impl GameTree {
    /// Tree over the whole game rooted at `state`, searching for role `player`.
    pub fn new<M: StateMachine>(machine: &M, state: State, player: usize, seed: u64) -> Self {
        Self::build(machine, state, player, None, seed)
    }

    /// Tree restricted to the moves of one subgame; every role may also
    /// play the null move.
    pub fn for_subgame<M: StateMachine>(machine: &M, state: State, player: usize, subgame: &Subgame, seed: u64) -> Self {
        Self::build(machine, state, player, Some(subgame.clone()), seed)
    }

    fn build<M: StateMachine>(
        machine: &M,
        state: State,
        player: usize,
        subgame: Option<Subgame>,
        seed: u64,
    ) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: 0,
            player,
            subgame,
            exploration: 45.0,
            opponent_cap: 2.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            samples: 0,
        };
        let root = tree.make_node(machine, state);
        tree.nodes.push(root);
        tree
    }

    /// Sets the exploration constant (divided by the player's move count)
    /// and its cap for opponent nodes.
    pub fn with_exploration(mut self, exploration: f64, opponent_cap: f64) -> Self {
        self.exploration = exploration;
        self.opponent_cap = opponent_cap;
        self
    }

    pub fn player(&self) -> usize {
        self.player
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_state(&self) -> &State {
        &self.nodes[self.root].state
    }

    pub fn root_visits(&self) -> u64 {
        self.nodes[self.root].visits
    }

    pub fn is_root_terminal(&self) -> bool {
        self.nodes[self.root].terminal
    }

    /// Player moves available at the root, null last.
    pub fn root_moves(&self) -> &[Option<Move>] {
        self.nodes[self.root].moves.get(self.player).map_or(&[], Vec::as_slice)
    }

    /// Number of completed samples since creation.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    fn make_node<M: StateMachine>(&self, machine: &M, state: State) -> TreeNode {
        let mut node = TreeNode {
            state,
            terminal: true,
            goal: 0,
            moves: Vec::new(),
            children: Vec::new(),
            visits: 0,
            utility: 0,
        };
        if !machine.is_terminal(&node.state) {
            let mut moves = Vec::with_capacity(machine.roles().len());
            for (index, role) in machine.roles().iter().enumerate() {
                let legal = machine.legal_moves(&node.state, role);
                let mut list: Vec<Option<Move>> = match &self.subgame {
                    Some(subgame) => {
                        let mut list: Vec<Option<Move>> = legal
                            .into_iter()
                            .filter(|mv| subgame.contains(index, mv))
                            .map(Some)
                            .collect();
                        list.push(None);
                        list
                    }
                    None => legal.into_iter().map(Some).collect(),
                };
                if index == self.player {
                    list.sort_by_cached_key(|mv| match mv {
                        Some(mv) => (false, mv.to_string()),
                        None => (true, String::new()),
                    });
                }
                moves.push(list);
            }
            let combos: usize = moves.iter().map(Vec::len).product();
            if combos > 0 {
                node.terminal = false;
                node.moves = moves;
                node.children = vec![None; combos];
                return node;
            }
            warn!("non-terminal state without a legal joint move, treating it as terminal");
        }
        node.goal = player_goal(machine, &node.state, self.player);
        node
    }

    /// Joint move of combination `combo` at `node`.
    fn joint_of(&self, node: usize, combo: usize) -> Vec<Option<Move>> {
        let moves = &self.nodes[node].moves;
        let n_player = moves[self.player].len();
        let mut joint = vec![None; moves.len()];
        joint[self.player] = moves[self.player][combo % n_player].clone();
        let mut radix = n_player;
        for (role, list) in moves.iter().enumerate() {
            if role == self.player {
                continue;
            }
            joint[role] = list[(combo / radix) % list.len()].clone();
            radix *= list.len();
        }
        joint
    }

    /// Inverse of [`joint_of`][GameTree::joint_of].
    fn combo_of(&self, node: usize, joint: &[Option<Move>]) -> Option<usize> {
        let moves = &self.nodes[node].moves;
        let mut combo = moves[self.player].iter().position(|m| m == &joint[self.player])?;
        let mut radix = moves[self.player].len();
        for (role, list) in moves.iter().enumerate() {
            if role == self.player {
                continue;
            }
            combo += list.iter().position(|m| m == &joint[role])? * radix;
            radix *= list.len();
        }
        Some(combo)
    }

    /// Maps a played joint move onto the root's move lists; a subgame tree
    /// sees moves outside its subgame as null.
    fn project<M: StateMachine>(&self, machine: &M, joint: &[Move]) -> Result<Vec<Option<Move>>, MachineError> {
        let moves = &self.nodes[self.root].moves;
        if joint.len() != moves.len() {
            return Err(MachineError::JointMoveArity {
                expected: moves.len(),
                got: joint.len(),
            });
        }
        let projected = match &self.subgame {
            Some(subgame) => subgame.project(joint),
            None => joint.iter().cloned().map(Some).collect(),
        };
        for (role, (mv, list)) in projected.iter().zip(moves).enumerate() {
            if !list.contains(mv) {
                return Err(MachineError::UnknownMove {
                    role: machine.roles()[role].to_string(),
                    mv: joint[role].to_string(),
                });
            }
        }
        Ok(projected)
    }

    fn create_child<M: StateMachine>(&mut self, machine: &M, parent: usize, combo: usize) -> Result<usize, SearchError> {
        let joint = self.joint_of(parent, combo);
        let state = machine.next_state(&self.nodes[parent].state, &joint)?;
        let node = self.make_node(machine, state);
        let id = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children[combo] = Some(id);
        Ok(id)
    }

    fn opponent_value(&self, child: &TreeNode, parent_visits: u64, n_player: usize) -> f64 {
        if child.visits == 0 {
            return f64::NEG_INFINITY;
        }
        let c = self.opponent_cap.min(self.exploration / n_player as f64);
        child.score() / 100.0 - (c * (parent_visits as f64).ln() / child.visits as f64).sqrt()
    }

    fn player_value(&self, child: &TreeNode, parent_visits: u64, n_player: usize) -> f64 {
        if child.visits == 0 {
            return f64::INFINITY;
        }
        let c = self.exploration / n_player as f64;
        child.score() / 100.0 + (c * (parent_visits as f64).ln() / child.visits as f64).sqrt()
    }

    /// Path from the root to the node to simulate from.
    fn select<M: StateMachine>(&mut self, machine: &M) -> Result<Vec<usize>, SearchError> {
        let mut path = vec![self.root];
        let mut id = self.root;
        loop {
            let node = &self.nodes[id];
            if node.terminal {
                return Ok(path);
            }
            if let Some(combo) = node.children.iter().position(Option::is_none) {
                let child = self.create_child(machine, id, combo)?;
                path.push(child);
                return Ok(path);
            }

            let n_player = node.moves[self.player].len();
            let parent_visits = node.visits;
            let mut best: Option<(f64, usize)> = None;
            for (i, mv) in node.moves[self.player].iter().enumerate() {
                if mv.is_none() && n_player > 1 {
                    continue;
                }
                let mut worst: Option<(f64, usize)> = None;
                for slot in node.children.iter().skip(i).step_by(n_player) {
                    let Some(child) = *slot else { continue };
                    let value = self.opponent_value(&self.nodes[child], parent_visits, n_player);
                    if worst.map_or(true, |(w, _)| value < w) {
                        worst = Some((value, child));
                    }
                }
                let Some((_, child)) = worst else { continue };
                let value = self.player_value(&self.nodes[child], parent_visits, n_player);
                if best.map_or(true, |(b, _)| value > b) {
                    best = Some((value, child));
                }
            }
            match best {
                Some((_, child)) => {
                    id = child;
                    path.push(id);
                }
                None => return Ok(path),
            }
        }
    }

    /// Selects and expands a leaf, counting a visit along the path.
    pub fn begin_sample<M: StateMachine>(&mut self, machine: &M) -> Result<PendingSample, SearchError> {
        let path = self.select(machine)?;
        for &id in &path {
            self.nodes[id].visits += 1;
        }
        let leaf = &self.nodes[path[path.len() - 1]];
        Ok(PendingSample {
            player: self.player,
            goal: leaf.terminal.then_some(leaf.goal),
            state: leaf.state.clone(),
            path,
        })
    }

    /// Backpropagates the sampled `goal`.
    pub fn finish_sample(&mut self, pending: PendingSample, goal: u8) {
        for &id in &pending.path {
            self.nodes[id].utility += u64::from(goal);
        }
        self.samples += 1;
    }

    /// Takes back the visits of a sample that was never played out.
    pub fn abandon_sample(&mut self, pending: PendingSample) {
        for &id in &pending.path {
            let node = &mut self.nodes[id];
            node.visits = node.visits.saturating_sub(1);
        }
    }

    /// One full sample; returns the sampled goal.
    pub fn run_sample<M: StateMachine>(&mut self, machine: &M) -> Result<u8, SearchError> {
        let pending = self.begin_sample(machine)?;
        let goal = match pending.goal {
            Some(goal) => Ok(goal),
            None => machine
                .depth_charge(&pending.state, &mut self.rng)
                .map(|(last, _)| player_goal(machine, &last, self.player)),
        };
        match goal {
            Ok(goal) => {
                self.finish_sample(pending, goal);
                Ok(goal)
            }
            Err(e) => {
                self.abandon_sample(pending);
                Err(e.into())
            }
        }
    }

    /// One sample whose playout gives up once `stop` returns `true`; the
    /// visits of a sample given up are taken back and it yields `None`.
    pub fn run_sample_until<M, F>(&mut self, machine: &M, stop: F) -> Result<Option<u8>, SearchError>
    where
        M: StateMachine,
        F: FnMut() -> bool,
    {
        let pending = self.begin_sample(machine)?;
        let goal = match pending.resolve(machine, &mut self.rng, stop) {
            Ok(goal) => goal,
            Err(e) => {
                self.abandon_sample(pending);
                return Err(e);
            }
        };
        match goal {
            Some(goal) => self.finish_sample(pending, goal),
            None => self.abandon_sample(pending),
        }
        Ok(goal)
    }

    /// Depth-one paranoid minimax over the root children's scores.
    ///
    /// Returns the player's move (null only when nothing else was scored)
    /// with its worst-case score, or `None` at a terminal root.
    pub fn best_move(&self) -> Option<(Option<Move>, f64)> {
        let root = &self.nodes[self.root];
        if root.terminal {
            return None;
        }
        let player_moves = &root.moves[self.player];
        let n_player = player_moves.len();
        let mut alpha = f64::NEG_INFINITY;
        let beta = f64::INFINITY;
        let mut best: Option<(Move, f64)> = None;
        let mut null_score = None;
        for (i, mv) in player_moves.iter().enumerate() {
            if mv.is_none() && n_player > 1 {
                continue;
            }
            let mut worst: Option<f64> = None;
            let mut min_beta = beta;
            for slot in root.children.iter().skip(i).step_by(n_player) {
                let Some(child) = *slot else { continue };
                if !self.nodes[child].is_scored() {
                    continue;
                }
                let score = self.nodes[child].score();
                worst = Some(worst.map_or(score, |w| w.min(score)));
                min_beta = min_beta.min(score);
                if alpha >= min_beta {
                    break;
                }
            }
            let Some(worst) = worst else { continue };
            match mv {
                Some(mv) => {
                    if best.as_ref().map_or(true, |(_, b)| worst > *b) {
                        best = Some((mv.clone(), worst));
                        alpha = alpha.max(worst);
                    }
                    if alpha >= beta {
                        break;
                    }
                }
                None => null_score = Some(worst),
            }
        }
        match (best, null_score) {
            (Some((mv, score)), _) => Some((Some(mv), score)),
            (None, Some(score)) => Some((None, score)),
            (None, None) => player_moves.first().map(|mv| (mv.clone(), 0.0)),
        }
    }

    /// Worst-case score of every player move with at least one sampled answer.
    pub fn move_scores(&self) -> Vec<(Move, f64)> {
        let root = &self.nodes[self.root];
        if root.terminal {
            return Vec::new();
        }
        let n_player = root.moves[self.player].len();
        root.moves[self.player]
            .iter()
            .enumerate()
            .filter_map(|(i, mv)| {
                let mv = mv.as_ref()?;
                let worst = root
                    .children
                    .iter()
                    .skip(i)
                    .step_by(n_player)
                    .flatten()
                    .map(|&child| &self.nodes[child])
                    .filter(|child| child.is_scored())
                    .map(TreeNode::score)
                    .reduce(f64::min)?;
                Some((mv.clone(), worst))
            })
            .collect()
    }

    /// Moves the root to the child holding `state`, creating children as
    /// needed. Returns `false` when no child matches.
    pub fn advance_to_state<M: StateMachine>(&mut self, machine: &M, state: &State) -> Result<bool, SearchError> {
        let root = self.root;
        if &self.nodes[root].state == state {
            return Ok(true);
        }
        let existing = self.nodes[root]
            .children
            .iter()
            .flatten()
            .copied()
            .find(|&child| &self.nodes[child].state == state);
        if let Some(child) = existing {
            self.reroot(child);
            return Ok(true);
        }
        for combo in 0..self.nodes[root].children.len() {
            if self.nodes[root].children[combo].is_some() {
                continue;
            }
            let child = self.create_child(machine, root, combo)?;
            if &self.nodes[child].state == state {
                self.reroot(child);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Moves the root along a played joint move.
    pub fn advance_by_moves<M: StateMachine>(&mut self, machine: &M, joint: &[Move]) -> Result<(), SearchError> {
        let root = self.root;
        if self.nodes[root].terminal {
            debug!("advance_by_moves: root is terminal, nothing to advance");
            return Ok(());
        }
        let projected = self.project(machine, joint)?;
        let combo = self.combo_of(root, &projected).ok_or_else(|| MachineError::UnknownMove {
            role: machine.roles()[self.player].to_string(),
            mv: joint[self.player].to_string(),
        })?;
        let child = match self.nodes[root].children[combo] {
            Some(child) => child,
            None => self.create_child(machine, root, combo)?,
        };
        self.reroot(child);
        Ok(())
    }

    /// Makes `new_root` the root and drops every node not below it.
    fn reroot(&mut self, new_root: usize) {
        let before = self.nodes.len();
        let mut remap: Vec<Option<usize>> = vec![None; before];
        remap[new_root] = Some(0);
        let mut order = vec![new_root];
        let mut i = 0;
        while i < order.len() {
            let id = order[i];
            for &child in self.nodes[id].children.iter().flatten() {
                if remap[child].is_none() {
                    remap[child] = Some(order.len());
                    order.push(child);
                }
            }
            i += 1;
        }

        let mut old: Vec<Option<TreeNode>> = std::mem::take(&mut self.nodes).into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(order.len());
        for &id in &order {
            if let Some(mut node) = old[id].take() {
                for slot in node.children.iter_mut() {
                    *slot = slot.and_then(|child| remap[child]);
                }
                nodes.push(node);
            }
        }
        self.nodes = nodes;
        self.root = 0;
        debug!("reroot: kept {} of {} nodes", self.nodes.len(), before);
    }
}

impl fmt::Debug for GameTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameTree")
            .field("nodes", &self.nodes.len())
            .field("player", &self.player)
            .field("restricted", &self.subgame.is_some())
            .field("root_visits", &self.root_visits())
            .field("samples", &self.samples)
            .finish()
    }
}
