//! Memoization of state-machine queries.
//!
//! [`CachedMachine`] wraps any [`StateMachine`] and remembers terminal
//! checks, goals, legal moves and successors per state. Each table holds at
//! most `2^bits` entries and is flushed wholesale when full.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::ast::Term;
use crate::error::MachineError;
use crate::machine::{PerceptMachine, StateMachine};
use crate::state::{Move, Role, State};

/// A bounded memo table counting hits and misses.
pub struct MemoTable<K, V> {
    map: HashMap<K, V>,
    capacity: usize,
    hits: usize,
    misses: usize,
    flushes: usize,
}

impl<K, V> MemoTable<K, V> {
    /// Creates a table holding at most `2^bits` entries.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bits should be in the range 0..=31");
        Self {
            map: HashMap::new(),
            capacity: 1 << bits,
            hits: 0,
            misses: 0,
            flushes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Number of times the table was flushed for being full.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K: Hash + Eq, V: Clone> MemoTable<K, V> {
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.map.get(key) {
            Some(v) => {
                self.hits += 1;
                Some(v.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.map.len() >= self.capacity {
            self.map.clear();
            self.flushes += 1;
        }
        self.map.insert(key, value);
    }
}

/// Hit and miss counts summed over all tables of a [`CachedMachine`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

struct Tables {
    terminal: MemoTable<State, bool>,
    goal: MemoTable<(State, usize), Result<u8, MachineError>>,
    legal: MemoTable<(State, usize), Vec<Move>>,
    next: MemoTable<(State, Vec<Option<Move>>), State>,
}

impl Tables {
    fn new(bits: usize) -> Self {
        Self {
            terminal: MemoTable::new(bits),
            goal: MemoTable::new(bits),
            legal: MemoTable::new(bits),
            next: MemoTable::new(bits),
        }
    }
}

/// Memoizing wrapper around another state machine.
pub struct CachedMachine<M> {
    inner: M,
    bits: usize,
    tables: RefCell<Tables>,
}

impl<M: StateMachine> CachedMachine<M> {
    pub fn new(inner: M) -> Self {
        Self::with_bits(inner, 16)
    }

    pub fn with_bits(inner: M, bits: usize) -> Self {
        Self {
            inner,
            bits,
            tables: RefCell::new(Tables::new(bits)),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        let t = self.tables.borrow();
        CacheStats {
            hits: t.terminal.hits() + t.goal.hits() + t.legal.hits() + t.next.hits(),
            misses: t.terminal.misses() + t.goal.misses() + t.legal.misses() + t.next.misses(),
        }
    }

    pub fn clear(&self) {
        let mut t = self.tables.borrow_mut();
        t.terminal.clear();
        t.goal.clear();
        t.legal.clear();
        t.next.clear();
    }
}

impl<M: Clone + StateMachine> Clone for CachedMachine<M> {
    /// Clones the wrapped machine with empty tables.
    fn clone(&self) -> Self {
        Self::with_bits(self.inner.clone(), self.bits)
    }
}

impl<M: fmt::Debug> fmt::Debug for CachedMachine<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedMachine")
            .field("inner", &self.inner)
            .field("bits", &self.bits)
            .finish()
    }
}

impl<M: StateMachine> StateMachine for CachedMachine<M> {
    fn roles(&self) -> &[Role] {
        self.inner.roles()
    }

    fn initial_state(&self) -> State {
        self.inner.initial_state()
    }

    fn is_terminal(&self, state: &State) -> bool {
        if let Some(v) = self.tables.borrow_mut().terminal.get(state) {
            return v;
        }
        let v = self.inner.is_terminal(state);
        self.tables.borrow_mut().terminal.insert(state.clone(), v);
        v
    }

    fn goal(&self, state: &State, role: &Role) -> Result<u8, MachineError> {
        let key = (state.clone(), role.index());
        if let Some(v) = self.tables.borrow_mut().goal.get(&key) {
            return v;
        }
        let v = self.inner.goal(state, role);
        self.tables.borrow_mut().goal.insert(key, v.clone());
        v
    }

    fn legal_moves(&self, state: &State, role: &Role) -> Vec<Move> {
        let key = (state.clone(), role.index());
        if let Some(v) = self.tables.borrow_mut().legal.get(&key) {
            return v;
        }
        let v = self.inner.legal_moves(state, role);
        self.tables.borrow_mut().legal.insert(key, v.clone());
        v
    }

    fn moves(&self, role: &Role) -> &[Move] {
        self.inner.moves(role)
    }

    fn next_state(&self, state: &State, joint: &[Option<Move>]) -> Result<State, MachineError> {
        let key = (state.clone(), joint.to_vec());
        if let Some(v) = self.tables.borrow_mut().next.get(&key) {
            return Ok(v);
        }
        let v = self.inner.next_state(state, joint)?;
        self.tables.borrow_mut().next.insert(key, v.clone());
        Ok(v)
    }

    fn state_sentences(&self, state: &State) -> Vec<Term> {
        self.inner.state_sentences(state)
    }

    fn base_index(&self, sentence: &Term) -> Option<usize> {
        self.inner.base_index(sentence)
    }
}

impl<M: PerceptMachine> PerceptMachine for CachedMachine<M> {
    fn percepts(&self, state: &State, role: &Role) -> Vec<Term> {
        self.inner.percepts(state, role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PropnetMachine;
    use crate::games;
    use test_log::test;

    #[test]
    fn test_memo_table_basic() {
        let mut table = MemoTable::<(u64, u64), i32>::new(4);

        table.insert((1, 2), 42);
        table.insert((3, 4), 99);

        assert_eq!(table.get(&(1, 2)), Some(42));
        assert_eq!(table.get(&(3, 4)), Some(99));
        assert_eq!(table.get(&(5, 6)), None);

        assert_eq!(table.hits(), 2);
        assert_eq!(table.misses(), 1);
    }

    #[test]
    fn test_memo_table_flushes_when_full() {
        let mut table = MemoTable::<u64, u64>::new(2);
        for i in 0..4 {
            table.insert(i, i);
        }
        assert_eq!(table.len(), 4);
        assert_eq!(table.flushes(), 0);
        table.insert(4, 4);
        assert_eq!(table.len(), 1);
        assert_eq!(table.flushes(), 1);
        assert_eq!(table.get(&0), None);
        assert_eq!(table.get(&4), Some(4));
    }

    #[test]
    fn test_cached_machine_agrees() {
        let plain = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
        let cached = CachedMachine::new(plain.clone());
        let state = plain.initial_state();
        let x = plain.roles()[0].clone();

        assert_eq!(cached.legal_moves(&state, &x), plain.legal_moves(&state, &x));
        assert_eq!(cached.legal_moves(&state, &x), plain.legal_moves(&state, &x));
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 1 });

        for joint in plain.legal_joint_moves(&state).unwrap() {
            let expected = plain.perform(&state, &joint).unwrap();
            assert_eq!(cached.perform(&state, &joint).unwrap(), expected);
            assert_eq!(cached.perform(&state, &joint).unwrap(), expected);
            assert_eq!(cached.is_terminal(&expected), plain.is_terminal(&expected));
        }
        assert_eq!(cached.stats().hits, 1 + 9);

        cached.clear();
        assert_eq!(cached.legal_moves(&state, &x).len(), 9);
    }
}
