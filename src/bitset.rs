//! Compact bit set used for game states and node masks.
//!
//! A [`BitSet`] over the base-proposition index is the representation of a
//! [`State`][crate::state::State]; the same type marks state nodes in a
//! propnet and collects input propositions during factoring.

use std::hash::{Hash, Hasher};

/// A bit set backed by a vector of u64 words.
///
/// Equality and hashing depend only on which bits are set, never on the
/// allocated capacity, so two sets built over the same universe with
/// different capacities compare equal.
#[derive(Debug, Clone, Default)]
pub struct BitSet {
    words: Vec<u64>,
    count: usize,
}

const WORD: usize = u64::BITS as usize;

#[inline]
fn locate(index: usize) -> (usize, u64) {
    (index / WORD, 1 << (index % WORD))
}

impl BitSet {
    /// An empty set sized for indices below `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD)],
            count: 0,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of members.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        let (slot, mask) = locate(index);
        self.words.get(slot).is_some_and(|w| w & mask != 0)
    }

    /// Adds `index`; `false` if it was already a member.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        let (slot, mask) = locate(index);
        if slot >= self.words.len() {
            self.words.resize(slot + 1, 0);
        }
        let word = &mut self.words[slot];
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        self.count += 1;
        true
    }

    /// Drops `index`; `false` if it was not a member.
    #[inline]
    pub fn remove(&mut self, index: usize) -> bool {
        let (slot, mask) = locate(index);
        match self.words.get_mut(slot) {
            Some(word) if *word & mask != 0 => {
                *word &= !mask;
                self.count -= 1;
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        if value {
            self.insert(index);
        } else {
            self.remove(index);
        }
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
        self.count = 0;
    }

    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    pub fn is_subset(&self, other: &BitSet) -> bool {
        self.words.iter().enumerate().all(|(i, &a)| a & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
        self.count = self.words.iter().map(|w| w.count_ones() as usize).sum();
    }

    /// Members in increasing order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            words: self.words.iter(),
            base: 0,
            pending: 0,
        }
    }

    fn significant_words(&self) -> &[u64] {
        let end = self.words.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
        &self.words[..end]
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.significant_words() == other.significant_words()
    }
}

impl Eq for BitSet {}

impl Hash for BitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_words().hash(state);
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::empty();
        set.extend(iter);
        set
    }
}

impl Extend<usize> for BitSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for index in iter {
            self.insert(index);
        }
    }
}

pub struct BitSetIter<'a> {
    words: std::slice::Iter<'a, u64>,
    /// Index of bit 0 of `pending`.
    base: usize,
    pending: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.pending == 0 {
            self.pending = *self.words.next()?;
            self.base += WORD;
        }
        let offset = self.pending.trailing_zeros() as usize;
        self.pending &= self.pending - 1;
        Some(self.base - WORD + offset)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use test_log::test;

    #[test]
    fn test_insert_remove() {
        let mut bs = BitSet::new(100);
        assert!(bs.insert(42));
        assert!(!bs.insert(42));
        assert!(bs.contains(42));
        assert!(bs.remove(42));
        assert!(!bs.remove(42));
        assert!(bs.is_empty());
        assert!(!bs.contains(1000));
    }

    #[test]
    fn test_iter_across_words() {
        let bs: BitSet = [5, 10, 3, 64, 65].into_iter().collect();
        assert_eq!(bs.iter().collect::<Vec<_>>(), vec![3, 5, 10, 64, 65]);
        assert_eq!(bs.len(), 5);
    }

    #[test]
    fn test_equality_ignores_capacity() {
        let mut a = BitSet::new(256);
        let mut b = BitSet::empty();
        a.insert(7);
        b.insert(7);
        assert_eq!(a, b);

        let set: HashSet<BitSet> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_set_algebra() {
        let a: BitSet = [1, 2, 70].into_iter().collect();
        let b: BitSet = [70, 80].into_iter().collect();
        let c: BitSet = [3].into_iter().collect();
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let mut u = a.clone();
        u.union_with(&b);
        assert_eq!(u.iter().collect::<Vec<_>>(), vec![1, 2, 70, 80]);
        assert!(a.is_subset(&u));
        assert!(!u.is_subset(&a));
    }

    #[test]
    fn test_clear() {
        let mut bs: BitSet = [1, 50, 99].into_iter().collect();
        bs.clear();
        assert!(bs.is_empty());
        assert!(!bs.contains(50));
    }
}
