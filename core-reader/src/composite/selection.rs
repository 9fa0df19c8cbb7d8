//! Source selection policies for array-backed composites.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::config::ReaderConfig;

/// How the next source of an array is chosen.
#[derive(Debug, Clone)]
pub enum SelectionPolicy {
    /// Each source once, in order.
    SequenceOnce,
    /// In order, wrapping to the first source.
    SequenceLoop,
    /// Uniformly random, repeats allowed.
    Random,
    /// Uniformly random, never the same source twice in a row.
    RandomNoRepeat,
    /// Whatever index the caller stored; out of range means exhausted.
    IndexRef(Arc<AtomicI64>),
}

impl SelectionPolicy {
    /// Policies that support rewinding to the first source.
    pub fn is_sequence(&self) -> bool {
        matches!(self, SelectionPolicy::SequenceOnce | SelectionPolicy::SequenceLoop)
    }
}

/// A [`SelectionPolicy`] plus the index and random source it advances.
pub struct Selector {
    policy: SelectionPolicy,
    rng: Box<dyn RngCore + Send>,
    index: i64,
}

impl Selector {
    pub fn new(policy: SelectionPolicy, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            policy,
            rng,
            index: -1,
        }
    }

    /// Seeds from `config.random_seed`, or from OS entropy when unset.
    pub fn from_config(policy: SelectionPolicy, config: &ReaderConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(policy, Box::new(rng))
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Last selected index, `-1` before the first selection.
    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn set_index(&mut self, index: i64) {
        self.index = index;
    }

    /// Advances and returns the selected index, or `None` when the policy
    /// has nothing left among `len` sources.
    pub fn next_index(&mut self, len: usize) -> Option<usize> {
        let len_i = len as i64;

        self.index = match &self.policy {
            SelectionPolicy::SequenceOnce => {
                let next = self.index + 1;
                if (0..len_i).contains(&next) {
                    next
                } else {
                    len_i
                }
            }
            SelectionPolicy::SequenceLoop => {
                let next = self.index + 1;
                if (0..len_i).contains(&next) {
                    next
                } else {
                    0
                }
            }
            SelectionPolicy::Random if len > 0 => self.rng.random_range(0..len_i),
            SelectionPolicy::Random => len_i,
            SelectionPolicy::RandomNoRepeat if len < 2 => 0,
            SelectionPolicy::RandomNoRepeat => {
                let mut next = self.index;
                while next == self.index {
                    next = self.rng.random_range(0..len_i);
                }
                next
            }
            SelectionPolicy::IndexRef(shared) => {
                let next = shared.load(Ordering::Acquire);
                if (0..len_i).contains(&next) {
                    next
                } else {
                    len_i
                }
            }
        };

        usize::try_from(self.index).ok().filter(|&index| index < len)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("policy", &self.policy)
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(policy: SelectionPolicy) -> Selector {
        Selector::new(policy, Box::new(StdRng::seed_from_u64(7)))
    }

    #[test]
    fn test_sequence_once_exhausts() {
        let mut sel = selector(SelectionPolicy::SequenceOnce);
        let picks: Vec<_> = (0..5).map(|_| sel.next_index(3)).collect();
        assert_eq!(picks, vec![Some(0), Some(1), Some(2), None, None]);
    }

    #[test]
    fn test_sequence_loop_wraps() {
        let mut sel = selector(SelectionPolicy::SequenceLoop);
        let picks: Vec<_> = (0..5).map(|_| sel.next_index(2)).collect();
        assert_eq!(picks, vec![Some(0), Some(1), Some(0), Some(1), Some(0)]);
        assert_eq!(sel.next_index(0), None);
    }

    #[test]
    fn test_random_no_repeat() {
        let mut sel = selector(SelectionPolicy::RandomNoRepeat);
        let mut last = sel.next_index(4).unwrap();
        for _ in 0..50 {
            let next = sel.next_index(4).unwrap();
            assert_ne!(next, last);
            last = next;
        }

        let mut single = selector(SelectionPolicy::RandomNoRepeat);
        assert_eq!(single.next_index(1), Some(0));
        assert_eq!(single.next_index(1), Some(0));
    }

    #[test]
    fn test_random_in_range() {
        let mut sel = selector(SelectionPolicy::Random);
        for _ in 0..50 {
            assert!(sel.next_index(3).unwrap() < 3);
        }
        assert_eq!(sel.next_index(0), None);
    }

    #[test]
    fn test_index_ref_follows_shared_value() {
        let shared = Arc::new(AtomicI64::new(2));
        let mut sel = selector(SelectionPolicy::IndexRef(shared.clone()));
        assert_eq!(sel.next_index(3), Some(2));

        shared.store(0, Ordering::Release);
        assert_eq!(sel.next_index(3), Some(0));

        shared.store(-1, Ordering::Release);
        assert_eq!(sel.next_index(3), None);
        shared.store(3, Ordering::Release);
        assert_eq!(sel.next_index(3), None);
    }

    #[test]
    fn test_seeded_selectors_agree() {
        let config = ReaderConfig::default().with_random_seed(42);
        let mut a = Selector::from_config(SelectionPolicy::Random, &config);
        let mut b = Selector::from_config(SelectionPolicy::Random, &config);
        for _ in 0..10 {
            assert_eq!(a.next_index(10), b.next_index(10));
        }
    }
}
