//! Lock-free bookkeeping of which pool workers are busy.

use std::sync::atomic::{AtomicU64, Ordering};

/// A fixed set of worker slots, each either free or claimed.
///
/// Slot `i` lives in word `i / 64`, bit `i % 64`. Claiming is best-effort: under
/// contention [`try_claim`](Self::try_claim) may fail even though a slot is free, and
/// the caller is expected to fall back to running the work itself.
pub(crate) struct WorkerSlots {
    words: Vec<AtomicU64>,
    len: usize,
}

impl WorkerSlots {
    pub fn new(len: usize) -> WorkerSlots {
        WorkerSlots {
            words: (0..len.div_ceil(64)).map(|_| AtomicU64::new(0)).collect(),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Claims a free slot and returns its index.
    pub fn try_claim(&self) -> Option<usize> {
        for (word_index, word) in self.words.iter().enumerate() {
            let valid = self.valid_mask(word_index);
            let mut current = word.load(Ordering::Relaxed);
            loop {
                let free = !current & valid;
                if free == 0 {
                    break;
                }
                let bit = free.trailing_zeros();
                match word.compare_exchange_weak(
                    current,
                    current | (1 << bit),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Some(word_index * 64 + bit as usize),
                    Err(actual) => current = actual,
                }
            }
        }
        None
    }

    pub fn is_claimed(&self, index: usize) -> bool {
        assert!(index < self.len);
        self.words[index / 64].load(Ordering::SeqCst) & (1 << (index % 64)) != 0
    }

    pub fn release(&self, index: usize) {
        assert!(index < self.len);
        self.words[index / 64].fetch_and(!(1 << (index % 64)), Ordering::SeqCst);
    }

    fn valid_mask(&self, word_index: usize) -> u64 {
        let remaining = self.len - word_index * 64;
        if remaining >= 64 {
            u64::MAX
        } else {
            (1u64 << remaining) - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::WorkerSlots;

    #[test]
    fn test_claim_all_then_release() {
        let slots = WorkerSlots::new(70);
        let claimed = (0..70)
            .map(|_| slots.try_claim().unwrap())
            .collect::<HashSet<_>>();
        assert_eq!(claimed.len(), 70);
        assert!(claimed.iter().all(|&i| i < 70));
        assert_eq!(slots.try_claim(), None);

        slots.release(65);
        assert!(!slots.is_claimed(65));
        assert_eq!(slots.try_claim(), Some(65));
        assert!(slots.is_claimed(65));
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let slots = WorkerSlots::new(128);
        let claimed = std::thread::scope(|s| {
            let handles = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..16)
                            .filter_map(|_| slots.try_claim())
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        let unique = claimed.iter().copied().collect::<HashSet<_>>();
        assert_eq!(unique.len(), claimed.len());
        assert_eq!(claimed.len(), 128);
    }
}
