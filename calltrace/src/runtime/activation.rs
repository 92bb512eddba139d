//! Method activation table
//!
//! One bit per method id, set the first time the method fires under a root.
//! The first caller to set a bit wins the right to ask the instrumentation to
//! expand into that method's callees. Bits only go from 0 to 1; `clear` is the
//! only way back and runs under `reset_all`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::MethodId;

const BITS_PER_WORD: usize = 64;
const WORDS: usize = MethodId::SPACE / BITS_PER_WORD;

/// Instrumentation callback fired on the first invocation of a method.
///
/// Expected to instrument the method's immediate callees. Two threads can
/// race on two different first invocations at once, and a reset makes every
/// method "first" again, so implementations must be idempotent.
pub trait FirstInvokeHandler: Send + Sync {
    fn on_first_invoke(&self, method: MethodId);
}

pub struct MethodActivationTable {
    words: Box<[AtomicU64]>,
}

impl MethodActivationTable {
    #[must_use]
    pub fn new() -> Self {
        Self { words: (0..WORDS).map(|_| AtomicU64::new(0)).collect() }
    }

    /// Returns `true` exactly once per method between clears.
    pub fn mark_invoked_if_first(&self, method: MethodId) -> bool {
        let (word, bit) = Self::locate(method);
        // Cheap read first: almost every call is for an already-active method
        if self.words[word].load(Ordering::Relaxed) & bit != 0 {
            return false;
        }
        self.words[word].fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    #[must_use]
    pub fn is_invoked(&self, method: MethodId) -> bool {
        let (word, bit) = Self::locate(method);
        self.words[word].load(Ordering::Acquire) & bit != 0
    }

    /// Number of methods marked so far
    #[must_use]
    pub fn invoked_count(&self) -> usize {
        self.words.iter().map(|w| w.load(Ordering::Relaxed).count_ones() as usize).sum()
    }

    pub fn clear(&self) {
        for word in &*self.words {
            word.store(0, Ordering::Release);
        }
    }

    fn locate(method: MethodId) -> (usize, u64) {
        let index = method.index();
        (index / BITS_PER_WORD, 1u64 << (index % BITS_PER_WORD))
    }
}

impl Default for MethodActivationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_first_mark_wins() {
        let table = MethodActivationTable::new();
        assert!(table.mark_invoked_if_first(MethodId(7)));
        assert!(!table.mark_invoked_if_first(MethodId(7)));
        assert!(table.is_invoked(MethodId(7)));
        assert!(!table.is_invoked(MethodId(8)));
    }

    #[test]
    fn test_edges_of_id_space() {
        let table = MethodActivationTable::new();
        assert!(table.mark_invoked_if_first(MethodId(0)));
        assert!(table.mark_invoked_if_first(MethodId(u16::MAX)));
        assert_eq!(table.invoked_count(), 2);
    }

    #[test]
    fn test_clear_rearms_every_method() {
        let table = MethodActivationTable::new();
        table.mark_invoked_if_first(MethodId(3));
        table.clear();
        assert_eq!(table.invoked_count(), 0);
        assert!(table.mark_invoked_if_first(MethodId(3)));
    }

    #[test]
    fn test_concurrent_first_invocation_is_unique() {
        let table = MethodActivationTable::new();
        let winners = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for id in 0..512u16 {
                        if table.mark_invoked_if_first(MethodId(id)) {
                            winners.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::Relaxed), 512);
        assert_eq!(table.invoked_count(), 512);
    }
}
