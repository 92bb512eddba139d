//! Admission control: how many threads may ever be registered.
//!
//! Slots are consumed, never returned; only a reset refills them.

use std::sync::atomic::{AtomicU32, Ordering};

pub struct AdmissionController {
    remaining: AtomicU32,
}

impl AdmissionController {
    #[must_use]
    pub fn new(slots: u32) -> Self {
        Self { remaining: AtomicU32::new(slots) }
    }

    /// Take one slot if any is left.
    pub fn try_register(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn reset(&self, slots: u32) {
        self.remaining.store(slots, Ordering::Release);
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_zero_slots_always_denies() {
        let admission = AdmissionController::new(0);
        assert!(!admission.try_register());
        assert_eq!(admission.remaining(), 0);
    }

    #[test]
    fn test_reset_refills() {
        let admission = AdmissionController::new(1);
        assert!(admission.try_register());
        assert!(!admission.try_register());
        admission.reset(2);
        assert!(admission.try_register());
        assert_eq!(admission.remaining(), 1);
    }

    #[test]
    fn test_never_over_admits_under_contention() {
        let admission = AdmissionController::new(5);
        let granted = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    for _ in 0..100 {
                        if admission.try_register() {
                            granted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(granted.load(Ordering::Relaxed), 5);
        assert_eq!(admission.remaining(), 0);
    }
}
