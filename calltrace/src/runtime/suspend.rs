//! Suspend barrier
//!
//! A process-wide flag every hook reads before touching thread state, plus the
//! list of thread slots whose guard was bumped by the suspension. Resuming
//! releases exactly those bumps, so threads registered in between (or a resume
//! without a suspend) can never push a guard below zero.
//!
//! Each suspension also advances an epoch. A hook notes the epoch it started
//! in; the flag is raised before the epoch moves, so a hook that sees the new
//! epoch also sees the flag and backs off.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::thread_state::ThreadState;
use crate::domain::ControlError;

#[derive(Default)]
pub struct SuspendBarrier {
    suspended: AtomicBool,
    /// Suspensions so far
    epoch: AtomicU64,
    bumped: Mutex<Vec<Arc<ThreadState>>>,
}

impl SuspendBarrier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hot-path check
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Epoch a hook starting now runs in, `None` while suspended
    #[must_use]
    pub fn running_epoch(&self) -> Option<u64> {
        let epoch = self.epoch.load(Ordering::Acquire);
        (!self.is_suspended()).then_some(epoch)
    }

    /// Raise the flag, advance the epoch, bump every given thread's guard,
    /// then run `after` with the new epoch (used to seal the buffer) before
    /// anyone can resume.
    ///
    /// # Errors
    ///
    /// [`ControlError::AlreadySuspended`] if the barrier is already up; nothing changes.
    pub fn suspend(
        &self,
        threads: Vec<Arc<ThreadState>>,
        after: impl FnOnce(u64),
    ) -> Result<(), ControlError> {
        let mut bumped = self.lock();
        if self.is_suspended() {
            return Err(ControlError::AlreadySuspended);
        }

        self.suspended.store(true, Ordering::Release);
        let epoch = self.epoch.fetch_add(1, Ordering::Release) + 1;
        for thread in &threads {
            thread.bump_guard();
        }
        *bumped = threads;
        after(epoch);
        Ok(())
    }

    /// Run `before` (used to unseal the buffer), release the guard bumps and
    /// lower the flag.
    ///
    /// # Errors
    ///
    /// [`ControlError::NotSuspended`] without a matching suspend; nothing changes.
    pub fn resume(&self, before: impl FnOnce()) -> Result<(), ControlError> {
        let mut bumped = self.lock();
        if !self.is_suspended() {
            return Err(ControlError::NotSuspended);
        }

        before();
        for thread in bumped.drain(..) {
            thread.release_guard();
        }
        self.suspended.store(false, Ordering::Release);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<ThreadState>>> {
        self.bumped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ThreadNo;

    #[test]
    fn test_suspend_bumps_and_resume_releases() {
        let barrier = SuspendBarrier::new();
        let thread = Arc::new(ThreadState::new(ThreadNo(1), None));

        barrier.suspend(vec![Arc::clone(&thread)], |_| {}).unwrap();
        assert!(barrier.is_suspended());
        assert_eq!(thread.snapshot().guard, 1);

        barrier.resume(|| {}).unwrap();
        assert!(!barrier.is_suspended());
        assert_eq!(thread.snapshot().guard, 0);
    }

    #[test]
    fn test_resume_without_suspend_is_rejected() {
        let barrier = SuspendBarrier::new();
        let mut ran = false;
        assert_eq!(barrier.resume(|| ran = true), Err(ControlError::NotSuspended));
        assert!(!ran);
        assert!(!barrier.is_suspended());
    }

    #[test]
    fn test_double_suspend_is_rejected() {
        let barrier = SuspendBarrier::new();
        let thread = Arc::new(ThreadState::new(ThreadNo(1), None));

        barrier.suspend(vec![Arc::clone(&thread)], |_| {}).unwrap();
        let second = barrier.suspend(vec![Arc::clone(&thread)], |_| {});
        assert_eq!(second, Err(ControlError::AlreadySuspended));
        assert_eq!(thread.snapshot().guard, 1);

        barrier.resume(|| {}).unwrap();
        assert_eq!(thread.snapshot().guard, 0);
    }

    #[test]
    fn test_threads_not_bumped_are_not_released() {
        let barrier = SuspendBarrier::new();
        let late = Arc::new(ThreadState::new(ThreadNo(2), None));

        barrier.suspend(Vec::new(), |_| {}).unwrap();
        barrier.resume(|| {}).unwrap();
        assert_eq!(late.snapshot().guard, 0);
    }

    #[test]
    fn test_each_suspension_advances_epoch() {
        let barrier = SuspendBarrier::new();
        assert_eq!(barrier.running_epoch(), Some(0));

        let mut sealed_at = 0;
        barrier.suspend(Vec::new(), |epoch| sealed_at = epoch).unwrap();
        assert_eq!(sealed_at, 1);
        assert_eq!(barrier.running_epoch(), None);

        barrier.resume(|| {}).unwrap();
        assert_eq!(barrier.running_epoch(), Some(1));
    }
}
