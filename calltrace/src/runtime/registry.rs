//! Thread registry
//!
//! Explicit map from OS thread identity to [`ThreadState`], owned by the
//! tracer. Hooks look up their own slot on every call, so the answer is cached
//! in a thread-local keyed by (registry, generation): after the first lookup a
//! thread touches no lock at all. `clear` bumps the generation, which turns
//! every cached answer stale at once.
//!
//! Thread-locality: a thread only ever registers itself, so a cached
//! "unregistered" answer stays true until that thread registers or the
//! registry is cleared.
//!
//! Refusals live only in the thread-local cache; the shared map holds
//! admitted and internal threads, so threads that come and go without a slot
//! leave nothing behind. A thread whose cached refusal was evicted simply
//! asks again, and admission refuses again until the next reset.

use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use super::admission::AdmissionController;
use super::thread_state::ThreadState;
use crate::domain::ThreadNo;

/// Distinguishes registries (one per tracer) in the shared thread-local cache.
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// What the registry knows about the calling thread
#[derive(Debug, Clone)]
pub enum Membership {
    Registered(Arc<ThreadState>),
    /// Never asked for admission
    Unregistered,
    /// Asked and refused; stays refused until the registry is cleared
    Denied,
}

struct CachedMembership {
    registry: u64,
    generation: u64,
    membership: Membership,
}

thread_local! {
    static CACHE: RefCell<Option<CachedMembership>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct Slots {
    threads: HashMap<ThreadId, Arc<ThreadState>>,
    internal: HashSet<ThreadId>,
}

pub struct ThreadRegistry {
    id: u64,
    generation: AtomicU64,
    next_thread_no: AtomicU32,
    slots: RwLock<Slots>,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            generation: AtomicU64::new(0),
            next_thread_no: AtomicU32::new(1),
            slots: RwLock::new(Slots::default()),
        }
    }

    /// Membership of the calling thread
    pub fn current(&self) -> Membership {
        let generation = self.generation.load(Ordering::Acquire);
        let cached = CACHE
            .try_with(|cache| {
                cache.borrow().as_ref().and_then(|c| {
                    (c.registry == self.id && c.generation == generation)
                        .then(|| c.membership.clone())
                })
            })
            .ok()
            .flatten();
        if let Some(membership) = cached {
            return membership;
        }

        let id = thread::current().id();
        let membership = {
            let slots = self.read();
            if let Some(slot) = slots.threads.get(&id) {
                Membership::Registered(Arc::clone(slot))
            } else if slots.internal.contains(&id) {
                Membership::Denied
            } else {
                Membership::Unregistered
            }
        };
        self.remember(generation, membership.clone());
        membership
    }

    /// Ask for admission on behalf of the calling thread and create its slot.
    ///
    /// Internal threads are refused without consuming a slot.
    pub fn register_current(&self, admission: &AdmissionController) -> Option<Arc<ThreadState>> {
        let current = thread::current();
        let id = current.id();

        let mut slots = self.write();
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(existing) = slots.threads.get(&id) {
            return Some(Arc::clone(existing));
        }
        if slots.internal.contains(&id) || !admission.try_register() {
            drop(slots);
            debug!("thread {:?} refused admission", current.name());
            self.remember(generation, Membership::Denied);
            return None;
        }

        let thread_no = ThreadNo(self.next_thread_no.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(ThreadState::new(thread_no, current.name().map(str::to_owned)));
        slots.threads.insert(id, Arc::clone(&state));
        drop(slots);

        debug!("registered thread {:?} as {thread_no}", current.name());
        self.remember(generation, Membership::Registered(Arc::clone(&state)));
        Some(state)
    }

    /// Exclude the calling thread from tracing (e.g. the collector thread).
    pub fn mark_current_internal(&self) {
        let id = thread::current().id();
        self.write().internal.insert(id);
        self.remember(self.generation.load(Ordering::Acquire), Membership::Denied);
    }

    /// All registered slots
    #[must_use]
    pub fn slots(&self) -> Vec<Arc<ThreadState>> {
        self.read().threads.values().cloned().collect()
    }

    /// `(thread number, thread name)` of every registered thread, sorted by number
    #[must_use]
    pub fn thread_names(&self) -> Vec<(ThreadNo, Option<String>)> {
        let mut names: Vec<_> = self
            .read()
            .threads
            .values()
            .map(|t| (t.thread_no(), t.name().map(str::to_owned)))
            .collect();
        names.sort_by_key(|(no, _)| *no);
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().threads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy every slot and forget every admission decision.
    ///
    /// Internal threads stay internal.
    pub fn clear(&self) {
        let mut slots = self.write();
        slots.threads.clear();
        self.next_thread_no.store(1, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn remember(&self, generation: u64, membership: Membership) {
        // Fails only while the thread is being torn down; the slow path still works then
        let _ = CACHE.try_with(|cache| {
            *cache.borrow_mut() =
                Some(CachedMembership { registry: self.id, generation, membership });
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}
