//! Synchronization primitives: counting semaphore, donation-aware lock, and
//! condition variable (spec §4.1). Every operation here disables interrupts
//! over its critical section rather than spinning, grounded on the teacher
//! crate's `x86_64::instructions::interrupts::without_interrupts` usage in
//! `scheduler::mod`; these are the scoped "interrupts-off" sections spec §5
//! requires.
//!
//! These primitives know nothing about priority donation themselves beyond
//! "pick the highest effective-priority waiter, ties FIFO" — the donation
//! walk that boosts a holder's effective priority while a thread waits on a
//! `Lock` lives in `thread::donation` and is invoked from `Lock::acquire`.

use alloc::collections::VecDeque;
use spin::Mutex;
use x86_64::instructions::interrupts::without_interrupts;

use crate::thread::{self, ThreadId};

/// A counting semaphore. `down`/`up` are the only suspension/wakeup points;
/// there is no busy-waiting.
pub struct Semaphore {
    inner: Mutex<SemaphoreState>,
}

struct SemaphoreState {
    count: u32,
    waiters: VecDeque<ThreadId>,
}

impl Semaphore {
    pub const fn new(count: u32) -> Self {
        Semaphore { inner: Mutex::new(SemaphoreState { count, waiters: VecDeque::new() }) }
    }

    /// Blocks the caller while `count == 0`; on return, `count` has been
    /// decremented by this call.
    pub fn down(&self) {
        without_interrupts(|| {
            loop {
                {
                    let mut state = self.inner.lock();
                    if state.count > 0 {
                        state.count -= 1;
                        return;
                    }
                    let me = thread::current_id();
                    state.waiters.push_back(me);
                }
                // thread::block() suspends with interrupts already off and
                // only returns once another thread has called `up` and
                // unblocked us; we then re-check the count like a condvar.
                thread::block();
            }
        })
    }

    /// Non-blocking variant of `down`. Returns `true` if the decrement
    /// happened.
    pub fn try_down(&self) -> bool {
        without_interrupts(|| {
            let mut state = self.inner.lock();
            if state.count > 0 {
                state.count -= 1;
                true
            } else {
                false
            }
        })
    }

    /// Increments the count, waking the highest effective-priority waiter
    /// (ties FIFO) if any are queued. Yields if that waiter now outranks
    /// the calling thread.
    pub fn up(&self) {
        without_interrupts(|| {
            let woken = {
                let mut state = self.inner.lock();
                state.count += 1;
                pop_highest_priority(&mut state.waiters)
            };
            if let Some(id) = woken {
                thread::unblock(id);
                if thread::effective_priority(id) > thread::current_effective_priority() {
                    thread::yield_now();
                }
            }
        })
    }

    pub fn waiter_count(&self) -> usize {
        without_interrupts(|| self.inner.lock().waiters.len())
    }
}

/// Removes and returns the highest effective-priority entry in `queue`,
/// breaking ties by FIFO order (earliest enqueue wins). Shared by
/// `Semaphore::up` and `Condvar::signal`.
fn pop_highest_priority(queue: &mut VecDeque<ThreadId>) -> Option<ThreadId> {
    let (best_idx, _) = queue
        .iter()
        .enumerate()
        .max_by_key(|(idx, id)| (thread::effective_priority(**id), core::cmp::Reverse(*idx)))?;
    queue.remove(best_idx)
}

/// A binary semaphore with an owner, extended with priority donation
/// (spec §4.1/§4.3).
pub struct Lock {
    sema: Semaphore,
    owner: Mutex<Option<ThreadId>>,
}

impl Lock {
    pub const fn new() -> Self {
        Lock { sema: Semaphore::new(1), owner: Mutex::new(None) }
    }

    pub fn is_held_by_current(&self) -> bool {
        *self.owner.lock() == Some(thread::current_id())
    }

    pub fn holder(&self) -> Option<ThreadId> {
        *self.owner.lock()
    }

    /// Effective priority of the highest-priority waiter currently queued
    /// on this lock's inner semaphore, if any. Used by the donation engine
    /// and by `release`'s effective-priority recomputation.
    pub fn max_waiter_priority(&self) -> Option<u8> {
        without_interrupts(|| {
            self.sema
                .inner
                .lock()
                .waiters
                .iter()
                .map(|id| thread::effective_priority(*id))
                .max()
        })
    }

    pub fn acquire(&self) {
        without_interrupts(|| {
            if self.owner.lock().is_none() && self.sema.try_down() {
                *self.owner.lock() = Some(thread::current_id());
                thread::add_held_lock(self as *const Lock as usize);
                return;
            }
            let me = thread::current_id();
            thread::set_waiting_on(me, self as *const Lock as usize);
            if let Some(holder) = self.holder() {
                crate::thread::donation::donate(me, holder);
            }
            self.sema.down();
            thread::clear_waiting_on(me);
            *self.owner.lock() = Some(me);
            thread::add_held_lock(self as *const Lock as usize);
            crate::log_info!("sync: {:?} acquired lock {:p} after waiting.", me, self);
        })
    }

    /// Releases the lock. Panics (a kernel bug, not a user error) if the
    /// caller does not hold it — a lock may only be released by its owner.
    pub fn release(&self) {
        without_interrupts(|| {
            let me = thread::current_id();
            assert_eq!(*self.owner.lock(), Some(me), "Lock::release by non-owner");
            thread::remove_held_lock(me, self as *const Lock as usize);
            *self.owner.lock() = None;
            thread::recompute_effective_priority(me);
            self.sema.up();
        })
    }
}

/// One-shot semaphore plus the thread id it belongs to, queued on a
/// `Condvar`'s waiter list.
struct CondWaiter {
    thread: ThreadId,
    sema: Semaphore,
}

/// A condition variable associated with an external `Lock`.
pub struct Condvar {
    waiters: Mutex<VecDeque<alloc::sync::Arc<CondWaiter>>>,
}

impl Condvar {
    pub const fn new() -> Self {
        Condvar { waiters: Mutex::new(VecDeque::new()) }
    }

    /// Atomically releases `lock`, blocks until signalled, then
    /// re-acquires `lock` before returning.
    pub fn wait(&self, lock: &Lock) {
        let waiter = alloc::sync::Arc::new(CondWaiter { thread: thread::current_id(), sema: Semaphore::new(0) });
        self.waiters.lock().push_back(waiter.clone());
        lock.release();
        waiter.sema.down();
        lock.acquire();
    }

    /// Wakes the waiter whose thread has the highest current effective
    /// priority, if any are queued.
    pub fn signal(&self) {
        without_interrupts(|| {
            let mut waiters = self.waiters.lock();
            if waiters.is_empty() {
                return;
            }
            let (best_idx, _) = waiters
                .iter()
                .enumerate()
                .max_by_key(|(idx, w)| (thread::effective_priority(w.thread), core::cmp::Reverse(*idx)))
                .expect("non-empty waiters");
            if let Some(w) = waiters.remove(best_idx) {
                w.sema.up();
            }
        })
    }

    pub fn broadcast(&self) {
        without_interrupts(|| {
            let mut waiters = self.waiters.lock();
            for w in waiters.drain(..) {
                w.sema.up();
            }
        })
    }
}

#[cfg(all(test, feature = "unit-test"))]
mod tests {
    use super::*;

    #[test]
    fn semaphore_down_up_roundtrip() {
        let sema = Semaphore::new(1);
        assert!(sema.try_down());
        assert!(!sema.try_down());
        sema.up();
        assert!(sema.try_down());
    }

    #[test]
    fn semaphore_waiter_count_tracks_queue() {
        let sema = Semaphore::new(0);
        assert_eq!(sema.waiter_count(), 0);
    }

    fn spawn(name: &str, priority: u8) -> ThreadId {
        extern "C" fn dummy() -> ! {
            loop {}
        }
        thread::scheduler::create(name, priority, dummy)
    }

    /// Scenario: T_low(10) holds L1, T_mid(20) is blocked on L1. A third
    /// thread's `acquire` on a lock T_mid holds would call `donate(T_high,
    /// T_mid)`; this reaches directly into that call to check the walk
    /// crosses from T_mid to T_low through L1 without needing a second real
    /// lock acquisition (L1's `owner` is poked directly, the same way
    /// `acquire` itself would set it under a real `down()`).
    #[test]
    fn donation_chain_crosses_two_locks() {
        thread::scheduler::init();
        let low = spawn("low", 10);
        let mid = spawn("mid", 20);
        let high = spawn("high", 30);

        let l1 = Lock::new();
        *l1.owner.lock() = Some(low);
        thread::set_waiting_on(mid, &l1 as *const Lock as usize);

        crate::thread::donation::donate(high, mid);

        assert_eq!(thread::effective_priority(mid), 30);
        assert_eq!(thread::effective_priority(low), 30);
    }
}
