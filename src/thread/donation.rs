//! Priority donation engine (spec §4.3). Resolves priority inversion across
//! chains of lock holders: `effective(T) = max(base(T), max over L in
//! held_locks(T) of max over W in waiters(L) of effective(W))`.
//!
//! There is no equivalent module in the teacher crate — its `scheduler` was
//! purely cooperative round-robin with no priority inheritance — so this is
//! built from the specification's own recursive definition, using the same
//! "walk a bounded chain with interrupts disabled" shape the teacher uses
//! for every other piece of shared scheduler state.

use super::tcb::ThreadId;
use crate::config::DONATION_CHAIN_LIMIT;

/// Walks `waiter -> lock -> holder -> lock' -> holder' -> ...`, raising each
/// visited holder's effective priority to at most `waiter`'s, stopping when
/// a holder already outranks the waiter or is not itself waiting on
/// anything. Bounded to `DONATION_CHAIN_LIMIT` hops so a lock-ordering bug
/// that creates a cycle cannot hang the donor.
pub fn donate(waiter: ThreadId, holder: ThreadId) {
    let waiter_priority = super::effective_priority(waiter);
    let mut current = holder;
    for _ in 0..DONATION_CHAIN_LIMIT {
        let current_priority = super::effective_priority(current);
        if current_priority >= waiter_priority {
            return;
        }
        super::set_effective_priority(current, waiter_priority);
        crate::log_info!("donation: boosted {:?} to priority {} on behalf of {:?}.", current, waiter_priority, waiter);
        let Some(lock_addr) = super::waiting_on(current) else { return };
        let lock = unsafe { &*(lock_addr as *const crate::sync::Lock) };
        match lock.holder() {
            Some(next) if next != current => current = next,
            _ => return,
        }
    }
}

#[cfg(all(test, feature = "unit-test"))]
mod tests {
    use super::*;
    use crate::thread::scheduler;

    fn spawn(name: &str, priority: u8) -> ThreadId {
        extern "C" fn dummy() -> ! {
            loop {}
        }
        scheduler::create(name, priority, dummy)
    }

    fn reset() {
        // SCHEDULER is private to `scheduler`; re-exported `init` is the
        // only reset hook available to other modules' tests.
        scheduler::init();
    }

    #[test]
    fn donation_raises_holder_to_waiter_level() {
        reset();
        let low = spawn("low", 10);
        let high = spawn("high", 50);
        donate(high, low);
        assert_eq!(scheduler::effective_priority(low), 50);
    }

    #[test]
    fn donation_stops_when_holder_already_outranks_waiter() {
        reset();
        let low = spawn("low", 60);
        let high = spawn("high", 20);
        donate(high, low);
        assert_eq!(scheduler::effective_priority(low), 60);
    }
}
