//! Kernel thread scheduling and priority donation (spec §4.2/§4.3).
//!
//! `scheduler` owns the actual ready queue, sleeping list and all-threads
//! registry; this module re-exports the operations `sync` and `process`
//! need as free functions, the same flattened surface the teacher crate
//! exposes from `scheduler::mod` (`spawn`, `init`, …) rather than requiring
//! every caller to know about the inner singleton.

pub mod context;
pub mod donation;
pub mod scheduler;
pub mod tcb;

pub use tcb::{ThreadId, ThreadState};

pub fn init() {
    scheduler::init();
}

pub fn create(name: &str, priority: u8, entry: extern "C" fn() -> !) -> ThreadId {
    scheduler::create(name, priority, entry)
}

pub fn current_id() -> ThreadId {
    scheduler::current_id()
}

pub fn current_name() -> alloc::string::String {
    scheduler::current_name()
}

pub fn effective_priority(id: ThreadId) -> u8 {
    scheduler::effective_priority(id)
}

pub fn current_effective_priority() -> u8 {
    scheduler::current_effective_priority()
}

pub fn set_effective_priority(id: ThreadId, priority: u8) {
    scheduler::set_effective_priority(id, priority)
}

pub fn base_priority(id: ThreadId) -> u8 {
    scheduler::base_priority(id)
}

pub fn set_priority(new_base: u8) {
    scheduler::set_priority(new_base)
}

pub fn waiting_on(id: ThreadId) -> Option<usize> {
    scheduler::waiting_on(id)
}

pub fn set_waiting_on(id: ThreadId, lock_addr: usize) {
    scheduler::set_waiting_on(id, lock_addr)
}

pub fn clear_waiting_on(id: ThreadId) {
    scheduler::clear_waiting_on(id)
}

pub fn add_held_lock(lock_addr: usize) {
    scheduler::add_held_lock(lock_addr)
}

pub fn remove_held_lock(id: ThreadId, lock_addr: usize) {
    scheduler::remove_held_lock(id, lock_addr)
}

pub fn recompute_effective_priority(id: ThreadId) {
    scheduler::recompute_effective_priority(id)
}

pub fn block() {
    scheduler::block()
}

pub fn unblock(id: ThreadId) {
    scheduler::unblock(id)
}

pub fn yield_now() {
    scheduler::yield_now()
}

pub fn sleep_until(wake_tick: u64) {
    scheduler::sleep_until(wake_tick)
}

pub fn reap(id: ThreadId) {
    scheduler::reap(id)
}

pub fn current_ticks() -> u64 {
    scheduler::current_ticks()
}
