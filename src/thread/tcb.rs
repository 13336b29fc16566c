//! Thread control block (spec §4.2/§4.3). Adapted from the teacher crate's
//! `scheduler::task::Process`, trimmed to the fields a kernel thread itself
//! owns; user-process-specific state (page directory, fd table, parent/child
//! links, rendezvous semaphores) lives in the `process` module's own
//! registry rather than inline here, the same way `fd`'s tables are keyed
//! by thread id instead of embedded in the TCB.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use super::context::Context;
use crate::config::{PRI_DEFAULT, STACK_MAGIC, THREAD_NAME_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    /// Exited but not yet reaped (its TCB is retained only long enough for
    /// `process_wait`/diagnostics to read its final state).
    Dying,
}

pub struct ThreadControlBlock {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub base_priority: u8,
    pub effective_priority: u8,
    pub context: Context,
    /// Owned kernel stack; the guard word at index 0 is checked against
    /// `STACK_MAGIC` to catch overflow into the TCB itself.
    pub stack: Box<[u8]>,
    pub stack_magic: u32,
    /// Address identity (`&Lock as *const _ as usize`) of the lock this
    /// thread is currently blocked acquiring, if any.
    pub waiting_on: Option<usize>,
    /// Address identities of locks currently held by this thread.
    pub held_locks: Vec<usize>,
    /// Set while the thread is asleep in `timer::sleep`; cleared on wake.
    pub wakeup_tick: Option<u64>,
}

impl ThreadControlBlock {
    pub fn new(id: ThreadId, name: &str, priority: u8, mut stack: Box<[u8]>, context: Context) -> Self {
        let mut truncated = String::from(name);
        truncated.truncate(THREAD_NAME_MAX);
        if stack.len() >= 4 {
            stack[..4].copy_from_slice(&STACK_MAGIC.to_le_bytes());
        }
        ThreadControlBlock {
            id,
            name: truncated,
            state: ThreadState::Ready,
            base_priority: priority,
            effective_priority: priority,
            context,
            stack,
            stack_magic: STACK_MAGIC,
            waiting_on: None,
            held_locks: Vec::new(),
            wakeup_tick: None,
        }
    }

    pub fn stack_overflowed(&self) -> bool {
        if self.stack.len() < 4 {
            return false;
        }
        let magic_bytes = self.stack_magic.to_le_bytes();
        self.stack[..4] != magic_bytes
    }
}

impl Default for ThreadControlBlock {
    /// Only used to build the idle thread's placeholder before its real
    /// stack and context are assigned by the scheduler.
    fn default() -> Self {
        ThreadControlBlock {
            id: ThreadId(0),
            name: String::from("idle"),
            state: ThreadState::Ready,
            base_priority: PRI_DEFAULT,
            effective_priority: PRI_DEFAULT,
            context: Context::empty(),
            stack: Box::new([]),
            stack_magic: STACK_MAGIC,
            waiting_on: None,
            held_locks: Vec::new(),
            wakeup_tick: None,
        }
    }
}
