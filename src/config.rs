//! Compile-time constants shared across the scheduler, process and syscall
//! layers. Centralised here (the teacher crate scatters equivalents like
//! `TASK_STACK_SIZE`/`USER_STACK_SIZE` next to their point of use) because
//! these constants are load-bearing invariants shared by several modules.

/// Size in bytes of a single page: the unit of kernel-stack, TCB and user
/// page allocation. Real i386 protected mode uses 4 KiB pages.
pub const PGSIZE: usize = 4096;

/// Boundary between user and kernel virtual address space. User pointers
/// must be strictly below this value.
pub const PHYS_BASE: u32 = 0xC000_0000;

/// Sentinel word written at the low end of a thread's kernel stack to
/// detect stack overflow into the TCB.
pub const STACK_MAGIC: u32 = 0xCAFE_F00D;

/// Lowest and highest legal base priority (spec §6 "Priority range").
pub const PRI_MIN: u8 = 0;
pub const PRI_MAX: u8 = 63;
pub const PRI_DEFAULT: u8 = 31;

/// Maximum length of a thread name, including no NUL terminator (the name
/// is a Rust `String`, not a C buffer, but the 15-character bound from the
/// original design is preserved as a validated invariant).
pub const THREAD_NAME_MAX: usize = 15;

/// Number of timer ticks per second and the length of one scheduling
/// time slice, in ticks.
pub const TIMER_FREQUENCY_HZ: u32 = 100;
pub const TIME_SLICE_TICKS: u64 = 4;

/// Bound on the priority-donation walk (spec §4.3): caps the number of
/// lock-holder hops visited so a cyclic lock graph cannot hang the donor.
pub const DONATION_CHAIN_LIMIT: usize = 8;

/// Maximum number of program headers an ELF32 executable may declare
/// (spec §4.4).
pub const ELF_MAX_PHNUM: u16 = 1024;

/// Minimum and maximum length of a filename accepted by create/remove/open
/// (spec §6).
pub const FILENAME_MIN: usize = 1;
pub const FILENAME_MAX: usize = 14;

/// Fixed size of a process's kernel stack page and user stack, both one
/// page per spec's "4 KiB page" wording for the TCB/stack and a generous
/// multiple of a page for the initial user stack.
pub const USER_STACK_PAGES: usize = 1;
