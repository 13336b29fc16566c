//! Physical/virtual memory stand-ins.
//!
//! Paging and TLB management (`pagedir_*`) and the whole-page allocator
//! (`palloc_get_page`/`palloc_free_page`) are explicitly out of scope per
//! the specification — they are external collaborators whose *interface*
//! the thread and process layers depend on. This module gives that
//! interface a concrete, software-simulated backing (a sparse per-process
//! frame map rather than real CR3-backed page tables) so the loader, the
//! initial user-stack builder and the syscall dispatcher's pointer
//! validation are all exercisable without real MMU hardware.

pub mod palloc;
pub mod paging;

pub fn init() {
    crate::log_info!("memory: page allocator and simulated page directories ready.");
}
