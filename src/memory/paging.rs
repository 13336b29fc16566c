//! Software-simulated page directories.
//!
//! Stands in for `pagedir_create/destroy/activate/get_page/set_page`
//! (spec §6). Each process gets its own sparse map from page-aligned
//! virtual address to a backing page, rather than a real two-level i386
//! page table walked by hardware — paging/TLB management is explicitly out
//! of scope. The simulation still enforces the invariants the rest of the
//! kernel depends on: nothing below `PGSIZE` is ever mapped (page 0), and
//! a failed mapping attempt leaves no partial state behind.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::PGSIZE;
use super::palloc::{self, PalFlags};

fn page_base(vaddr: u32) -> u32 {
    vaddr & !((PGSIZE as u32) - 1)
}

fn page_offset(vaddr: u32) -> usize {
    (vaddr as usize) & (PGSIZE - 1)
}

/// A process's simulated address space.
pub struct PageDirectory {
    id: u64,
    pages: BTreeMap<u32, palloc::Page>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static ACTIVE_ID: AtomicU64 = AtomicU64::new(0);

impl PageDirectory {
    /// `pagedir_create`.
    pub fn create() -> Box<PageDirectory> {
        Box::new(PageDirectory {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            pages: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// `pagedir_set_page`: map a fresh zeroed page at `vaddr`'s page.
    /// Page 0 is never mapped (spec §4.4 PT_LOAD validation: `p_vaddr >=
    /// PGSIZE`), so callers must not pass a `vaddr` below one page.
    pub fn set_page(&mut self, vaddr: u32) -> bool {
        if (vaddr as usize) < PGSIZE {
            return false;
        }
        let base = page_base(vaddr);
        if self.pages.contains_key(&base) {
            return false; // double mapping is a loader bug
        }
        match palloc::get_page(PalFlags::USER | PalFlags::ZERO) {
            Some(page) => {
                self.pages.insert(base, page);
                true
            }
            None => false,
        }
    }

    /// `pagedir_get_page`: true if `vaddr`'s page is mapped.
    pub fn get_page(&self, vaddr: u32) -> bool {
        self.pages.contains_key(&page_base(vaddr))
    }

    /// Copy `data` into the address space starting at `vaddr`. Every
    /// touched page must already be mapped via `set_page`; returns `false`
    /// (without partial writes beyond what was already touched) if any
    /// byte would land outside a mapped page.
    pub fn write_bytes(&mut self, vaddr: u32, data: &[u8]) -> bool {
        let mut addr = vaddr;
        let mut written = 0usize;
        while written < data.len() {
            let base = page_base(addr);
            let Some(page) = self.pages.get_mut(&base) else { return false; };
            let off = page_offset(addr);
            let take = core::cmp::min(PGSIZE - off, data.len() - written);
            page[off..off + take].copy_from_slice(&data[written..written + take]);
            written += take;
            addr = addr.wrapping_add(take as u32);
        }
        true
    }

    /// Zero a byte range (used for BSS per spec §4.4 step "p_memsz >
    /// p_filesz" zero-fill).
    pub fn zero_bytes(&mut self, vaddr: u32, len: usize) -> bool {
        let mut addr = vaddr;
        let mut done = 0usize;
        while done < len {
            let base = page_base(addr);
            let Some(page) = self.pages.get_mut(&base) else { return false; };
            let off = page_offset(addr);
            let take = core::cmp::min(PGSIZE - off, len - done);
            page[off..off + take].fill(0);
            done += take;
            addr = addr.wrapping_add(take as u32);
        }
        true
    }

    /// Read `buf.len()` bytes starting at `vaddr`. Used by the syscall
    /// dispatcher and the argv marshaller. Returns `false` on any
    /// unmapped page in range, exactly the failure the dispatcher turns
    /// into a bad-pointer exit.
    pub fn read_bytes(&self, vaddr: u32, buf: &mut [u8]) -> bool {
        let mut addr = vaddr;
        let mut done = 0usize;
        while done < buf.len() {
            let base = page_base(addr);
            let Some(page) = self.pages.get(&base) else { return false; };
            let off = page_offset(addr);
            let take = core::cmp::min(PGSIZE - off, buf.len() - done);
            buf[done..done + take].copy_from_slice(&page[off..off + take]);
            done += take;
            addr = addr.wrapping_add(take as u32);
        }
        true
    }
}

/// `pagedir_destroy`. Consuming the box drops every backing page.
pub fn destroy(dir: Box<PageDirectory>) {
    if ACTIVE_ID.load(Ordering::Acquire) == dir.id {
        ACTIVE_ID.store(0, Ordering::Release);
    }
    drop(dir);
}

/// `pagedir_activate`. In real hardware this loads CR3; here it only
/// tracks which directory is "current" for diagnostics, since every
/// pointer-validation call is already handed the owning thread's
/// directory explicitly rather than reading a global CR3.
pub fn activate(dir: Option<&PageDirectory>) {
    ACTIVE_ID.store(dir.map(|d| d.id).unwrap_or(0), Ordering::Release);
}
