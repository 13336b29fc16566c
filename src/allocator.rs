//! Kernel heap. The teacher crate maps its heap into freshly-allocated
//! physical frames discovered from a Multiboot2 memory map; this crate has
//! no physical-memory layer at all (see `memory::palloc`'s doc comment), so
//! the heap is instead a fixed-size static region reserved in the kernel's
//! own BSS and handed to `linked_list_allocator` directly.

use linked_list_allocator::LockedHeap;

pub const HEAP_SIZE: usize = 1024 * 1024;

static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

pub fn init_heap() {
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
}
