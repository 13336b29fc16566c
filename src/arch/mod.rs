//! Architecture plumbing: GDT/TSS setup and interrupt vector registration.
//!
//! This module is the crate's boundary with the hardware collaborators the
//! specification explicitly puts out of scope (boot loader, interrupt
//! vector plumbing, PIT/timer driver, keyboard driver). It exists only so
//! the in-scope subsystems (thread scheduling, donation, process/syscall
//! layer) have a real `int 0x30` entry point and a real timer tick to hang
//! off of; none of the donation or syscall logic lives here.

pub mod gdt;
pub mod idt;
pub mod trap;
pub mod usermode;

pub use trap::TrapFrame;

pub fn init() {
    gdt::init();
    idt::init();
    crate::log_info!("arch: GDT/TSS and IDT initialized.");
}
