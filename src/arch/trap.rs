//! The interrupt frame shape shared by the `int 0x30` syscall gate and the
//! Ring 3 entry trampoline built for a freshly loaded process (spec §4.4,
//! §4.5). Field order matches what the gate in `usermode.rs` pushes so the
//! frame can be read, mutated (to set a return value) and later `iret`-ed
//! back into user mode without reshaping it.

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    // Callee-saved general purpose registers, pushed by the gate.
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    // Pushed by the CPU itself on a privilege-level-changing interrupt.
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub user_ss: u32,
}

impl TrapFrame {
    /// A zeroed frame, to be filled in before the first Ring 3 entry of a
    /// freshly loaded process (spec §4.4 step 1: "Build a zero-initialised
    /// interrupt frame for user mode").
    pub const fn zeroed() -> Self {
        TrapFrame {
            edi: 0, esi: 0, ebp: 0, ebx: 0, edx: 0, ecx: 0, eax: 0,
            eip: 0, cs: 0, eflags: 0, user_esp: 0, user_ss: 0,
        }
    }

    /// Set the syscall return value, delivered to user code in `eax`.
    pub fn set_return(&mut self, value: i32) {
        self.eax = value as u32;
    }
}
