//! Initial user stack construction (spec §6): argv strings, alignment pad,
//! nul sentinel, argv pointer array, argv base pointer, argc, and a fake
//! return address, all growing down from `PHYS_BASE`. There is no teacher
//! equivalent — the teacher crate never built a user-mode argv contract —
//! so this follows the specification's layout diagram directly, using the
//! same `PageDirectory::write_bytes` primitive the ELF loader uses to place
//! bytes in the new address space.

use alloc::vec::Vec;

use crate::config::PHYS_BASE;
use crate::memory::paging::PageDirectory;

/// Builds the initial stack for `argv` (argv[0] is the executable name) at
/// the top of user memory. Returns the initial `esp` the child should enter
/// user mode with, or `None` if any write fell outside the mapped stack
/// page(s).
pub fn build_initial_stack(dir: &mut PageDirectory, argv: &[alloc::string::String]) -> Option<u32> {
    let mut sp = PHYS_BASE;

    // Push strings from last to first, mirroring the diagram's top-down
    // layout; record each string's final address for the pointer array.
    let mut addrs = Vec::with_capacity(argv.len());
    for arg in argv.iter().rev() {
        let bytes_with_nul_len = arg.len() + 1;
        sp -= bytes_with_nul_len as u32;
        let mut buf = Vec::with_capacity(bytes_with_nul_len);
        buf.extend_from_slice(arg.as_bytes());
        buf.push(0);
        if !dir.write_bytes(sp, &buf) {
            return None;
        }
        addrs.push(sp);
    }
    addrs.reverse(); // addrs[i] is now the address of argv[i]'s bytes

    // Align down to a 4-byte boundary before the pointer array.
    sp &= !0x3;

    // argv[argc] nul sentinel.
    sp -= 4;
    if !dir.write_bytes(sp, &0u32.to_le_bytes()) {
        return None;
    }

    // Pointers, pushed last-to-first so argv[0]'s pointer ends up lowest.
    for &addr in addrs.iter().rev() {
        sp -= 4;
        if !dir.write_bytes(sp, &addr.to_le_bytes()) {
            return None;
        }
    }
    let argv_base = sp;

    // argv: pointer to &argv[0].
    sp -= 4;
    if !dir.write_bytes(sp, &argv_base.to_le_bytes()) {
        return None;
    }

    // argc.
    sp -= 4;
    if !dir.write_bytes(sp, &(argv.len() as u32).to_le_bytes()) {
        return None;
    }

    // Fake return address.
    sp -= 4;
    if !dir.write_bytes(sp, &0u32.to_le_bytes()) {
        return None;
    }

    Some(sp)
}

#[cfg(all(test, feature = "unit-test"))]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec;

    fn mapped_dir() -> PageDirectory {
        let mut dir = *PageDirectory::create();
        // Map enough pages below PHYS_BASE to hold a small stack.
        let mut page = PHYS_BASE - crate::config::PGSIZE as u32;
        dir.set_page(page);
        page -= crate::config::PGSIZE as u32;
        dir.set_page(page);
        dir
    }

    #[test]
    fn argc_and_argv_base_land_just_above_fake_return_address() {
        let mut dir = mapped_dir();
        let argv = vec![String::from("echo"), String::from("hi")];
        let esp = build_initial_stack(&mut dir, &argv).expect("stack build should succeed");

        let mut fake_ret = [0u8; 4];
        dir.read_bytes(esp, &mut fake_ret);
        assert_eq!(u32::from_le_bytes(fake_ret), 0);

        let mut argc_bytes = [0u8; 4];
        dir.read_bytes(esp + 4, &mut argc_bytes);
        assert_eq!(u32::from_le_bytes(argc_bytes), 2);

        let mut argv_ptr_bytes = [0u8; 4];
        dir.read_bytes(esp + 8, &mut argv_ptr_bytes);
        let argv_base = u32::from_le_bytes(argv_ptr_bytes);

        let mut argv0_ptr_bytes = [0u8; 4];
        dir.read_bytes(argv_base, &mut argv0_ptr_bytes);
        let argv0_addr = u32::from_le_bytes(argv0_ptr_bytes);

        let mut name = [0u8; 5];
        dir.read_bytes(argv0_addr, &mut name);
        assert_eq!(&name, b"echo\0");
    }

    #[test]
    fn esp_is_4_byte_aligned() {
        let mut dir = mapped_dir();
        let argv = vec![String::from("x")];
        let esp = build_initial_stack(&mut dir, &argv).expect("stack build should succeed");
        assert_eq!(esp % 4, 0);
    }

    /// Spec's argv-construction scenario: `echo hello world` must present
    /// argc == 3, argv[0..3] pointing at "echo"/"hello"/"world" in order,
    /// and a NULL sentinel at argv[3].
    #[test]
    fn echo_hello_world_layout_has_three_args_and_null_sentinel() {
        let mut dir = mapped_dir();
        let argv = vec![String::from("echo"), String::from("hello"), String::from("world")];
        let esp = build_initial_stack(&mut dir, &argv).expect("stack build should succeed");

        let mut argc_bytes = [0u8; 4];
        dir.read_bytes(esp + 4, &mut argc_bytes);
        assert_eq!(u32::from_le_bytes(argc_bytes), 3);

        let mut argv_ptr_bytes = [0u8; 4];
        dir.read_bytes(esp + 8, &mut argv_ptr_bytes);
        let argv_base = u32::from_le_bytes(argv_ptr_bytes);

        let expected = [&b"echo\0"[..], &b"hello\0"[..], &b"world\0"[..]];
        for (i, word) in expected.iter().enumerate() {
            let mut ptr_bytes = [0u8; 4];
            dir.read_bytes(argv_base + (i as u32) * 4, &mut ptr_bytes);
            let addr = u32::from_le_bytes(ptr_bytes);
            let mut buf = vec![0u8; word.len()];
            dir.read_bytes(addr, &mut buf);
            assert_eq!(&buf, word);
        }

        let mut null_bytes = [0u8; 4];
        dir.read_bytes(argv_base + 3 * 4, &mut null_bytes);
        assert_eq!(u32::from_le_bytes(null_bytes), 0);
    }
}
