//! ELF32 header/program-header parsing and segment loading (spec §4.4).
//! Adapted from the teacher crate's `loader::elf` (`Elf64Ehdr`/`Elf64Phdr`/
//! `ExecError`), narrowed from ET_EXEC/x86-64 to the spec's exact i386
//! constraints and rewritten to map segments through the simulated
//! `memory::paging::PageDirectory` rather than writing through raw
//! pointers into the kernel's own address space.

use alloc::vec::Vec;
use core::fmt;

const ELF_IDENT_PREFIX: [u8; 7] = [0x7F, b'E', b'L', b'F', 1, 1, 1];
const ET_EXEC: u16 = 2;
const EM_I386: u16 = 3;
const EV_CURRENT: u32 = 1;
const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;
const PT_SHLIB: u32 = 5;
const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    NotFound,
    Truncated,
    BadMagic,
    UnsupportedType,
    UnsupportedMachine,
    UnsupportedVersion,
    BadProgramHeaderSize,
    TooManyProgramHeaders,
    BadSegment,
    DisallowedSegmentType,
    OutOfMemory,
    MappingFailed,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            LoadError::NotFound => "executable not found",
            LoadError::Truncated => "file too short to be a valid ELF image",
            LoadError::BadMagic => "bad ELF identification bytes",
            LoadError::UnsupportedType => "not an executable (ET_EXEC) file",
            LoadError::UnsupportedMachine => "not an i386 (EM_386) binary",
            LoadError::UnsupportedVersion => "unsupported ELF version",
            LoadError::BadProgramHeaderSize => "unexpected program header entry size",
            LoadError::TooManyProgramHeaders => "too many program headers",
            LoadError::BadSegment => "malformed PT_LOAD segment",
            LoadError::DisallowedSegmentType => "PT_DYNAMIC/PT_INTERP/PT_SHLIB segment present",
            LoadError::OutOfMemory => "out of memory while mapping segments",
            LoadError::MappingFailed => "failed to map a loadable segment",
        };
        write!(f, "{}", msg)
    }
}

struct Ehdr32 {
    e_entry: u32,
    e_phoff: u32,
    e_phentsize: u16,
    e_phnum: u16,
}

impl Ehdr32 {
    fn parse(data: &[u8]) -> Result<Self, LoadError> {
        if data.len() < EHDR_SIZE {
            return Err(LoadError::Truncated);
        }
        if data[0..7] != ELF_IDENT_PREFIX {
            return Err(LoadError::BadMagic);
        }
        let e_type = u16::from_le_bytes([data[16], data[17]]);
        let e_machine = u16::from_le_bytes([data[18], data[19]]);
        let e_version = u32::from_le_bytes(data[20..24].try_into().unwrap());
        if e_type != ET_EXEC {
            return Err(LoadError::UnsupportedType);
        }
        if e_machine != EM_I386 {
            return Err(LoadError::UnsupportedMachine);
        }
        if e_version != EV_CURRENT {
            return Err(LoadError::UnsupportedVersion);
        }
        let e_phentsize = u16::from_le_bytes([data[42], data[43]]);
        let e_phnum = u16::from_le_bytes([data[44], data[45]]);
        if e_phentsize as usize != PHDR_SIZE {
            return Err(LoadError::BadProgramHeaderSize);
        }
        if e_phnum > crate::config::ELF_MAX_PHNUM {
            return Err(LoadError::TooManyProgramHeaders);
        }
        Ok(Ehdr32 {
            e_entry: u32::from_le_bytes(data[24..28].try_into().unwrap()),
            e_phoff: u32::from_le_bytes(data[28..32].try_into().unwrap()),
            e_phentsize,
            e_phnum,
        })
    }
}

struct Phdr32 {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_filesz: u32,
    p_memsz: u32,
}

impl Phdr32 {
    fn parse(data: &[u8]) -> Result<Self, LoadError> {
        if data.len() < PHDR_SIZE {
            return Err(LoadError::Truncated);
        }
        Ok(Phdr32 {
            p_type: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            p_offset: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            p_vaddr: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            p_filesz: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            p_memsz: u32::from_le_bytes(data[20..24].try_into().unwrap()),
        })
    }

    /// PT_LOAD validation exactly as specified: matching in-page offsets,
    /// in-bounds file range, non-empty and non-shrinking segment size, no
    /// wrap-around, and page 0 never mapped.
    fn validate_load(&self, file_len: usize) -> Result<(), LoadError> {
        let page_mask = crate::config::PGSIZE as u32 - 1;
        if (self.p_offset & page_mask) != (self.p_vaddr & page_mask) {
            return Err(LoadError::BadSegment);
        }
        if self.p_offset as usize > file_len {
            return Err(LoadError::BadSegment);
        }
        if self.p_memsz == 0 || self.p_memsz < self.p_filesz {
            return Err(LoadError::BadSegment);
        }
        let end = self.p_vaddr.checked_add(self.p_memsz).ok_or(LoadError::BadSegment)?;
        if end < self.p_vaddr {
            return Err(LoadError::BadSegment);
        }
        if self.p_vaddr < crate::config::PGSIZE as u32 {
            return Err(LoadError::BadSegment);
        }
        Ok(())
    }
}

pub struct LoadedImage {
    pub entry: u32,
}

/// Parses `image` as an ELF32 executable and maps its `PT_LOAD` segments
/// into `dir`, zero-filling any BSS tail (`p_memsz > p_filesz`). Rejects
/// `PT_DYNAMIC`/`PT_INTERP`/`PT_SHLIB` segments outright.
pub fn load_into(image: &[u8], dir: &mut crate::memory::paging::PageDirectory) -> Result<LoadedImage, LoadError> {
    let ehdr = Ehdr32::parse(image)?;

    let mut phdrs = Vec::with_capacity(ehdr.e_phnum as usize);
    for i in 0..ehdr.e_phnum as usize {
        let off = ehdr.e_phoff as usize + i * ehdr.e_phentsize as usize;
        let slice = image.get(off..).ok_or(LoadError::Truncated)?;
        phdrs.push(Phdr32::parse(slice)?);
    }

    for phdr in &phdrs {
        if matches!(phdr.p_type, PT_DYNAMIC | PT_INTERP | PT_SHLIB) {
            return Err(LoadError::DisallowedSegmentType);
        }
    }

    for phdr in &phdrs {
        if phdr.p_type != PT_LOAD {
            continue;
        }
        phdr.validate_load(image.len())?;
        map_segment(image, phdr, dir)?;
    }

    Ok(LoadedImage { entry: ehdr.e_entry })
}

fn map_segment(image: &[u8], phdr: &Phdr32, dir: &mut crate::memory::paging::PageDirectory) -> Result<(), LoadError> {
    let pgsize = crate::config::PGSIZE as u32;
    let first_page = phdr.p_vaddr & !(pgsize - 1);
    let last_page = (phdr.p_vaddr + phdr.p_memsz - 1) & !(pgsize - 1);
    let mut page = first_page;
    loop {
        if !dir.get_page(page) && !dir.set_page(page) {
            return Err(LoadError::OutOfMemory);
        }
        if page == last_page {
            break;
        }
        page += pgsize;
    }

    let file_bytes = &image[phdr.p_offset as usize..(phdr.p_offset + phdr.p_filesz) as usize];
    if !dir.write_bytes(phdr.p_vaddr, file_bytes) {
        return Err(LoadError::MappingFailed);
    }
    let bss_len = (phdr.p_memsz - phdr.p_filesz) as usize;
    if bss_len > 0 {
        let bss_start = phdr.p_vaddr + phdr.p_filesz;
        if !dir.zero_bytes(bss_start, bss_len) {
            return Err(LoadError::MappingFailed);
        }
    }
    Ok(())
}

#[cfg(all(test, feature = "unit-test"))]
mod tests {
    use super::*;
    use alloc::vec;

    fn build_minimal_elf(entry: u32, seg_vaddr: u32, payload: &[u8], memsz: u32) -> Vec<u8> {
        let phoff = EHDR_SIZE as u32;
        let data_off = phoff + PHDR_SIZE as u32;
        let mut buf = vec![0u8; data_off as usize + payload.len()];
        buf[0..7].copy_from_slice(&ELF_IDENT_PREFIX);
        buf[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        buf[18..20].copy_from_slice(&EM_I386.to_le_bytes());
        buf[20..24].copy_from_slice(&EV_CURRENT.to_le_bytes());
        buf[24..28].copy_from_slice(&entry.to_le_bytes());
        buf[28..32].copy_from_slice(&phoff.to_le_bytes());
        buf[42..44].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        buf[44..46].copy_from_slice(&1u16.to_le_bytes());

        let p = phoff as usize;
        buf[p..p + 4].copy_from_slice(&PT_LOAD.to_le_bytes());
        buf[p + 4..p + 8].copy_from_slice(&data_off.to_le_bytes());
        buf[p + 8..p + 12].copy_from_slice(&seg_vaddr.to_le_bytes());
        buf[p + 16..p + 20].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        buf[p + 20..p + 24].copy_from_slice(&memsz.to_le_bytes());

        buf[data_off as usize..].copy_from_slice(payload);
        buf
    }

    #[test]
    fn rejects_bad_magic() {
        let mut image = build_minimal_elf(0x1000, 0x1000, &[1, 2, 3], 3);
        image[0] = 0;
        let mut dir = crate::memory::paging::PageDirectory::create();
        assert_eq!(load_into(&image, &mut dir).unwrap_err(), LoadError::BadMagic);
    }

    #[test]
    fn rejects_vaddr_in_page_zero() {
        let image = build_minimal_elf(0x100, 0x100, &[1, 2, 3], 3);
        let mut dir = crate::memory::paging::PageDirectory::create();
        assert_eq!(load_into(&image, &mut dir).unwrap_err(), LoadError::BadSegment);
    }

    #[test]
    fn loads_a_valid_single_segment_binary() {
        let image = build_minimal_elf(0x1000, 0x1000, &[0xAA, 0xBB, 0xCC], 8);
        let mut dir = crate::memory::paging::PageDirectory::create();
        let loaded = load_into(&image, &mut dir).expect("should load");
        assert_eq!(loaded.entry, 0x1000);
        let mut readback = [0u8; 3];
        assert!(dir.read_bytes(0x1000, &mut readback));
        assert_eq!(readback, [0xAA, 0xBB, 0xCC]);
        let mut bss = [0xFFu8; 5];
        assert!(dir.read_bytes(0x1003, &mut bss));
        assert_eq!(bss, [0u8; 5]);
    }
}
