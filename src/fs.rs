//! `filesys_*`/`file_*` stand-in (spec §6): a single flat in-memory
//! filesystem. The real file system, block device, and inode/free-map
//! layers are explicitly out of scope; this module exists only so
//! `create`/`open`/`read`/`write`/`seek`/`tell`/`close`/`deny_write` have
//! something concrete behind them. Grounded on the teacher crate's
//! `fs::ramfs`/`fs::error`/`fs::mount` trio, flattened to a single
//! namespace (no directories) since the spec's filename contract is a
//! bare 1–14 character name, not a path.
//!
//! Every public entry point here is meant to be called with the global
//! filesystem lock already held by the caller (spec §4.5/§5); this module
//! does not take that lock itself.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use lazy_static::lazy_static;
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    AlreadyExists,
    WriteDenied,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "no such file"),
            FsError::AlreadyExists => write!(f, "file already exists"),
            FsError::WriteDenied => write!(f, "write denied: executable is in use"),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

struct Inode {
    data: Vec<u8>,
    deny_write_count: u32,
}

/// The global filesystem. Internally locked purely for interior
/// mutability — callers are still expected to bracket multi-step
/// sequences with the crate-wide filesystem lock (`fs::FILESYS_LOCK`) so
/// the dispatcher's "one syscall, one critical section" contract holds.
pub struct FileSystem {
    files: BTreeMap<String, Arc<Mutex<Inode>>>,
}

impl FileSystem {
    fn new() -> Self {
        FileSystem { files: BTreeMap::new() }
    }

    pub fn create(&mut self, name: &str, initial_size: u32) -> FsResult<()> {
        if self.files.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        self.files.insert(
            String::from(name),
            Arc::new(Mutex::new(Inode { data: vec![0u8; initial_size as usize], deny_write_count: 0 })),
        );
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> FsResult<()> {
        // Matches real unlink semantics: removing the name is legal even
        // while handles referencing the same inode remain open; the data
        // simply disappears once the last handle drops its Arc.
        self.files.remove(name).map(|_| ()).ok_or(FsError::NotFound)
    }

    pub fn open(&mut self, name: &str) -> FsResult<FileHandle> {
        let inode = self.files.get(name).cloned().ok_or(FsError::NotFound)?;
        Ok(FileHandle { inode, offset: 0, deny_write_held: false })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

lazy_static! {
    pub static ref FILESYS: Mutex<FileSystem> = Mutex::new(FileSystem::new());
}

/// An open file handle. Each successful `open` produces an independent
/// handle (and independent offset) over the same underlying inode, as fds
/// from distinct `open` calls do in spec §8's round-trip property.
pub struct FileHandle {
    inode: Arc<Mutex<Inode>>,
    offset: usize,
    /// Whether *this* handle is the one holding a deny-write count (set by
    /// `deny_write`); released automatically on drop so process exit
    /// always restores writability even on an unclean teardown path.
    deny_write_held: bool,
}

impl FileHandle {
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let inode = self.inode.lock();
        if self.offset >= inode.data.len() {
            return 0;
        }
        let available = &inode.data[self.offset..];
        let n = core::cmp::min(buf.len(), available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        n
    }

    pub fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        let mut inode = self.inode.lock();
        if inode.deny_write_count > 0 {
            return Err(FsError::WriteDenied);
        }
        let end = self.offset + buf.len();
        if end > inode.data.len() {
            inode.data.resize(end, 0);
        }
        inode.data[self.offset..end].copy_from_slice(buf);
        self.offset = end;
        Ok(buf.len())
    }

    pub fn seek(&mut self, pos: u32) {
        self.offset = pos as usize;
    }

    pub fn tell(&self) -> u32 {
        self.offset as u32
    }

    pub fn length(&self) -> u32 {
        self.inode.lock().data.len() as u32
    }

    /// Read the whole file from offset 0, irrespective of the handle's
    /// current cursor. Used by the ELF loader, which needs the raw image.
    pub fn read_all(&self) -> Vec<u8> {
        self.inode.lock().data.clone()
    }

    /// `file_deny_write`: called once, by `process_execute`'s loader, on
    /// the executable's own handle (spec §4.4 step 5).
    pub fn deny_write(&mut self) {
        if !self.deny_write_held {
            self.inode.lock().deny_write_count += 1;
            self.deny_write_held = true;
        }
    }

    pub fn allow_write(&mut self) {
        if self.deny_write_held {
            self.inode.lock().deny_write_count -= 1;
            self.deny_write_held = false;
        }
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.allow_write();
    }
}

/// Filename length constraint shared by create/remove/open (spec §6).
pub fn valid_filename_length(name: &str) -> bool {
    let len = name.len();
    len >= crate::config::FILENAME_MIN && len <= crate::config::FILENAME_MAX
}
