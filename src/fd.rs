//! Per-thread file descriptor tables (spec §4.5/§6). Grounded on the
//! teacher crate's `fs::fd` module (`FdTable`/fd-to-`File` mapping),
//! flattened to a plain sorted `Vec` since this crate's fd allocation
//! policy is an explicit, simple rule rather than a free-list allocator:
//! the next fd is `last_fd + 1`, where `last_fd` is the greatest fd
//! currently open, or 1 if none are open (fds 0 and 1 are reserved for
//! stdin/stdout and are never actually stored here).

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use spin::Mutex;

use crate::fs::FileHandle;
use crate::thread::ThreadId;

const FIRST_USER_FD: i32 = 2;

pub struct FdTable {
    entries: Vec<(i32, FileHandle)>,
}

impl FdTable {
    fn new() -> Self {
        FdTable { entries: Vec::new() }
    }

    /// Allocates the next fd and stores `handle` under it, returning the
    /// new fd. The entries vec is kept sorted ascending by fd.
    fn open(&mut self, handle: FileHandle) -> i32 {
        let last_fd = self.entries.last().map(|(fd, _)| *fd).unwrap_or(FIRST_USER_FD - 1);
        let fd = last_fd + 1;
        self.entries.push((fd, handle));
        fd
    }

    fn get_mut(&mut self, fd: i32) -> Option<&mut FileHandle> {
        self.entries.iter_mut().find(|(f, _)| *f == fd).map(|(_, h)| h)
    }

    /// Removes and drops `fd`'s handle, returning whether it was open.
    fn close(&mut self, fd: i32) -> bool {
        if let Some(idx) = self.entries.iter().position(|(f, _)| *f == fd) {
            self.entries.remove(idx);
            true
        } else {
            false
        }
    }

    /// Closes every open fd, in ascending order, as `process_exit` requires.
    fn close_all(&mut self) {
        self.entries.clear();
    }
}

lazy_static::lazy_static! {
    static ref TABLES: Mutex<BTreeMap<ThreadId, FdTable>> = Mutex::new(BTreeMap::new());
}

pub fn create_table(owner: ThreadId) {
    TABLES.lock().insert(owner, FdTable::new());
}

pub fn open(owner: ThreadId, handle: FileHandle) -> i32 {
    let mut tables = TABLES.lock();
    let table = tables.entry(owner).or_insert_with(FdTable::new);
    table.open(handle)
}

pub fn with_handle<R>(owner: ThreadId, fd: i32, f: impl FnOnce(&mut FileHandle) -> R) -> Option<R> {
    let mut tables = TABLES.lock();
    tables.get_mut(&owner).and_then(|t| t.get_mut(fd)).map(f)
}

pub fn close(owner: ThreadId, fd: i32) -> bool {
    let mut tables = TABLES.lock();
    tables.get_mut(&owner).map(|t| t.close(fd)).unwrap_or(false)
}

/// Closes and forgets every fd belonging to `owner` (spec §4.5: "exit
/// closes all fds in order").
pub fn close_all(owner: ThreadId) {
    let mut tables = TABLES.lock();
    if let Some(table) = tables.get_mut(&owner) {
        table.close_all();
    }
    tables.remove(&owner);
}

#[cfg(all(test, feature = "unit-test"))]
mod tests {
    use super::*;
    use alloc::string::String;

    fn mk_handle(name: &str) -> FileHandle {
        let mut fs = crate::fs::FILESYS.lock();
        let _ = fs.create(name, 0);
        fs.open(name).unwrap()
    }

    #[test]
    fn fd_allocation_starts_at_two_and_is_monotone() {
        let owner = ThreadId(9001);
        create_table(owner);
        let fd1 = open(owner, mk_handle("a.txt"));
        let fd2 = open(owner, mk_handle("b.txt"));
        assert_eq!(fd1, 2);
        assert_eq!(fd2, 3);
        close_all(owner);
    }

    #[test]
    fn closing_middle_fd_then_opening_reuses_greatest_plus_one() {
        let owner = ThreadId(9002);
        create_table(owner);
        let fd1 = open(owner, mk_handle("c.txt"));
        let fd2 = open(owner, mk_handle("d.txt"));
        assert!(close(owner, fd1));
        let fd3 = open(owner, mk_handle("e.txt"));
        assert_eq!(fd3, fd2 + 1);
        close_all(owner);
    }

    #[test]
    fn close_all_empties_table() {
        let owner = ThreadId(9003);
        create_table(owner);
        open(owner, mk_handle("f.txt"));
        close_all(owner);
        assert!(with_handle(owner, 2, |_| ()).is_none());
        let _ = String::new();
    }
}
