//! User process spawn, load, wait and exit (spec §4.4). Grounded in the
//! teacher crate's `loader::elf` trampoline pattern (a pending-task slot
//! read back by the freshly scheduled thread) and `scheduler::task::Process`
//! for the parent/child bookkeeping shape, generalized to the spec's
//! rendezvous-semaphore handshake rather than the teacher's direct
//! `Vec<ProcessId>` children list with no load/wait/exit protocol at all.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use spin::Mutex;

use crate::arch;
use crate::config::PGSIZE;
use crate::fs::FileHandle;
use crate::loader;
use crate::memory::paging::PageDirectory;
use crate::sync::{Lock, Semaphore};
use crate::thread::{self, ThreadId};

const USER_STACK_SIZE: usize = PGSIZE * crate::config::USER_STACK_PAGES;

/// Serialises every file-system-touching operation, including the file
/// reads `load` performs (spec §4.5: "a single global file-system lock").
pub static FILESYS_LOCK: Lock = Lock::new();

struct ProcessInfo {
    parent: Option<ThreadId>,
    children: Vec<ThreadId>,
    /// Children already consumed by a successful `process_wait` call.
    waited: Vec<ThreadId>,
    rendezvous: Semaphore,
    /// Set by the child itself once `load` has succeeded or failed.
    load_status: Mutex<Option<i32>>,
    exit_status: Mutex<Option<i32>>,
    page_dir: Mutex<Option<Box<PageDirectory>>>,
    /// Kept open (and write-denied) for the life of the process.
    executable: Mutex<Option<FileHandle>>,
}

impl ProcessInfo {
    fn new(parent: Option<ThreadId>) -> Self {
        ProcessInfo {
            parent,
            children: Vec::new(),
            waited: Vec::new(),
            rendezvous: Semaphore::new(0),
            load_status: Mutex::new(None),
            exit_status: Mutex::new(None),
            page_dir: Mutex::new(None),
            executable: Mutex::new(None),
        }
    }
}

/// Boxed so each `ProcessInfo`'s address is stable across further
/// `BTreeMap` inserts/removes (a B-tree may relocate entries within its
/// nodes on rebalance; the `Box`'s heap allocation never moves). This is
/// what lets `rendezvous_of` hand out a reference that outlives the
/// registry lock guard.
lazy_static::lazy_static! {
    static ref REGISTRY: Mutex<BTreeMap<ThreadId, Box<ProcessInfo>>> = Mutex::new(BTreeMap::new());
    static ref PENDING: Mutex<BTreeMap<ThreadId, PendingLoad>> = Mutex::new(BTreeMap::new());
}

struct PendingLoad {
    argv: Vec<String>,
}

fn tokenize(command_line: &str) -> Vec<String> {
    command_line.split(' ').filter(|s| !s.is_empty()).map(String::from).collect()
}

/// `process_execute`: spawn a new process running `command_line`, blocking
/// until the child reports that it has (or has not) finished loading.
/// Returns the child's tid on success, `-1` otherwise.
pub fn process_execute(command_line: &str) -> i32 {
    let argv = tokenize(command_line);
    let Some(name) = argv.first().cloned() else { return -1 };

    let parent = thread::current_id();
    REGISTRY.lock().entry(parent).or_insert_with(|| Box::new(ProcessInfo::new(None)));

    let child = thread::create(&name, thread::effective_priority(parent), child_entry_trampoline);
    PENDING.lock().insert(child, PendingLoad { argv });
    REGISTRY.lock().insert(child, Box::new(ProcessInfo::new(Some(parent))));
    {
        let mut registry = REGISTRY.lock();
        if let Some(info) = registry.get_mut(&parent) {
            info.children.push(child);
        }
    }

    // Block until the child's `load` has reported success or failure.
    rendezvous_of(parent).down();

    REGISTRY.lock().get(&child).and_then(|info| *info.load_status.lock()).unwrap_or(-1)
}

fn rendezvous_of(id: ThreadId) -> &'static Semaphore {
    // Safety note: each `ProcessInfo` is boxed, so its address is stable
    // regardless of how the surrounding `BTreeMap` rebalances, and entries
    // are only ever removed by `process_exit`'s final cleanup, which by
    // construction happens after nobody can still be waiting on this
    // semaphore. Extending the borrow to 'static lets both the waiting
    // parent and the signalling child hold a reference across their own
    // separate `REGISTRY.lock()` critical sections without holding the
    // registry lock across a blocking `down()`.
    let registry = REGISTRY.lock();
    let info = registry.get(&id).expect("process registered");
    unsafe { &*(&info.rendezvous as *const Semaphore) }
}

extern "C" fn child_entry_trampoline() -> ! {
    let me = thread::current_id();
    let PendingLoad { argv } = PENDING.lock().remove(&me).expect("pending load for scheduled child");
    crate::fd::create_table(me);

    let parent = REGISTRY.lock().get(&me).and_then(|info| info.parent);

    match load(&argv) {
        Ok((entry, esp)) => {
            crate::log_info!("process: {:?} loaded '{}' successfully.", me, argv.first().map(String::as_str).unwrap_or(""));
            if let Some(info_parent) = parent {
                if let Some(info) = REGISTRY.lock().get(&me) {
                    *info.load_status.lock() = Some(me.0 as i32);
                }
                rendezvous_of(info_parent).up();
            }
            let user_cs = arch::gdt::user_code_selector().0;
            let user_ss = arch::gdt::user_data_selector().0;
            arch::usermode::jump_to_usermode(entry, esp, user_cs, user_ss);
        }
        Err(e) => {
            crate::log_warn!("process: {:?} failed to load '{}': {}.", me, argv.first().map(String::as_str).unwrap_or(""), e);
            if let Some(info) = REGISTRY.lock().get(&me) {
                *info.load_status.lock() = Some(-1);
            }
            if let Some(info_parent) = parent {
                rendezvous_of(info_parent).up();
            }
            process_exit(-1);
        }
    }
}

/// `load`: create a page directory, open and ELF-parse the executable,
/// map its segments, and build the initial user stack (spec §4.4 steps
/// 1–5). Returns `(entry_point, initial_esp)`.
fn load(argv: &[String]) -> Result<(u32, u32), loader::LoadError> {
    let name = argv.first().ok_or(loader::LoadError::NotFound)?;

    FILESYS_LOCK.acquire();
    let mut fs = crate::fs::FILESYS.lock();
    let mut handle = fs.open(name).map_err(|_| loader::LoadError::NotFound)?;
    drop(fs);
    let image = handle.read_all();

    let mut dir = PageDirectory::create();
    let loaded = loader::elf::load_into(&image, &mut dir);
    let loaded = match loaded {
        Ok(l) => l,
        Err(e) => {
            FILESYS_LOCK.release();
            return Err(e);
        }
    };

    let top = crate::config::PHYS_BASE;
    let mut page = top - PGSIZE as u32;
    for _ in 0..(USER_STACK_SIZE / PGSIZE) {
        if !dir.set_page(page) {
            FILESYS_LOCK.release();
            return Err(loader::LoadError::OutOfMemory);
        }
        page = page.wrapping_sub(PGSIZE as u32);
    }

    let esp = loader::stack::build_initial_stack(&mut dir, argv).ok_or(loader::LoadError::MappingFailed)?;

    handle.deny_write();

    let me = thread::current_id();
    if let Some(info) = REGISTRY.lock().get(&me) {
        *info.page_dir.lock() = Some(dir);
        *info.executable.lock() = Some(handle);
    }
    FILESYS_LOCK.release();

    Ok((loaded.entry, esp))
}

/// `process_wait`: block until `child_tid` (a direct, not-yet-waited
/// child of the caller) has died, then return its reported exit status.
/// Returns `-1` if `child_tid` is not such a child.
pub fn process_wait(child_tid: i32) -> i32 {
    let me = thread::current_id();
    let child = ThreadId(child_tid as u64);

    let eligible = {
        let registry = REGISTRY.lock();
        registry
            .get(&me)
            .map(|info| info.children.contains(&child) && !info.waited.contains(&child))
            .unwrap_or(false)
    };
    if !eligible {
        return -1;
    }
    {
        let mut registry = REGISTRY.lock();
        if let Some(info) = registry.get_mut(&me) {
            info.waited.push(child);
        }
    }

    rendezvous_of(child).up(); // permit the child to die
    rendezvous_of(me).down(); // wait for it to actually die and report status

    REGISTRY.lock().get(&child).and_then(|info| *info.exit_status.lock()).unwrap_or(-1)
}

/// `process_exit`: record the exit status, release the parent and every
/// child, block until permitted to die (spec §5's "released from their
/// rendezvous wait"), tear down the page directory, and terminate the
/// thread. Never returns.
pub fn process_exit(status: i32) -> ! {
    let me = thread::current_id();
    let name = thread::current_name();
    crate::device::putbuf(alloc::format!("{}: exit({})\n", name, status).as_bytes());

    crate::fd::close_all(me);

    let (parent, children) = {
        let registry = REGISTRY.lock();
        registry.get(&me).map(|info| (info.parent, info.children.clone())).unwrap_or((None, Vec::new()))
    };

    if let Some(info) = REGISTRY.lock().get(&me) {
        *info.exit_status.lock() = Some(status);
    }

    let parent_alive = parent.map(|p| REGISTRY.lock().contains_key(&p)).unwrap_or(false);
    if parent_alive {
        rendezvous_of(parent.unwrap()).up();
    }

    for child in children {
        if REGISTRY.lock().contains_key(&child) {
            rendezvous_of(child).up();
        }
    }

    // Wait to be "permitted to die" by a parent `process_wait` call or by
    // the parent's own exit releasing all of its children unconditionally.
    // A process nobody ever waits on, whose parent also never exits,
    // remains a blocked zombie indefinitely — the same bounded leak a
    // real OS accepts for an un-reaped zombie.
    if parent_alive {
        rendezvous_of(me).down();
    }

    if let Some(info) = REGISTRY.lock().get(&me) {
        let mut dir_slot = info.page_dir.lock();
        if let Some(dir) = dir_slot.take() {
            crate::memory::paging::activate(None);
            crate::memory::paging::destroy(dir);
        }
        *info.executable.lock() = None; // drops the handle, restoring write access
    }

    REGISTRY.lock().remove(&me);
    thread::reap(me);
    thread::yield_now();
    unreachable!("a reaped thread must never be scheduled again");
}

/// Gives the syscall dispatcher access to the calling thread's simulated
/// address space for user-pointer validation and argument marshalling
/// (spec §4.5). Returns `None` for a thread with no registered process
/// (i.e. not spawned via `process_execute`).
pub fn with_current_page_dir<R>(f: impl FnOnce(&mut PageDirectory) -> R) -> Option<R> {
    let me = thread::current_id();
    let registry = REGISTRY.lock();
    let info = registry.get(&me)?;
    let mut slot = info.page_dir.lock();
    slot.as_deref_mut().map(f)
}

/// Invoked from the page-fault and general-protection-fault handlers:
/// user-mode exceptions other than a controlled `exit` syscall are fatal
/// to the offending process (spec §7).
pub fn exit_current_faulting(status: i32) -> ! {
    process_exit(status)
}
