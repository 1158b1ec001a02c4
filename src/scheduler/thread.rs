/*
 * Thread Control Block
 *
 * One `Thread` per kernel thread, placed at the base of a single 4 KiB
 * page whose remainder is that thread's kernel stack:
 *
 *   4 kB +---------------------------------+
 *        |          kernel stack           |
 *        |               |                 |
 *        |               v                 |
 *        |          grows downward         |
 *        +---------------------------------+
 *        |             magic               |
 *        |              ...                |
 *        |             status              |
 *        |              tid                |
 *   0 kB +---------------------------------+
 *
 * Two consequences of this layout:
 *
 * 1. The running thread is recovered by masking the stack pointer down to
 *    the page boundary (`running_thread()`); the control block is always
 *    at the base.
 * 2. The control block must stay small, or the stack suffers. `magic` is
 *    the struct's final field, directly under the stack: a stack overflow
 *    corrupts it first, and every state transition checks it.
 *
 * Threads are referenced throughout the scheduler by `ThreadRef`, a copyable
 * handle to the page-resident control block. Pages never move while a
 * thread is alive, so handles stay valid until the page is returned to the
 * pool by the deferred destruction path.
 */

use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;

use super::context::SwitchFrame;
use crate::memory::page::PAGE_SIZE;
use crate::sync::Lock;

/// Lowest priority (the idle thread runs here).
pub const PRI_MIN: u8 = 0;
/// Default priority for new threads.
pub const PRI_DEFAULT: u8 = 31;
/// Highest priority.
pub const PRI_MAX: u8 = 63;

/// Capacity of a thread's name, in bytes.
pub const NAME_CAP: usize = 16;

/// Sentinel detecting stack overflow into the control block.
const THREAD_MAGIC: u32 = 0x74c9_52ed;

/// Thread identifier. Monotonic, never recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Executing on the CPU. Exactly one thread at a time.
    Running,
    /// Runnable, waiting in the ready queue.
    Ready,
    /// Waiting on an event; not schedulable until unblocked.
    Blocked,
    /// Finished; the backing page is reclaimed by the next scheduling
    /// decision after the final switch away.
    Dying,
}

/// Thread control block. Lives at the base of the thread's page.
#[repr(C)]
pub struct Thread {
    tid: Tid,
    status: ThreadStatus,
    name: heapless::String<NAME_CAP>,
    /// Effective priority: what the scheduler sorts on. May exceed
    /// `init_priority` while donations are in effect.
    priority: u8,
    /// The priority last set explicitly; donations never change it.
    init_priority: u8,
    /// Absolute tick at which a sleeping thread becomes runnable again.
    wakeup: u64,
    /// Lock this thread is blocked on, if any. Used to walk the donation
    /// chain.
    wait_on_lock: *const Lock,
    /// Threads currently donating their priority to this one (they are
    /// blocked on locks this thread holds). Kept in descending priority
    /// order.
    donations: Vec<ThreadRef>,
    /// Saved CPU state, loaded via iretq to resume the thread.
    frame: SwitchFrame,
    /// Must remain `THREAD_MAGIC`; sits directly below the stack.
    magic: u32,
}

/// Copyable handle to a page-resident thread control block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThreadRef(NonNull<Thread>);

// Handles are passed between threads through scheduler queues; all access
// happens with interrupts disabled on a single CPU.
unsafe impl Send for ThreadRef {}

impl ThreadRef {
    /// Rebuild a handle from a raw control block pointer.
    pub(crate) unsafe fn from_raw(ptr: *mut Thread) -> ThreadRef {
        ThreadRef(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Handle for the control block at the base of `page`.
    pub(crate) unsafe fn from_page(page_base: u64) -> ThreadRef {
        ThreadRef(unsafe { NonNull::new_unchecked(page_base as *mut Thread) })
    }

    /// Write a freshly initialized, `Blocked` control block at the base of
    /// `page` and return its handle. The page must be zeroed and must not
    /// already host a live thread.
    pub(crate) unsafe fn init_at(page: NonNull<u8>, name: &str, priority: u8) -> ThreadRef {
        assert!(priority <= PRI_MAX);

        let base = page.as_ptr();
        let stack_top = base as u64 + PAGE_SIZE as u64 - 8;

        let mut short_name = heapless::String::new();
        for c in name.chars().take(NAME_CAP) {
            let _ = short_name.push(c);
        }

        let tcb = base as *mut Thread;
        unsafe {
            tcb.write(Thread {
                tid: Tid(0),
                status: ThreadStatus::Blocked,
                name: short_name,
                priority,
                init_priority: priority,
                wakeup: 0,
                wait_on_lock: core::ptr::null(),
                donations: Vec::new(),
                frame: SwitchFrame::initial(stack_top),
                magic: THREAD_MAGIC,
            });
        }

        unsafe { ThreadRef::from_raw(tcb) }
    }

    pub(crate) fn as_ptr(self) -> *mut Thread {
        self.0.as_ptr()
    }

    fn get(self) -> &'static Thread {
        unsafe { &*self.0.as_ptr() }
    }

    /// True if the control block still carries the sentinel. A mismatch
    /// means the thread overflowed its stack.
    pub(crate) fn is_valid(self) -> bool {
        self.get().magic == THREAD_MAGIC
    }

    pub(crate) fn tid(self) -> Tid {
        self.get().tid
    }

    pub(crate) fn set_tid(self, tid: Tid) {
        unsafe { (*self.as_ptr()).tid = tid };
    }

    pub(crate) fn name(self) -> heapless::String<NAME_CAP> {
        self.get().name.clone()
    }

    pub(crate) fn status(self) -> ThreadStatus {
        self.get().status
    }

    pub(crate) fn set_status(self, status: ThreadStatus) {
        assert!(self.is_valid(), "stack overflow corrupted a control block");
        unsafe { (*self.as_ptr()).status = status };
    }

    pub(crate) fn priority(self) -> u8 {
        self.get().priority
    }

    /// Overwrite the effective priority without touching `init_priority`.
    /// This is the donation path; explicit changes go through
    /// `set_priority`.
    pub(crate) fn set_priority_raw(self, priority: u8) {
        unsafe { (*self.as_ptr()).priority = priority };
    }

    pub(crate) fn init_priority(self) -> u8 {
        self.get().init_priority
    }

    pub(crate) fn set_init_priority(self, priority: u8) {
        assert!(priority <= PRI_MAX);
        unsafe { (*self.as_ptr()).init_priority = priority };
    }

    pub(crate) fn wakeup(self) -> u64 {
        self.get().wakeup
    }

    pub(crate) fn set_wakeup(self, tick: u64) {
        unsafe { (*self.as_ptr()).wakeup = tick };
    }

    pub(crate) fn wait_on_lock(self) -> *const Lock {
        self.get().wait_on_lock
    }

    pub(crate) fn set_wait_on_lock(self, lock: *const Lock) {
        unsafe { (*self.as_ptr()).wait_on_lock = lock };
    }

    pub(crate) fn frame_ptr(self) -> *mut SwitchFrame {
        unsafe { &raw mut (*self.as_ptr()).frame }
    }

    /// Record `donor` in this thread's donation set, keeping the set in
    /// descending priority order with stable ties.
    pub(crate) fn add_donor(self, donor: ThreadRef) {
        let donations = unsafe { &mut (*self.as_ptr()).donations };
        let pos = donations
            .iter()
            .position(|d| super::outranks(donor, *d))
            .unwrap_or(donations.len());
        donations.insert(pos, donor);
    }

    /// Drop every donor that is blocked on `lock`.
    pub(crate) fn remove_donors_for(self, lock: *const Lock) {
        let donations = unsafe { &mut (*self.as_ptr()).donations };
        donations.retain(|d| d.wait_on_lock() != lock);
    }

    /// Re-sort the donation set (donor priorities change underneath it)
    /// and return the strongest donor, if any.
    pub(crate) fn strongest_donor(self) -> Option<ThreadRef> {
        let donations = unsafe { &mut (*self.as_ptr()).donations };
        if donations.is_empty() {
            return None;
        }
        donations.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Some(donations[0])
    }
}

impl fmt::Debug for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.get();
        f.debug_struct("Thread")
            .field("tid", &t.tid)
            .field("name", &t.name)
            .field("status", &t.status)
            .field("priority", &t.priority)
            .finish()
    }
}
