/*
 * Preemptive Priority Scheduler
 *
 * Strict priority scheduling over a single CPU with priority donation and
 * a tick-driven sleep service.
 *
 * THREAD LIFECYCLE:
 * ================
 *
 *   spawn -> Blocked (during setup) -> Ready -> Running
 *               ^                        ^        |
 *               |                        +--------+  (yield / preemption)
 *               +--- block/sleep --------+--------+
 *                                                 |
 *                                               Dying -> page reclaimed
 *
 * SCHEDULING:
 * ===========
 *
 * The ready queue is kept in strictly descending priority order with
 * stable FIFO ties. Selection pops the front; if the queue is empty the
 * idle thread runs. Preemption is enforced two ways:
 *
 * - Synchronously, via `test_max_priority()`: after spawning a thread,
 *   changing a priority, or releasing a lock, the running thread yields
 *   if the front of the ready queue now outranks it.
 * - At tick boundaries: once a thread has run for TIME_SLICE ticks the
 *   timer handler requests a deferred yield (`yield_on_return`), serviced
 *   at the handler tail.
 *
 * INTERRUPT DISCIPLINE:
 * ====================
 *
 * Every state transition runs with interrupts disabled; the global run
 * state lives behind a spin mutex that is only ever taken in such a
 * section, which makes it safe against the timer interrupt. The mutex is
 * released before the actual context switch: the incoming thread may well
 * take it again immediately.
 *
 * DEFERRED DESTRUCTION:
 * ====================
 *
 * An exiting thread cannot free its own page - it is still executing on
 * the stack inside it. `schedule()` queues dying threads on a destruction
 * list after switching away from them, and reclaims the queued pages at
 * the top of the next scheduling decision, when execution is guaranteed
 * to be on some other thread's stack.
 */

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};

use spin::Mutex;

mod context;
mod donation;
mod sleep;
mod thread;

pub use donation::{donate_priority, refresh_priority, remove_with_lock};
pub use sleep::{awake, sleep};
pub use thread::{NAME_CAP, PRI_DEFAULT, PRI_MAX, PRI_MIN, Thread, ThreadStatus, Tid};

pub(crate) use thread::ThreadRef;

use crate::arch::x86_64::interrupts::{self, DisableInterrupts};
use crate::memory::page::{self, PAGE_SIZE};
use crate::sync::Semaphore;

/// Signature of a thread's entry function.
pub type ThreadFunc = fn(usize);

/// Timer ticks each thread gets before preemption.
pub const TIME_SLICE: u32 = 4;

/// Thread creation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// No page left in the pool for the control block + stack.
    OutOfMemory,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::OutOfMemory => write!(f, "out of thread pages"),
        }
    }
}

/// Run state shared by every scheduler entry point.
struct SchedState {
    /// Runnable threads, descending priority, FIFO within a priority.
    /// Excludes the running thread and the idle thread.
    ready: VecDeque<ThreadRef>,
    /// Threads waiting for a wake tick. Unordered; scanned once per tick.
    sleepers: Vec<ThreadRef>,
    /// Dying threads whose page is still their active stack until the
    /// switch away from them completes.
    graveyard: VecDeque<ThreadRef>,
}

impl SchedState {
    fn new() -> SchedState {
        // Capacity covers every thread the page pool can back (plus the
        // initial thread); queue operations in interrupt context must
        // never allocate.
        let cap = page::POOL_PAGES + 1;
        SchedState {
            ready: VecDeque::with_capacity(cap),
            sleepers: Vec::with_capacity(cap),
            graveyard: VecDeque::with_capacity(cap),
        }
    }

    /// Insert `t` into the ready queue at its priority position, after
    /// any thread of equal priority already queued.
    fn insert_ready(&mut self, t: ThreadRef) {
        let pos = self
            .ready
            .iter()
            .position(|r| outranks(t, *r))
            .unwrap_or(self.ready.len());
        self.ready.insert(pos, t);
    }
}

/// Global run state. Only ever locked with interrupts disabled.
static SCHED: Mutex<Option<SchedState>> = Mutex::new(None);

/// The idle thread, once it has announced itself.
static IDLE_THREAD: AtomicPtr<Thread> = AtomicPtr::new(core::ptr::null_mut());

/// The boot thread adopted by `init()`. Never destroyed.
static INITIAL_THREAD: AtomicPtr<Thread> = AtomicPtr::new(core::ptr::null_mut());

/// Ticks spent in the idle thread / in kernel threads / in user code.
static IDLE_TICKS: AtomicU64 = AtomicU64::new(0);
static KERNEL_TICKS: AtomicU64 = AtomicU64::new(0);
static USER_TICKS: AtomicU64 = AtomicU64::new(0);

/// Ticks the running thread has held the CPU since it was scheduled.
static THREAD_TICKS: AtomicU32 = AtomicU32::new(0);

/// Multi-level feedback queue flag. Readable, behaviorally inert: the
/// accounting behind it is not implemented.
static MLFQS: AtomicBool = AtomicBool::new(false);

/// Next thread id, guarded by `TID_LOCK`.
static NEXT_TID: AtomicU32 = AtomicU32::new(1);
static TID_LOCK: crate::sync::Lock = crate::sync::Lock::new();

/// Run `f` on the global run state. Callers must already have interrupts
/// disabled; that is what makes the lock safe against the timer handler.
fn with_sched<R>(f: impl FnOnce(&mut SchedState) -> R) -> R {
    assert!(!interrupts::are_enabled());
    let mut guard = SCHED.lock();
    f(guard.as_mut().expect("scheduler not initialized"))
}

/// Ordering predicate for all priority-sorted thread containers:
/// true when `a` outranks `b`.
pub(crate) fn outranks(a: ThreadRef, b: ThreadRef) -> bool {
    a.priority() > b.priority()
}

/// Handle to the thread whose stack we are running on, recovered by
/// masking the stack pointer down to its page boundary.
pub(crate) fn running_thread() -> ThreadRef {
    let rsp: u64;
    unsafe {
        core::arch::asm!("mov {}, rsp", out(reg) rsp, options(nomem, nostack, preserves_flags));
    }
    unsafe { ThreadRef::from_page(rsp & !(PAGE_SIZE as u64 - 1)) }
}

/// The running thread, with sanity checks: the control block sentinel
/// must be intact (a mismatch means this thread overflowed its stack) and
/// its status must be Running.
pub(crate) fn current() -> ThreadRef {
    let t = running_thread();
    assert!(t.is_valid(), "stack overflow corrupted a control block");
    assert_eq!(t.status(), ThreadStatus::Running);
    t
}

/// Tid of the running thread.
pub fn current_tid() -> Tid {
    current().tid()
}

/// Name of the running thread.
pub fn current_name() -> heapless::String<NAME_CAP> {
    current().name()
}

/// Initialize the thread system by adopting the code currently running as
/// the first thread. Interrupts must still be off.
///
/// This works only because the boot stack occupies a single page-aligned
/// page: the control block is written at its base, below the live stack.
pub fn init() {
    assert!(!interrupts::are_enabled());

    *SCHED.lock() = Some(SchedState::new());

    let rsp: u64;
    unsafe {
        core::arch::asm!("mov {}, rsp", out(reg) rsp, options(nomem, nostack, preserves_flags));
    }
    let page_base = rsp & !(PAGE_SIZE as u64 - 1);
    let initial = unsafe {
        ThreadRef::init_at(
            NonNull::new(page_base as *mut u8).expect("boot stack at page zero"),
            "main",
            PRI_DEFAULT,
        )
    };
    initial.set_status(ThreadStatus::Running);
    INITIAL_THREAD.store(initial.as_ptr(), Ordering::SeqCst);
    initial.set_tid(allocate_tid());

    log::info!("thread system initialized (boot thread adopted as 'main')");
}

/// Start preemptive scheduling: spawn the idle thread and enable
/// interrupts. Returns once the idle thread has announced itself.
pub fn start() {
    let idle_started = Semaphore::new(0);
    spawn(
        "idle",
        PRI_MIN,
        idle,
        &idle_started as *const Semaphore as usize,
    )
    .expect("out of pages while creating the idle thread");

    interrupts::enable();

    idle_started.down();
}

/// Per-tick accounting, called by the timer interrupt handler. Runs in
/// interrupt context.
pub fn tick() {
    let t = current();

    if t.as_ptr() == IDLE_THREAD.load(Ordering::SeqCst) {
        IDLE_TICKS.fetch_add(1, Ordering::SeqCst);
    } else {
        KERNEL_TICKS.fetch_add(1, Ordering::SeqCst);
    }

    // Enforce preemption at time slice boundaries.
    if THREAD_TICKS.fetch_add(1, Ordering::SeqCst) + 1 >= TIME_SLICE {
        interrupts::yield_on_return();
    }
}

/// Log per-class tick totals.
pub fn print_stats() {
    log::info!(
        "Thread: {} idle ticks, {} kernel ticks, {} user ticks",
        IDLE_TICKS.load(Ordering::SeqCst),
        KERNEL_TICKS.load(Ordering::SeqCst),
        USER_TICKS.load(Ordering::SeqCst),
    );
}

/// Create a new kernel thread executing `function(aux)` at `priority`.
///
/// The thread may run before this returns (it will, whenever it outranks
/// the caller); it may even have exited already. Use a semaphore for any
/// ordering the caller needs.
pub fn spawn(name: &str, priority: u8, function: ThreadFunc, aux: usize) -> Result<Tid, SpawnError> {
    assert!(priority <= PRI_MAX);

    let page = page::alloc_page(true).ok_or(SpawnError::OutOfMemory)?;
    let t = unsafe { ThreadRef::init_at(page, name, priority) };
    let tid = allocate_tid();
    t.set_tid(tid);

    // First dispatch enters the trampoline with the entry function and
    // its argument in the argument registers.
    unsafe {
        let frame = &mut *t.frame_ptr();
        frame.rip = kernel_thread as usize as u64;
        frame.regs.rdi = function as usize as u64;
        frame.regs.rsi = aux as u64;
    }

    unblock(t);
    test_max_priority();

    Ok(tid)
}

/// Entry trampoline for every spawned thread. The scheduler dispatches
/// with interrupts off; re-enable them, run the thread's body, and exit
/// on its behalf if it returns.
extern "C" fn kernel_thread(function: ThreadFunc, aux: usize) -> ! {
    interrupts::enable();
    function(aux);
    exit();
}

/// Put the running thread to sleep until someone calls `unblock` on it.
/// Must be called with interrupts off, from thread context. Usually the
/// synchronization primitives are the better interface.
pub fn block() {
    assert!(!interrupts::in_interrupt_context());
    assert!(!interrupts::are_enabled());

    current().set_status(ThreadStatus::Blocked);
    schedule();
}

/// Move a blocked thread to the ready queue.
///
/// Does not preempt: the caller may be relying on atomically unblocking a
/// thread and updating other state. Preemption points run
/// `test_max_priority()` themselves.
pub(crate) fn unblock(t: ThreadRef) {
    assert!(t.is_valid());

    let _level = DisableInterrupts::new();
    assert_eq!(t.status(), ThreadStatus::Blocked);
    with_sched(|s| s.insert_ready(t));
    t.set_status(ThreadStatus::Ready);
}

/// Give up the CPU. The running thread goes back into the ready queue at
/// its priority position and may be rescheduled immediately.
pub fn yield_now() {
    assert!(!interrupts::in_interrupt_context());

    let _level = DisableInterrupts::new();
    let cur = current();
    if cur.as_ptr() != IDLE_THREAD.load(Ordering::SeqCst) {
        with_sched(|s| s.insert_ready(cur));
    }
    do_schedule(ThreadStatus::Ready);
}

/// Terminate the running thread. Its page is reclaimed by the next
/// scheduling decision after the switch away. Never returns.
pub fn exit() -> ! {
    assert!(!interrupts::in_interrupt_context());

    interrupts::disable();
    do_schedule(ThreadStatus::Dying);
    unreachable!("a dying thread was scheduled again");
}

/// Set the running thread's base priority.
///
/// The effective priority only drops if no active donation outranks the
/// new value; either way, a thread that no longer outranks the ready
/// queue front yields immediately.
pub fn set_priority(new_priority: u8) {
    assert!(new_priority <= PRI_MAX);

    {
        let _level = DisableInterrupts::new();
        current().set_init_priority(new_priority);
        donation::refresh_priority();
    }
    test_max_priority();
}

/// Effective priority of the running thread.
pub fn get_priority() -> u8 {
    current().priority()
}

/// Yield if the front of the ready queue outranks the running thread.
/// Runs after spawning, priority changes, and lock release. Never called
/// from interrupt context (the timer uses the deferred yield instead).
pub fn test_max_priority() {
    let front_priority = {
        let _level = DisableInterrupts::new();
        with_sched(|s| s.ready.front().map(|t| t.priority()))
    };

    if let Some(front_priority) = front_priority {
        if front_priority > current().priority() {
            yield_now();
        }
    }
}

// Multi-level feedback queue surface. The flag is readable but the
// accounting behind it is not implemented; these return neutral values.

pub fn mlfqs_enabled() -> bool {
    MLFQS.load(Ordering::SeqCst)
}

pub fn set_nice(_nice: i32) {}

pub fn get_nice() -> i32 {
    0
}

pub fn get_load_avg() -> i32 {
    0
}

pub fn get_recent_cpu() -> i32 {
    0
}

/// Idle thread body. Announces itself, releases `start()`, then halts
/// the CPU between interrupts. Scheduled only when the ready queue is
/// empty; never appears in the queue itself.
fn idle(started: usize) {
    let started = unsafe { &*(started as *const Semaphore) };

    IDLE_THREAD.store(current().as_ptr(), Ordering::SeqCst);
    started.up();

    loop {
        // Let someone else run.
        interrupts::disable();
        block();

        // Re-enable interrupts and wait for the next one. `sti` holds
        // interrupts off until the following instruction completes, so
        // the pair is atomic; a tick cannot slip in between.
        unsafe {
            core::arch::asm!("sti; hlt", options(nomem, nostack));
        }
    }
}

/// Mark the running thread and pick the next one. Interrupts must be off.
fn do_schedule(status: ThreadStatus) {
    assert!(!interrupts::are_enabled());
    assert_eq!(running_thread().status(), ThreadStatus::Running);

    running_thread().set_status(status);
    schedule();
}

/// The single point of context switch. Reclaims any pages queued by
/// earlier exits, picks the highest-priority ready thread (idle if none),
/// and switches to it.
fn schedule() {
    assert!(!interrupts::are_enabled());

    let curr = running_thread();
    assert!(curr.status() != ThreadStatus::Running);

    let next = with_sched(|s| {
        // Previous switches have moved execution off these stacks; the
        // pages can go back to the pool now.
        while let Some(dead) = s.graveyard.pop_front() {
            assert!(dead != curr);
            unsafe {
                core::ptr::drop_in_place(dead.as_ptr());
                page::free_page(NonNull::new_unchecked(dead.as_ptr() as *mut u8));
            }
        }

        s.ready.pop_front()
    });

    let next = next.unwrap_or_else(|| {
        let idle = IDLE_THREAD.load(Ordering::SeqCst);
        assert!(!idle.is_null(), "nothing runnable and no idle thread yet");
        unsafe { ThreadRef::from_raw(idle) }
    });

    assert!(next.is_valid());
    next.set_status(ThreadStatus::Running);

    // Start a fresh time slice.
    THREAD_TICKS.store(0, Ordering::SeqCst);

    if curr != next {
        // A dying thread's page is its active stack until the switch
        // below completes; queue it instead of freeing it here. The boot
        // thread's page is not pool-owned and is never reclaimed.
        if curr.status() == ThreadStatus::Dying
            && curr.as_ptr() != INITIAL_THREAD.load(Ordering::SeqCst)
        {
            with_sched(|s| s.graveyard.push_back(curr));
        }

        unsafe {
            context::switch_frames(curr.frame_ptr(), next.frame_ptr());
        }
        // Back on this thread's stack: someone scheduled us again.
    }
}

/// Hand out the next thread id under its dedicated lock.
fn allocate_tid() -> Tid {
    TID_LOCK.acquire();
    let tid = Tid(NEXT_TID.fetch_add(1, Ordering::Relaxed));
    TID_LOCK.release();
    tid
}
