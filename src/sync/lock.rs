/*
 * Blocking Lock with Priority Donation
 *
 * A semaphore-of-one plus an owner field. What makes it more than that is
 * its participation in the donation protocol:
 *
 * ACQUIRE (contended):
 * 1. Record the lock in the acquirer's `wait_on_lock`
 * 2. Insert the acquirer into the holder's donation set
 * 3. `donate_priority()` - the acquirer's priority propagates along the
 *    chain of holders, up to the donation depth limit
 * 4. Block on the semaphore; on wake, clear `wait_on_lock` and take
 *    ownership
 *
 * RELEASE:
 * 1. `remove_with_lock()` - donations from this lock's waiters are
 *    discarded
 * 2. `refresh_priority()` - the holder falls back to its base priority
 *    or its strongest remaining donor
 * 3. Clear the owner, `up` the semaphore
 * 4. `test_max_priority()` - release is a preemption point: if the woken
 *    waiter outranks us, it runs now
 */

use core::sync::atomic::{AtomicPtr, Ordering};

use super::Semaphore;
use crate::arch::x86_64::interrupts::{self, DisableInterrupts};
use crate::scheduler::{self, Thread, ThreadRef};

/// Blocking mutual-exclusion lock.
pub struct Lock {
    /// Owning thread's control block; null while the lock is free.
    holder: AtomicPtr<Thread>,
    sema: Semaphore,
}

impl Lock {
    /// New unheld lock.
    pub const fn new() -> Lock {
        Lock {
            holder: AtomicPtr::new(core::ptr::null_mut()),
            sema: Semaphore::new(1),
        }
    }

    /// The holder's control block, if the lock is currently held.
    pub(crate) fn holder_ref(&self) -> Option<ThreadRef> {
        let holder = self.holder.load(Ordering::SeqCst);
        if holder.is_null() {
            None
        } else {
            Some(unsafe { ThreadRef::from_raw(holder) })
        }
    }

    /// True if the running thread holds this lock.
    pub fn held_by_current(&self) -> bool {
        self.holder.load(Ordering::SeqCst) == scheduler::current().as_ptr()
    }

    /// Acquire the lock, blocking until it is available. Donates the
    /// caller's priority to the holder chain while blocked. Not legal in
    /// interrupt context, and not recursive.
    pub fn acquire(&self) {
        assert!(!interrupts::in_interrupt_context());
        assert!(!self.held_by_current());

        let _level = DisableInterrupts::new();

        if let Some(holder) = self.holder_ref() {
            let cur = scheduler::current();
            cur.set_wait_on_lock(self as *const Lock);
            holder.add_donor(cur);
            scheduler::donate_priority();
        }

        self.sema.down();

        // Ours now.
        let cur = scheduler::current();
        cur.set_wait_on_lock(core::ptr::null());
        self.holder.store(cur.as_ptr(), Ordering::SeqCst);
    }

    /// Release the lock. Discards donations received through it, refreshes
    /// the caller's priority, and yields if the woken waiter outranks the
    /// caller.
    pub fn release(&self) {
        assert!(self.held_by_current());

        {
            let _level = DisableInterrupts::new();

            scheduler::remove_with_lock(self);
            scheduler::refresh_priority();

            self.holder.store(core::ptr::null_mut(), Ordering::SeqCst);
            self.sema.up();
        }

        scheduler::test_max_priority();
    }
}
