/*
 * Counting Semaphore
 *
 * A non-negative counter plus a waiter list. `down` blocks the calling
 * thread through the scheduler while the counter is zero; `up` wakes the
 * highest-priority waiter.
 *
 * All state changes run with interrupts disabled. `up` deliberately does
 * not preempt: waking a thread and preempting are separate concerns, and
 * the preemption points (spawn, set_priority, lock release) run the
 * priority check themselves. It is therefore safe to call `up` from
 * contexts that cannot yield.
 */

use alloc::collections::VecDeque;

use spin::Mutex;

use crate::arch::x86_64::interrupts::{self, DisableInterrupts};
use crate::scheduler::{self, ThreadRef};

struct SemaphoreInner {
    value: u32,
    /// Blocked downers. Selection at wake time goes by current priority,
    /// so donations received while waiting are honored.
    waiters: VecDeque<ThreadRef>,
}

/// Counting semaphore.
pub struct Semaphore {
    inner: Mutex<SemaphoreInner>,
}

// Accessed from multiple threads; every mutation happens with interrupts
// disabled on a single CPU.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// New semaphore with the given initial value.
    pub const fn new(value: u32) -> Semaphore {
        Semaphore {
            inner: Mutex::new(SemaphoreInner {
                value,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Decrement the counter, blocking until it is positive. Not legal in
    /// interrupt context.
    pub fn down(&self) {
        assert!(!interrupts::in_interrupt_context());

        let _level = DisableInterrupts::new();
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.value > 0 {
                    inner.value -= 1;
                    return;
                }
                inner.waiters.push_back(scheduler::current());
            }
            scheduler::block();
        }
    }

    /// Decrement the counter if it is positive, without blocking. Returns
    /// true on success. Safe from interrupt context.
    pub fn try_down(&self) -> bool {
        let _level = DisableInterrupts::new();
        let mut inner = self.inner.lock();
        if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        }
    }

    /// Increment the counter and wake the strongest waiter, if any. Does
    /// not preempt.
    pub fn up(&self) {
        let _level = DisableInterrupts::new();

        let woken = {
            let mut inner = self.inner.lock();
            inner.value += 1;

            // First-of-max keeps ties FIFO.
            let mut strongest: Option<usize> = None;
            for (i, w) in inner.waiters.iter().enumerate() {
                match strongest {
                    Some(s) if !scheduler::outranks(*w, inner.waiters[s]) => {}
                    _ => strongest = Some(i),
                }
            }
            strongest.and_then(|i| inner.waiters.remove(i))
        };

        if let Some(w) = woken {
            scheduler::unblock(w);
        }
    }
}
