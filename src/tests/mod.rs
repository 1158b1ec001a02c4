/*
 * Kernel Self-Test Suite
 *
 * Scenario tests for the thread system, run from the boot thread once the
 * scheduler is live. Each test spawns real threads, funnels observable
 * ordering into a fixed-size event log, joins through a semaphore, and
 * asserts. A failed assertion panics the kernel, which is exactly the
 * right severity for a broken scheduler.
 *
 * The tests are written to be deterministic under strict-priority
 * scheduling with 4-tick time slices; none of them depend on wall-clock
 * luck, only on the documented ordering guarantees.
 */

mod alarm;
mod donation;
mod priority;

use spin::Mutex;

use crate::arch::x86_64::interrupts;

/// Fixed-capacity ordered record of observed events. Threads append tags;
/// the test driver compares against the expected sequence.
pub(crate) struct EventLog {
    events: Mutex<([u8; 32], usize)>,
}

impl EventLog {
    pub const fn new() -> EventLog {
        EventLog {
            events: Mutex::new(([0; 32], 0)),
        }
    }

    /// Append one tag. Interrupts are masked so a recorder can never be
    /// preempted while holding the log.
    pub fn record(&self, tag: u8) {
        interrupts::without_interrupts(|| {
            let mut ev = self.events.lock();
            let n = ev.1;
            assert!(n < ev.0.len(), "event log overflow");
            ev.0[n] = tag;
            ev.1 = n + 1;
        });
    }

    /// True if the recorded sequence equals `expected`.
    pub fn matches(&self, expected: &[u8]) -> bool {
        interrupts::without_interrupts(|| {
            let ev = self.events.lock();
            &ev.0[..ev.1] == expected
        })
    }

    pub fn reset(&self) {
        interrupts::without_interrupts(|| {
            self.events.lock().1 = 0;
        });
    }
}

/// Run every scenario. Called from the boot thread at PRI_DEFAULT.
pub fn run_all() {
    log::info!("== kernel self-tests ==");
    priority::run();
    alarm::run();
    donation::run();
    log::info!("== all self-tests passed ==");
}
