/*
 * System Timer
 *
 * Global tick counter driven by the PIT at 100 Hz, plus the glue between
 * the timer interrupt and the thread system: every tick runs the
 * scheduler's per-tick accounting and wakes any sleepers whose target
 * tick has arrived.
 *
 * `sleep()` is the blocking sleep used by threads; it translates a
 * relative duration into the absolute wake tick the scheduler's sleep
 * queue works in. Resolution is one tick (10 ms at 100 Hz).
 */

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::x86_64::interrupts;
use crate::scheduler;

/// Timer interrupts per second.
pub const TIMER_FREQ_HZ: u32 = 100;

/// Ticks since boot.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Current tick count.
pub fn ticks() -> u64 {
    TICKS.load(Ordering::SeqCst)
}

/// Ticks elapsed since `then`.
pub fn elapsed(then: u64) -> u64 {
    ticks() - then
}

/// Called from the timer interrupt handler (IRQ0), exactly once per
/// interrupt. Runs in interrupt context.
pub fn on_timer_interrupt() {
    let now = TICKS.fetch_add(1, Ordering::SeqCst) + 1;
    scheduler::tick();
    scheduler::awake(now);
}

/// Block the calling thread for roughly `duration` ticks.
pub fn sleep(duration: u64) {
    assert!(interrupts::are_enabled());
    let start = ticks();
    scheduler::sleep(start + duration);
}
