/*
 * Sleep/wake scenarios: threads sleeping to out-of-order target ticks
 * wake in tick order, and never early.
 */

use core::sync::atomic::{AtomicU64, Ordering};

use super::EventLog;
use crate::scheduler::{self, PRI_DEFAULT};
use crate::sync::Semaphore;
use crate::utils::timer;

static WAKE_ORDER: EventLog = EventLog::new();
static TARGETS: [AtomicU64; 3] = [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)];
static DONE: Semaphore = Semaphore::new(0);

/// Sleep until the absolute tick stashed for this thread, then record the
/// wake.
fn sleeper(index: usize) {
    let target = TARGETS[index].load(Ordering::SeqCst);
    scheduler::sleep(target);

    // Never runnable before the target tick.
    assert!(timer::ticks() >= target);

    WAKE_ORDER.record(index as u8);
    DONE.up();
}

/// Spawn sleepers with targets 30/10/20 ticks out (in that order); they
/// must wake in the order 10, 20, 30.
fn wake_order() {
    WAKE_ORDER.reset();

    let base = timer::ticks();
    TARGETS[0].store(base + 30, Ordering::SeqCst);
    TARGETS[1].store(base + 10, Ordering::SeqCst);
    TARGETS[2].store(base + 20, Ordering::SeqCst);

    // One notch above the driver so each sleeper parks itself before the
    // next spawn.
    scheduler::spawn("sleeper0", PRI_DEFAULT + 1, sleeper, 0).unwrap();
    scheduler::spawn("sleeper1", PRI_DEFAULT + 1, sleeper, 1).unwrap();
    scheduler::spawn("sleeper2", PRI_DEFAULT + 1, sleeper, 2).unwrap();

    for _ in 0..3 {
        DONE.down();
    }
    assert!(WAKE_ORDER.matches(&[1, 2, 0]));
    log::info!("  alarm_wake_order: PASS");
}

pub fn run() {
    log::info!("sleep/wake:");
    wake_order();
}
