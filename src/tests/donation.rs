/*
 * Priority donation scenarios, driven from the boot thread (priority 31,
 * the lowest link of every chain here):
 *
 * - A two-lock chain: "mid" blocks on the boot thread's lock, "high"
 *   blocks on mid's lock, and both donations propagate down the chain.
 *   Releases peel the donations off in order.
 * - An explicit set_priority under a live donation is masked until the
 *   donor is gone.
 */

use super::EventLog;
use crate::scheduler::{self, PRI_DEFAULT};
use crate::sync::{Lock, Semaphore};

static LOCK_A: Lock = Lock::new();
static LOCK_B: Lock = Lock::new();
static EVENTS: EventLog = EventLog::new();
static DONE: Semaphore = Semaphore::new(0);

const MID_WOKE: u8 = 1;
const HIGH_RAN: u8 = 2;
const MID_DONE: u8 = 3;

/// Middle of the chain: holds B, blocks on A (held by the driver).
fn mid_body(_aux: usize) {
    LOCK_B.acquire();
    LOCK_A.acquire();

    // Woken holding A; high's donation through B is still in effect.
    EVENTS.record(MID_WOKE);
    assert_eq!(scheduler::get_priority(), 35);

    LOCK_B.release(); // high outranks us and runs now
    assert_eq!(scheduler::get_priority(), 33);

    LOCK_A.release();
    EVENTS.record(MID_DONE);
    DONE.up();
}

/// Top of the chain: blocks on B (held by mid).
fn high_body(_aux: usize) {
    LOCK_B.acquire();
    EVENTS.record(HIGH_RAN);
    assert_eq!(scheduler::get_priority(), 35);
    LOCK_B.release();
    DONE.up();
}

/// Donation propagates through a chain of two locks and is peeled off
/// release by release.
fn nested_donation_chain() {
    EVENTS.reset();
    assert_eq!(scheduler::get_priority(), PRI_DEFAULT);

    LOCK_A.acquire();

    scheduler::spawn("mid", 33, mid_body, 0).unwrap();
    // mid ran, blocked on A, and donated to us.
    assert_eq!(scheduler::get_priority(), 33);

    scheduler::spawn("high", 35, high_body, 0).unwrap();
    // high blocked on B; its donation reached us through mid.
    assert_eq!(scheduler::get_priority(), 35);

    LOCK_A.release();
    // Donation gone; mid (still at 35) preempted us and the whole chain
    // unwound.
    assert_eq!(scheduler::get_priority(), PRI_DEFAULT);

    for _ in 0..2 {
        DONE.down();
    }
    assert!(EVENTS.matches(&[MID_WOKE, HIGH_RAN, MID_DONE]));
    log::info!("  nested_donation_chain: PASS");
}

/// Blocks on A once, then finishes.
fn blocker_body(_aux: usize) {
    LOCK_A.acquire();
    LOCK_A.release();
    DONE.up();
}

/// An explicit priority decrease takes effect only once no donor outranks
/// the new base value.
fn set_priority_under_donation() {
    LOCK_A.acquire();

    scheduler::spawn("blocker", 41, blocker_body, 0).unwrap();
    assert_eq!(scheduler::get_priority(), 41);

    scheduler::set_priority(36);
    // Masked: the donor still outranks the new base.
    assert_eq!(scheduler::get_priority(), 41);

    LOCK_A.release();
    // Donor gone; the decrease finally lands.
    assert_eq!(scheduler::get_priority(), 36);

    scheduler::set_priority(PRI_DEFAULT);
    DONE.down();
    log::info!("  set_priority_under_donation: PASS");
}

pub fn run() {
    log::info!("priority donation:");
    nested_donation_chain();
    set_priority_under_donation();
}
