/*
 * Tick-Driven Sleep Service
 *
 * Threads park themselves until an absolute tick. The sleep queue is an
 * unordered set scanned once per timer tick: wake times arrive in
 * arbitrary (even non-monotonic) order from callers, and the ready
 * queue's priority ordering decides who runs first among threads woken on
 * the same tick, so keeping this list sorted would buy nothing.
 */

use super::thread::ThreadStatus;
use super::{IDLE_THREAD, block, current, with_sched};
use crate::arch::x86_64::interrupts::DisableInterrupts;
use core::sync::atomic::Ordering;

/// Block the running thread until the timer reaches `wake_tick`.
///
/// The target is absolute: the thread becomes runnable on the first tick
/// where `now >= wake_tick`. The idle thread must never sleep.
pub fn sleep(wake_tick: u64) {
    let _level = DisableInterrupts::new();

    let cur = current();
    assert!(
        cur.as_ptr() != IDLE_THREAD.load(Ordering::SeqCst),
        "the idle thread cannot sleep"
    );

    cur.set_wakeup(wake_tick);
    with_sched(|s| s.sleepers.push(cur));
    block();
}

/// Wake every sleeper whose target tick has arrived. Called from the
/// timer interrupt handler; all due threads are in the ready queue before
/// the handler returns.
pub fn awake(now: u64) {
    with_sched(|s| {
        let mut i = 0;
        while i < s.sleepers.len() {
            let t = s.sleepers[i];
            if t.wakeup() <= now {
                s.sleepers.swap_remove(i);
                assert_eq!(t.status(), ThreadStatus::Blocked);
                s.insert_ready(t);
                t.set_status(ThreadStatus::Ready);
            } else {
                i += 1;
            }
        }
    });
}
