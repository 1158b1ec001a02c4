/*
 * Priority scheduling scenarios: FIFO ordering among equals, strict
 * priority selection, preemption on spawn, and yielding on an explicit
 * priority drop.
 *
 * The boot thread drives at PRI_DEFAULT (31); helper threads run at
 * literal priorities chosen around it.
 */

use super::EventLog;
use crate::scheduler::{self, PRI_DEFAULT};
use crate::sync::Semaphore;
use crate::utils::timer;

static EVENTS: EventLog = EventLog::new();
static DONE: Semaphore = Semaphore::new(0);

/// Body for every helper thread: record the tag passed as aux, signal,
/// exit.
fn record_and_exit(tag: usize) {
    EVENTS.record(tag as u8);
    DONE.up();
}

/// Three threads at one priority run in spawn order.
fn fifo_equal_priority() {
    EVENTS.reset();

    scheduler::spawn("fifo1", PRI_DEFAULT, record_and_exit, 1).unwrap();
    scheduler::spawn("fifo2", PRI_DEFAULT, record_and_exit, 2).unwrap();
    scheduler::spawn("fifo3", PRI_DEFAULT, record_and_exit, 3).unwrap();

    for _ in 0..3 {
        DONE.down();
    }
    assert!(EVENTS.matches(&[1, 2, 3]));
    log::info!("  fifo_equal_priority: PASS");
}

/// A spawned thread that outranks its creator runs to completion before
/// spawn returns.
fn preemption_on_spawn() {
    EVENTS.reset();
    scheduler::set_priority(20);

    scheduler::spawn("preemptor", 30, record_and_exit, 7).unwrap();
    EVENTS.record(9);

    assert!(EVENTS.matches(&[7, 9]));
    scheduler::set_priority(PRI_DEFAULT);
    DONE.down();
    log::info!("  preemption_on_spawn: PASS");
}

/// A high-priority thread runs immediately; a low-priority one waits
/// until the creator leaves the CPU.
fn strict_priority() {
    EVENTS.reset();

    scheduler::spawn("hi", 40, record_and_exit, 1).unwrap();
    scheduler::spawn("lo", 20, record_and_exit, 2).unwrap();

    // Only the high-priority thread has run so far.
    assert!(EVENTS.matches(&[1]));

    // Leave the CPU; the low-priority thread gets its turn.
    timer::sleep(5);

    for _ in 0..2 {
        DONE.down();
    }
    assert!(EVENTS.matches(&[1, 2]));
    log::info!("  strict_priority: PASS");
}

/// Lowering the running thread's priority below a ready thread yields to
/// it at once.
fn priority_drop_yields() {
    EVENTS.reset();

    scheduler::spawn("mid", 25, record_and_exit, 4).unwrap();
    assert!(EVENTS.matches(&[]));

    scheduler::set_priority(20);
    assert!(EVENTS.matches(&[4]));
    assert_eq!(scheduler::get_priority(), 20);

    scheduler::set_priority(PRI_DEFAULT);
    DONE.down();
    log::info!("  priority_drop_yields: PASS");
}

pub fn run() {
    log::info!("priority scheduling:");
    fifo_equal_priority();
    preemption_on_spawn();
    strict_priority();
    priority_drop_yields();
}
