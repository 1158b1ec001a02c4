/*
 * Priority Donation
 *
 * Bounds priority inversion through the blocking lock: a thread about to
 * block on a held lock lends its priority to the holder, transitively
 * along the chain of holders, so that a low-priority thread holding a
 * lock a high-priority thread wants cannot itself be starved by the
 * middle priorities.
 *
 * These three hooks are called by the lock implementation, with
 * interrupts disabled:
 *
 * - `donate_priority()` on the way into a contended acquire, after the
 *   acquirer has been recorded in the holder's donation set
 * - `remove_with_lock()` + `refresh_priority()` at release time
 *
 * The walk assigns the donor's priority to each holder unconditionally
 * rather than taking a max; a holder that already carried a higher
 * third-party donation is overwritten and recovers the correct value only
 * at its next `refresh_priority()`.
 */

use super::current;
use crate::sync::Lock;

/// Donation chains are followed at most this many holders deep.
const DONATION_DEPTH_LIMIT: usize = 8;

/// Lend the running thread's priority to the holder of the lock it is
/// about to block on, and onward along the chain of holders.
pub fn donate_priority() {
    let donor = current();
    let priority = donor.priority();

    let mut t = donor;
    for _ in 0..DONATION_DEPTH_LIMIT {
        let lock = t.wait_on_lock();
        if lock.is_null() {
            break;
        }

        let holder = unsafe { &*lock }.holder_ref();
        let Some(holder) = holder else { break };

        holder.set_priority_raw(priority);
        t = holder;
    }
}

/// Forget every donation made to the running thread by waiters of `lock`.
/// Called by the holder when it releases `lock`.
pub fn remove_with_lock(lock: &Lock) {
    current().remove_donors_for(lock as *const Lock);
}

/// Recompute the running thread's effective priority: back to its base
/// priority, then up to the strongest remaining donor if that is higher.
pub fn refresh_priority() {
    let cur = current();
    cur.set_priority_raw(cur.init_priority());

    if let Some(strongest) = cur.strongest_donor() {
        if strongest.priority() > cur.priority() {
            cur.set_priority_raw(strongest.priority());
        }
    }
}
