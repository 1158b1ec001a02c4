/*
 * Interrupt Management Module
 *
 * Utilities for managing CPU interrupts: enabling/disabling, querying the
 * current level, and tracking whether execution is currently inside an
 * external interrupt handler.
 *
 * The thread system builds all of its critical sections on this module.
 * Every scheduler state transition happens with interrupts disabled, and
 * the `DisableInterrupts` guard is the standard way to enter such a
 * section while preserving the caller's prior interrupt level.
 *
 * Handlers that want to force a reschedule cannot context-switch in the
 * middle of servicing an IRQ; they call `yield_on_return()` instead, and
 * the handler tail performs the yield once the handler has left interrupt
 * context.
 */

use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::interrupts;

/// True while an external interrupt handler is executing.
static IN_INTERRUPT: AtomicBool = AtomicBool::new(false);

/// Set by `yield_on_return()`; consumed at the handler tail.
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

/// Enable interrupts globally.
///
/// Should only be called after the IDT has been properly initialized.
pub fn enable() {
    interrupts::enable();
}

/// Disable interrupts globally.
pub fn disable() {
    interrupts::disable();
}

/// Check if interrupts are enabled.
pub fn are_enabled() -> bool {
    interrupts::are_enabled()
}

/// Execute a closure with interrupts disabled, restoring the prior level
/// afterwards.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    interrupts::without_interrupts(f)
}

/// True when called from within an external interrupt handler.
pub fn in_interrupt_context() -> bool {
    IN_INTERRUPT.load(Ordering::SeqCst)
}

/// Request that the current thread yield once the running interrupt
/// handler returns. Only legal from interrupt context; code running in
/// thread context yields directly instead.
pub fn yield_on_return() {
    assert!(in_interrupt_context());
    YIELD_ON_RETURN.store(true, Ordering::SeqCst);
}

/// Mark entry into an external interrupt handler.
pub(crate) fn irq_enter() {
    assert!(!IN_INTERRUPT.swap(true, Ordering::SeqCst), "nested IRQ entry");
}

/// Mark exit from an external interrupt handler. Returns true if a
/// deferred yield was requested while the handler ran.
pub(crate) fn irq_exit() -> bool {
    IN_INTERRUPT.store(false, Ordering::SeqCst);
    YIELD_ON_RETURN.swap(false, Ordering::SeqCst)
}

/// RAII guard that disables interrupts for its lifetime.
///
/// Interrupts are disabled when this guard is created and restored to
/// their previous level when it's dropped, so nested guards compose.
///
/// # Example
/// ```
/// let _guard = DisableInterrupts::new();
/// // Critical section - interrupts are disabled
/// // Prior level automatically restored when _guard is dropped
/// ```
pub struct DisableInterrupts {
    were_enabled: bool,
}

impl DisableInterrupts {
    /// Create a new interrupt guard, disabling interrupts.
    pub fn new() -> Self {
        let were_enabled = are_enabled();
        if were_enabled {
            disable();
        }
        Self { were_enabled }
    }
}

impl Drop for DisableInterrupts {
    fn drop(&mut self) {
        // Only re-enable if they were enabled before
        if self.were_enabled {
            enable();
        }
    }
}
