/*
 * Interrupt Descriptor Table (IDT) Implementation
 *
 * Entries 0-31 cover the CPU exceptions the kernel cares to distinguish;
 * vector 32 is the PIT timer, which drives preemption and the sleep/wake
 * service.
 *
 * TIMER PATH:
 * ===========
 *
 * 1. The handler marks interrupt context
 * 2. timer::on_timer_interrupt() advances the tick count, runs the
 *    per-tick scheduler accounting, and wakes any due sleepers
 * 3. EOI is sent to the PIC
 * 4. The handler leaves interrupt context; if the scheduler requested a
 *    yield during the tick, it is serviced here, at the handler tail,
 *    where a context switch is legal again. The interrupted thread's
 *    flags are restored by iretq whenever it is next scheduled.
 */

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame};

use super::interrupts;
use super::peripheral::pic;

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(super::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.general_protection_fault
            .set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);

        // IRQ 0 - the scheduler's tick source
        idt[pic::TIMER_VECTOR].set_handler_fn(timer_interrupt_handler);

        idt
    };
}

/// Load the IDT. Must run before interrupts are enabled.
pub fn init() {
    IDT.load();
    log::info!("IDT loaded");
}

// Exception handlers

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: divide error\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("EXCEPTION: breakpoint\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: invalid opcode\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    panic!("EXCEPTION: double fault\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "EXCEPTION: general protection fault (error code {:#x})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: x86_64::structures::idt::PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    panic!(
        "EXCEPTION: page fault at {:?} ({:?})\n{:#?}",
        Cr2::read(),
        error_code,
        stack_frame
    );
}

// Hardware interrupt handlers

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    interrupts::irq_enter();

    crate::utils::timer::on_timer_interrupt();

    unsafe {
        pic::end_of_interrupt(pic::TIMER_VECTOR);
    }

    let yield_requested = interrupts::irq_exit();

    // Deferred preemption: the tick accounting may have asked the running
    // thread to give up the CPU. That must not happen mid-handler, so it
    // is serviced here, after interrupt context has been left.
    if yield_requested {
        crate::scheduler::yield_now();
    }
}
