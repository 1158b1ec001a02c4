/*
 * Tern Kernel Main Entry Point
 *
 * Bare-metal entry for the Tern kernel core. The kernel's job here is
 * deliberately narrow: bring up the serial console, the descriptor tables,
 * the legacy PIC and the PIT, the allocators, and then hand the machine to
 * the thread system.
 *
 * BOOT STACK LAYOUT:
 * ==================
 *
 * `_start` switches onto a single page-aligned 4 KiB stack before any Rust
 * code runs. This is load-bearing for the thread system: the control block
 * of every thread (including the boot thread that `scheduler::init()`
 * adopts) lives at the base of the page that also holds that thread's
 * stack, and the running thread is recovered by masking the stack pointer
 * down to the page boundary.
 *
 * INITIALIZATION SEQUENCE:
 * ========================
 *
 * 1. Serial console + logger (everything after this can log)
 * 2. GDT, then IDT (exception/IRQ handlers installed before anything can
 *    fault), then PIC remap and PIT at 100 Hz
 * 3. Kernel heap and the thread page pool
 * 4. scheduler::init() adopts the running code as the "main" thread
 * 5. scheduler::start() spawns the idle thread and enables interrupts
 * 6. The in-kernel self-test suite runs on the main thread
 */

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(alloc_error_handler)]
#![allow(dead_code)]

extern crate alloc;
extern crate rlibc;

use core::panic::PanicInfo;

mod arch;
mod memory;
mod scheduler;
mod sync;
mod tests;
mod utils;

/// One page, page-aligned. The boot thread's control block occupies the
/// low end; the stack grows down from the top toward it.
#[repr(C, align(4096))]
pub struct BootStack([u8; memory::page::PAGE_SIZE]);

#[unsafe(no_mangle)]
pub static mut BOOT_STACK: BootStack = BootStack([0; memory::page::PAGE_SIZE]);

/// Early entry point. Interrupts are off, we are in long mode with whatever
/// stack the loader gave us. Switch to our own page-aligned stack and enter
/// Rust.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "cli",
        "lea rax, [rip + BOOT_STACK]",
        "add rax, {stack_size}",
        "mov rsp, rax",
        "jmp kstart",
        stack_size = const memory::page::PAGE_SIZE,
    );
}

#[unsafe(no_mangle)]
pub extern "C" fn kstart() -> ! {
    // Console and logging first so the rest of bring-up can report.
    arch::x86_64::peripheral::uart_16550::init();
    utils::logger::init();
    log::info!("tern kernel starting...");

    arch::x86_64::gdt::init();
    arch::x86_64::idt::init();
    arch::x86_64::peripheral::pic::init();
    arch::x86_64::peripheral::pic::init_pit(utils::timer::TIMER_FREQ_HZ);

    memory::init();

    // Adopt the running code as the first thread, then start preemptive
    // scheduling. start() enables interrupts.
    scheduler::init();
    scheduler::start();
    log::info!("scheduler running - preemptive multitasking active");

    tests::run_all();

    scheduler::print_stats();
    log::info!("boot thread going quiescent");

    // Timer preemption takes over from here; this thread only runs again
    // when nothing higher-priority is ready.
    loop {
        x86_64::instructions::hlt();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();

    if let Some(location) = info.location() {
        log::error!(
            "PANIC at {}:{}: {}",
            location.file(),
            location.line(),
            info.message()
        );
    } else {
        log::error!("PANIC: {}", info.message());
    }

    loop {
        x86_64::instructions::hlt();
    }
}

#[unsafe(no_mangle)]
extern "C" fn rust_eh_personality() {}
