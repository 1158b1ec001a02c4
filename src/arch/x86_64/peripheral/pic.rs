/*
 * Legacy PIC (8259) and PIT setup
 *
 * The two cascaded 8259 controllers are remapped so hardware IRQs land at
 * vectors 32..47, clear of the CPU exception range. Only the timer line
 * (IRQ0) is unmasked; the thread system is the sole IRQ consumer in this
 * kernel.
 *
 * The PIT drives channel 0 as a square wave at the requested frequency;
 * every pulse becomes a timer interrupt and therefore one scheduler tick.
 */

use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;

/// Hardware IRQs start at vector 32 (right after the CPU exceptions).
pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// Vector the timer (IRQ0) arrives on.
pub const TIMER_VECTOR: u8 = PIC_1_OFFSET;

static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// Remap both PICs and unmask only the timer line.
pub fn init() {
    unsafe {
        let mut pics = PICS.lock();
        pics.initialize();
        // Mask everything except IRQ0 (timer)
        pics.write_masks(0xFE, 0xFF);
    }
    log::info!("PIC remapped (offset {}), timer IRQ unmasked", PIC_1_OFFSET);
}

/// Program PIT channel 0 for periodic interrupts at `frequency_hz`.
pub fn init_pit(frequency_hz: u32) {
    let pit_frequency: u32 = 1_193_182; // Hz - PIT base frequency
    let divisor: u16 = (pit_frequency / frequency_hz) as u16;

    unsafe {
        let mut command = Port::<u8>::new(0x43);
        let mut channel0 = Port::<u8>::new(0x40);

        // Channel 0, access mode lo/hi, mode 3 (square wave), binary
        command.write(0x36);

        // Write divisor in two parts: low byte first, then high byte
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }

    log::info!("PIT configured for {}Hz timer interrupts", frequency_hz);
}

/// Acknowledge an interrupt so the PIC will deliver the next one.
///
/// # Safety
/// Must be called exactly once per serviced IRQ, with the vector the
/// interrupt arrived on.
pub unsafe fn end_of_interrupt(vector: u8) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(vector);
    }
}
