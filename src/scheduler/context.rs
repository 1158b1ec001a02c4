/*
 * Context Switch Mechanics
 *
 * A thread's saved CPU state is a `SwitchFrame`: every general purpose
 * register, the data segment selectors, and the five-word frame that
 * `iretq` consumes (rip, cs, rflags, rsp, ss). Restoring a frame is
 * therefore a single atomic operation from the CPU's point of view - the
 * final `iretq` reloads flags, stack and instruction pointer together.
 *
 * A switch is two phases:
 *
 * 1. `switch_frames` stores the live CPU state into the outgoing frame.
 *    The saved rip points at the routine's own tail, so when the outgoing
 *    thread is eventually resumed it continues right after the switch and
 *    returns to its caller in the scheduler.
 * 2. It then tail-jumps into `restore_frame`, which rebuilds the CPU
 *    state from the incoming frame and `iretq`s into the new thread.
 *
 * Between "outgoing state fully saved" and "incoming rsp loaded" neither
 * routine touches the stack; at that point the old stack may already be
 * on the destruction queue and the new one is not yet active. Callers
 * must hold interrupts disabled across the whole switch.
 *
 * For a newly created thread the frame is synthesized instead of saved:
 * rip aims at the entry trampoline, rdi/rsi carry its arguments, and rsp
 * sits at the top of the thread's fresh stack.
 */

use core::arch::naked_asm;

/// Kernel code segment selector (GDT slot 1).
pub const KERNEL_CS: u64 = 0x08;
/// Kernel data segment selector (GDT slot 2).
pub const KERNEL_DS: u64 = 0x10;
/// RFLAGS with IF set (bit 1 is reserved and always set).
pub const RFLAGS_IF: u64 = 0x202;

/// General purpose registers, in the order the switch routines store
/// them. Offsets are load-bearing for the assembly below.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GpRegisters {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
}

/// Complete saved CPU state for one thread.
///
/// Layout (byte offsets, relied on by the assembly):
///   0x00..0x78  general purpose registers
///   0x78        es
///   0x80        ds
///   0x88..0xb0  iretq frame: rip, cs, rflags, rsp, ss
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SwitchFrame {
    pub regs: GpRegisters,
    pub es: u64,
    pub ds: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl SwitchFrame {
    /// Frame for a thread that has never run: kernel segments, interrupts
    /// enabled on first dispatch, empty stack. The caller fills in rip and
    /// the argument registers.
    pub fn initial(stack_top: u64) -> SwitchFrame {
        SwitchFrame {
            regs: GpRegisters::default(),
            es: KERNEL_DS,
            ds: KERNEL_DS,
            rip: 0,
            cs: KERNEL_CS,
            rflags: RFLAGS_IF,
            rsp: stack_top,
            ss: KERNEL_DS,
        }
    }
}

/// Load `frame` into the CPU and resume the thread it describes.
///
/// # Safety
/// `frame` must describe a resumable kernel thread and interrupts must be
/// disabled. Does not return; the saved rflags decide whether the resumed
/// thread runs with interrupts enabled.
#[unsafe(naked)]
pub unsafe extern "C" fn restore_frame(frame: *const SwitchFrame) -> ! {
    naked_asm!(
        // rdi = frame. Walk it as if it were a stack image.
        "mov rsp, rdi",
        "mov r15, [rsp + 0x00]",
        "mov r14, [rsp + 0x08]",
        "mov r13, [rsp + 0x10]",
        "mov r12, [rsp + 0x18]",
        "mov r11, [rsp + 0x20]",
        "mov r10, [rsp + 0x28]",
        "mov r9,  [rsp + 0x30]",
        "mov r8,  [rsp + 0x38]",
        "mov rsi, [rsp + 0x40]",
        "mov rdi, [rsp + 0x48]",
        "mov rbp, [rsp + 0x50]",
        "mov rdx, [rsp + 0x58]",
        "mov rcx, [rsp + 0x60]",
        "mov rbx, [rsp + 0x68]",
        "mov rax, [rsp + 0x70]",
        "add rsp, 0x78",
        "mov es, word ptr [rsp]",
        "mov ds, word ptr [rsp + 0x08]",
        "add rsp, 0x10",
        // rsp now points at rip/cs/rflags/rsp/ss; hand them to the CPU.
        "iretq",
    )
}

/// Save the current CPU state into `outgoing`, then resume `incoming`.
///
/// Returns (to its caller, on the outgoing thread's stack) only when the
/// outgoing thread is scheduled again.
///
/// # Safety
/// Interrupts must be disabled. `outgoing` must stay valid until the
/// thread is resumed; `incoming` must describe a resumable thread.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_frames(outgoing: *mut SwitchFrame, incoming: *const SwitchFrame) {
    naked_asm!(
        // rdi = outgoing frame, rsi = incoming frame.
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r11",
        "mov [rdi + 0x28], r10",
        "mov [rdi + 0x30], r9",
        "mov [rdi + 0x38], r8",
        "mov [rdi + 0x40], rsi",
        "mov [rdi + 0x48], rdi",
        "mov [rdi + 0x50], rbp",
        "mov [rdi + 0x58], rdx",
        "mov [rdi + 0x60], rcx",
        "mov [rdi + 0x68], rbx",
        "mov [rdi + 0x70], rax",
        "mov word ptr [rdi + 0x78], es",
        "mov word ptr [rdi + 0x80], ds",
        // Resume at the tail below, with the rsp captured here.
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x88], rax",
        "mov word ptr [rdi + 0x90], cs",
        "pushfq",
        "pop rax",
        "mov [rdi + 0x98], rax",
        "mov [rdi + 0xa0], rsp",
        "mov word ptr [rdi + 0xa8], ss",
        // Save complete. No stack use past this point.
        "mov rdi, rsi",
        "jmp {restore}",
        // The outgoing thread lands here when resumed and returns to the
        // scheduler that called it.
        "2:",
        "ret",
        restore = sym restore_frame,
    )
}
