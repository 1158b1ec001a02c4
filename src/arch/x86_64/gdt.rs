/*
 * Global Descriptor Table (GDT) Implementation
 *
 * x86_64 uses a flat memory model, but the GDT is still required for:
 *
 * 1. Code/Data Segment Descriptors: the kernel code and data segments that
 *    every thread's saved frame references (selectors 0x08 and 0x10)
 * 2. Task State Segment (TSS): provides the interrupt stack table
 * 3. Interrupt Stack Table: a known-good stack for double faults
 *
 * The thread system stores segment selectors in each thread's saved frame
 * and reloads them on every context switch, so the layout established here
 * (code first, data second) is relied upon by the frame constants.
 */

use lazy_static::lazy_static;
use x86_64::{
    VirtAddr,
    structures::{
        gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector},
        tss::TaskStateSegment,
    },
};

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

lazy_static! {
    static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();
        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
            const STACK_SIZE: usize = 4096;
            static mut STACK: [u8; STACK_SIZE] = [0; STACK_SIZE];

            let stack_start = VirtAddr::from_ptr(&raw const STACK);
            let stack_end = stack_start + STACK_SIZE as u64;
            stack_end
        };
        tss
    };
}

lazy_static! {
    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();
        let code_selector = gdt.append(Descriptor::kernel_code_segment());
        let data_selector = gdt.append(Descriptor::kernel_data_segment());
        let tss_selector = gdt.append(Descriptor::tss_segment(&TSS));
        (
            gdt,
            Selectors {
                code_selector,
                data_selector,
                tss_selector,
            },
        )
    };
}

struct Selectors {
    code_selector: SegmentSelector,
    data_selector: SegmentSelector,
    tss_selector: SegmentSelector,
}

/// Initialize the Global Descriptor Table.
///
/// Loads the GDT, reloads every segment register against the new
/// descriptors, and loads the TSS. Must be called before IDT
/// initialization.
pub fn init() {
    use x86_64::instructions::{
        segmentation::{CS, DS, ES, FS, GS, SS, Segment},
        tables::load_tss,
    };

    log::info!("Loading GDT...");
    GDT.0.load();

    unsafe {
        CS::set_reg(GDT.1.code_selector);
        DS::set_reg(GDT.1.data_selector);
        ES::set_reg(GDT.1.data_selector);
        SS::set_reg(GDT.1.data_selector);
        FS::set_reg(GDT.1.data_selector);
        GS::set_reg(GDT.1.data_selector);

        load_tss(GDT.1.tss_selector);
    }

    log::info!("GDT initialized");
}

/// Kernel code segment selector (ring 0).
pub fn kernel_code_selector() -> SegmentSelector {
    GDT.1.code_selector
}

/// Kernel data segment selector (ring 0).
pub fn kernel_data_selector() -> SegmentSelector {
    GDT.1.data_selector
}
