/*
 * Kernel Heap Allocator
 *
 * Dynamic memory for the kernel, built on the linked_list_allocator crate
 * over a fixed static backing region. Thread-safe via LockedHeap's
 * internal spin mutex.
 *
 * Kernel code that can run in interrupt context must not allocate; the
 * scheduler pre-reserves its queue capacity at boot for exactly this
 * reason, and every other allocation site runs in thread context with
 * interrupts disabled.
 */

use linked_list_allocator::LockedHeap;

/// Size of the kernel heap in bytes.
pub const HEAP_SIZE: usize = 256 * 1024;

static mut HEAP_SPACE: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Global allocator instance used by Rust's allocation APIs.
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initialize the kernel heap over the static backing region.
///
/// Must be called exactly once, before anything allocates.
pub fn init() {
    unsafe {
        ALLOCATOR
            .lock()
            .init(core::ptr::addr_of_mut!(HEAP_SPACE) as *mut u8, HEAP_SIZE);
    }
    log::info!("kernel heap initialized ({} KiB)", HEAP_SIZE / 1024);
}

/// Allocation failure is fatal in kernel context.
#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}
