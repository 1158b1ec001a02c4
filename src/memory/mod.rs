/*
 * Memory Management
 *
 * Two allocators with deliberately separate roles:
 *
 * - `heap`: the kernel heap backing Rust's allocation APIs. Used by the
 *   scheduler for its queue storage. Exhaustion is fatal.
 * - `page`: a bitmap allocator over a static pool of 4 KiB pages. Every
 *   thread owns exactly one of these pages (control block + stack), and
 *   pool exhaustion is the one recoverable failure in the kernel: thread
 *   creation reports it to the caller.
 */

pub mod heap;
pub mod page;

pub fn init() {
    heap::init();
    page::init();
}
