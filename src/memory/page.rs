/*
 * Thread Page Allocator
 *
 * Bitmap-based allocator over a static, page-aligned pool of 4 KiB pages.
 * One bit per page: 0 = free, 1 = used.
 *
 * The thread system places each thread's control block at the base of one
 * of these pages and uses the remainder as that thread's kernel stack, so
 * page alignment of the pool is a hard requirement.
 *
 * IMPORTANT: we never take & or &mut to the pool static; we only touch it
 * via raw pointers obtained from `addr_of_mut!`.
 */

use core::ptr::NonNull;

use spin::Mutex;

/// Size of one page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of pages in the pool; bounds the number of live threads.
pub const POOL_PAGES: usize = 64;

#[repr(C, align(4096))]
struct PagePool([u8; POOL_PAGES * PAGE_SIZE]);

static mut PAGE_POOL: PagePool = PagePool([0; POOL_PAGES * PAGE_SIZE]);

/// One bit per pool page: 0 = free, 1 = used.
static USED_MAP: Mutex<u64> = Mutex::new(0);

fn pool_base() -> *mut u8 {
    core::ptr::addr_of_mut!(PAGE_POOL) as *mut u8
}

pub fn init() {
    log::info!(
        "thread page pool at {:p}: {} pages of {} bytes",
        pool_base(),
        POOL_PAGES,
        PAGE_SIZE
    );
}

/// Allocate one page, optionally zeroed. Returns None when the pool is
/// exhausted.
pub fn alloc_page(zero: bool) -> Option<NonNull<u8>> {
    let base = {
        let mut used = USED_MAP.lock();
        let index = (!*used).trailing_zeros() as usize;
        if index >= POOL_PAGES {
            return None;
        }
        *used |= 1 << index;
        pool_base().wrapping_add(index * PAGE_SIZE)
    };

    if zero {
        unsafe { core::ptr::write_bytes(base, 0, PAGE_SIZE) };
    }

    // base is a non-null pointer into the static pool
    Some(unsafe { NonNull::new_unchecked(base) })
}

/// Return a page to the pool. The page must have come from `alloc_page`
/// and must not be freed twice.
pub fn free_page(page: NonNull<u8>) {
    let offset = page.as_ptr() as usize - pool_base() as usize;
    assert!(offset % PAGE_SIZE == 0, "misaligned page free");
    let index = offset / PAGE_SIZE;
    assert!(index < POOL_PAGES, "page outside the pool");

    let mut used = USED_MAP.lock();
    let bit = 1u64 << index;
    assert!(*used & bit != 0, "freeing a page that is not allocated");
    *used &= !bit;
}

/// Pages currently available.
pub fn pages_free() -> usize {
    POOL_PAGES - USED_MAP.lock().count_ones() as usize
}
