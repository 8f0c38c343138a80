//! Lock-protected heap for use as `#[global_allocator]`
//!
//! # Locking
//!
//! [`LockedHeap`] guards one [`Heap`] with a `lock_api` mutex. The raw mutex
//! is supplied by the host: a spinlock on multi-core parts, an
//! interrupt-masking critical section on single-core MCUs. Resizing never
//! calls back into a locked entry point, so the lock does not have to nest.
//!
//! ## Setup
//!
//! The heap starts uninitialised; every allocation fails with a null pointer
//! until [`LockedHeap::init`] hands it an arena:
//!
//! ```rust,ignore
//! use ummheap::prelude::*;
//!
//! #[global_allocator]
//! static HEAP: LockedHeap<RawSpinlock> = LockedHeap::new();
//!
//! static mut ARENA: [u8; 16 * 1024] = [0; 16 * 1024];
//!
//! fn main() {
//!     let arena = unsafe { &mut *core::ptr::addr_of_mut!(ARENA) };
//!     HEAP.init(arena, Config::DEFAULT).unwrap();
//! }
//! ```
//!
//! ## Alignment
//!
//! Payloads sit 4 bytes into an 8-byte block (plus the poison prefix), so the
//! guaranteed alignment is at most 8 and depends on the arena base. Requests
//! asking for more get a null pointer.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use lock_api::{GuardSend, Mutex, RawMutex};

use crate::Allocator;
use crate::backend::fit::{DefaultFit, FitStrategy};
use crate::backend::heap::Heap;
use crate::config::Config;
use crate::error::HeapError;

/// Minimal test-and-set spinlock
pub struct RawSpinlock {
    locked: AtomicBool,
}

unsafe impl RawMutex for RawSpinlock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinlock {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        while !self.try_lock() {
            core::hint::spin_loop();
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// A [`Heap`] behind a mutex, usable as the global allocator
pub struct LockedHeap<R: RawMutex, S: FitStrategy = DefaultFit> {
    heap: Mutex<R, Option<Heap<'static, S>>>,
}

impl<R: RawMutex, S: FitStrategy> LockedHeap<R, S> {
    /// Creates an empty, uninitialised heap
    pub const fn new() -> Self {
        Self {
            heap: Mutex::const_new(R::INIT, None),
        }
    }

    /// Formats `arena` and starts serving allocations from it
    ///
    /// Calling it again discards the previous heap.
    pub fn init(&self, arena: &'static mut [u8], config: Config) -> Result<(), HeapError> {
        let heap = Heap::with_strategy(arena, config)?;
        *self.heap.lock() = Some(heap);
        Ok(())
    }

    /// Formats the region `start..start + size`
    ///
    /// # Safety
    ///
    /// The region must be valid for reads and writes, live for the rest of
    /// the program and not be accessed by anything else.
    pub unsafe fn init_from_raw(
        &self,
        start: *mut u8,
        size: usize,
        config: Config,
    ) -> Result<(), HeapError> {
        // SAFETY: guaranteed by the caller.
        let arena = unsafe { core::slice::from_raw_parts_mut(start, size) };
        self.init(arena, config)
    }

    /// Runs `f` on the heap under the lock
    ///
    /// Returns `None` before [`init`](Self::init).
    pub fn with_heap<F, T>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut Heap<'static, S>) -> T,
    {
        self.heap.lock().as_mut().map(f)
    }
}

impl<R: RawMutex, S: FitStrategy> Default for LockedHeap<R, S> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<R: RawMutex, S: FitStrategy> GlobalAlloc for LockedHeap<R, S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut guard = self.heap.lock();
        let Some(heap) = guard.as_mut() else {
            return ptr::null_mut();
        };
        if layout.align() > heap.user_alignment() {
            log::debug!("heap: alignment {} not supported", layout.align());
            return ptr::null_mut();
        }
        match heap.allocate(layout.size()) {
            Ok(handle) => heap.address_of(handle),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let mut guard = self.heap.lock();
        let Some(heap) = guard.as_mut() else {
            return;
        };
        match heap.handle_at(ptr) {
            // failures are already logged or routed to the corruption hook
            Some(handle) => {
                let _ = heap.free(handle);
            }
            None => log::warn!("heap: dealloc of {ptr:p} outside the arena"),
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let mut guard = self.heap.lock();
        let Some(heap) = guard.as_mut() else {
            return ptr::null_mut();
        };
        if layout.align() > heap.user_alignment() {
            return ptr::null_mut();
        }
        let Some(handle) = heap.handle_at(ptr) else {
            return ptr::null_mut();
        };
        match heap.resize(handle, new_size) {
            Ok(handle) => heap.address_of(handle),
            Err(_) => ptr::null_mut(),
        }
    }
}
