//! # ummheap - A no_std Heap for Embedded Systems
//!
//! ummheap manages one fixed byte region handed over by the host, without any
//! operating-system support. It features:
//!
//! - **In-place metadata** - 4-byte headers live inside the managed buffer
//! - **Best-fit or first-fit** - chosen at build time by type or feature
//! - **Immediate coalescing** - freed blocks merge with free neighbours at once
//! - **Integrity checking** - optional walk of both block lists before every call
//! - **Allocation poisoning** - optional guard bytes with exact-length overrun detection
//! - **Global allocator support** - `lock_api`-protected [`GlobalAlloc`](core::alloc::GlobalAlloc) front end
//!
//! ## Quick Start
//!
//! ```rust
//! use ummheap::prelude::*;
//!
//! let mut arena = [0u8; 2048];
//! let mut heap = Heap::new(&mut arena, Config::PLAIN).unwrap();
//!
//! let (handle, buf) = heap.alloc_uninit(22).unwrap();
//! buf[..22].copy_from_slice(b"Hello, embedded world!");
//!
//! let handle = heap.resize(handle, 64).unwrap();
//! assert_eq!(&heap.get(handle).unwrap()[..22], b"Hello, embedded world!");
//!
//! heap.free(handle).unwrap();
//! ```
//!
//! ## Features
//!
//! - `global-alloc` (default) - [`LockedHeap`](crate::prelude::LockedHeap) over `lock_api`
//! - `first-fit` - use first-fit instead of best-fit as the default strategy
//! - `integrity-check` - enable the structural walk in [`Config::DEFAULT`](crate::prelude::Config)
//! - `poison` - enable guard bytes in [`Config::DEFAULT`](crate::prelude::Config)
//!
//! ## Architecture
//!
//! ### Blocks
//!
//! The arena is cut into 8-byte blocks. Block 0 heads both lists, the last
//! block terminates the address list. Every block boundary carries a header
//! linking it to its address-order neighbours; free blocks additionally link
//! into the free list through the first bytes of their payload.
//!
//! ```text
//! | head | alloc ........ | free ..... | alloc .. | free ........ | end |
//!    0    1                13           20         24              127
//! ```
//!
//! ### Handles
//!
//! Allocations are named by a [`Handle`], the byte offset of the payload inside
//! the arena. Handles are validated on every access: a handle that is not the
//! start of a live allocation is rejected instead of corrupting the heap.
//!
//! ```rust
//! # use ummheap::prelude::*;
//! # let mut arena = [0u8; 512];
//! # let mut heap = Heap::new(&mut arena, Config::PLAIN).unwrap();
//! let handle = heap.allocate(16).unwrap();
//! heap.free(handle).unwrap();
//!
//! // Freeing twice is refused
//! assert!(matches!(heap.free(handle), Err(HeapError::InvalidPointer { .. })));
//! ```
//!
//! ### Poisoning
//!
//! With poisoning on, each allocation records its exact length and is framed
//! by guard patterns. A single byte written past the end is caught by the next
//! `free`/`resize` of that block, or by any operation when integrity checking
//! is on as well.
//!
//! ```rust
//! # use ummheap::prelude::*;
//! let mut arena = [0u8; 512];
//! let config = Config::PLAIN.with_poison(PoisonConfig::DEFAULT);
//! let mut heap = Heap::new(&mut arena, config).unwrap();
//!
//! let handle = heap.allocate(10).unwrap();
//! assert_eq!(heap.get(handle).unwrap().len(), 10);
//! heap.check_poison().unwrap();
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Cost | Notes |
//! |-----------|------|-------|
//! | allocate() | O(free blocks) | Best-fit scans the whole free list |
//! | free() | O(blocks) | Handle validation walks the address list |
//! | resize() | O(blocks) | Grows in place when the next block is free |
//! | Memory | 4 bytes/allocation | Header inside the arena |
//!
//! ## Concurrency
//!
//! [`Heap`](crate::prelude::Heap) is a plain `&mut self` structure. Share it
//! through [`LockedHeap`](crate::prelude::LockedHeap) with any
//! `lock_api::RawMutex`, such as an interrupt-masking critical section.
//! Internal paths never re-enter the lock, so it does not need to be
//! reentrant.
//!
//! ## Testing
//!
//! ```bash
//! cargo test --all-features
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/ummheap/0.1.0")]

// Internal modules - use prelude for public API
mod backend;
mod config;
mod error;
mod guard;

#[cfg(feature = "global-alloc")]
mod global;

/// Convenient re-exports for common use - this is the public API
///
/// Users should import from prelude:
/// ```
/// use ummheap::prelude::*;
/// ```
pub mod prelude;

use error::HeapError;

/// Names an allocation by the byte offset of its payload in the arena
///
/// # Examples
///
/// ```
/// use ummheap::Handle;
///
/// let handle = Handle::from_offset(12);
/// assert_eq!(handle.offset(), 12);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    offset: usize,
}

impl Handle {
    /// Creates a handle from an arena offset
    pub const fn from_offset(offset: usize) -> Self {
        Self { offset }
    }

    /// Offset of the payload from the start of the arena
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

/// Core allocator trait
///
/// # Examples
///
/// ```
/// use ummheap::prelude::*;
///
/// let mut arena = [0u8; 256];
/// let mut heap = Heap::new(&mut arena, Config::PLAIN).unwrap();
///
/// // Allocate memory
/// let (handle, buf) = heap.alloc_uninit(32).unwrap();
/// buf[0] = 42;
///
/// // Access memory
/// assert_eq!(heap.get(handle).unwrap()[0], 42);
///
/// // Free memory
/// heap.free(handle).unwrap();
///
/// // Handle is now invalid
/// assert!(heap.get(handle).is_none());
/// ```
pub trait Allocator {
    /// Allocates at least `size` bytes
    ///
    /// # Errors
    ///
    /// - [`HeapError::ZeroSize`] for `size == 0`
    /// - [`HeapError::OutOfMemory`] if no free block is large enough
    /// - [`HeapError::Corruption`] if the integrity check fails
    fn allocate(&mut self, size: usize) -> Result<Handle, HeapError>;

    /// Changes the size of a live allocation
    ///
    /// Shrinking and growing into a free neighbour keep the handle. Otherwise
    /// the data is moved to a new block and the old one is freed; on failure
    /// the original allocation is left as it was.
    fn resize(&mut self, handle: Handle, size: usize) -> Result<Handle, HeapError>;

    /// Returns an allocation to the heap
    ///
    /// Stale handles and double frees fail with
    /// [`HeapError::InvalidPointer`] and change nothing.
    fn free(&mut self, handle: Handle) -> Result<(), HeapError>;

    /// Gets the usable bytes of an allocation
    ///
    /// With poisoning on this is exactly the requested length, otherwise the
    /// whole payload of the block.
    fn get(&self, handle: Handle) -> Option<&[u8]>;

    /// Gets the usable bytes of an allocation mutably
    fn get_mut(&mut self, handle: Handle) -> Option<&mut [u8]>;

    /// Returns the number of live allocations
    fn len(&self) -> usize;

    /// Returns true if no blocks are currently allocated
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest single allocation an empty heap can satisfy
    fn capacity(&self) -> usize;

    /// Allocation granularity in bytes
    fn block_size(&self) -> usize;

    /// Allocates and returns the handle with its writable bytes
    fn alloc_uninit(&mut self, size: usize) -> Result<(Handle, &mut [u8]), HeapError> {
        let handle = self.allocate(size)?;
        let buf = self
            .get_mut(handle)
            .ok_or(HeapError::InvalidPointer {
                offset: handle.offset(),
            })?;
        Ok((handle, buf))
    }

    /// Allocates memory and copies data into it
    fn alloc(&mut self, data: &[u8]) -> Result<Handle, HeapError> {
        let (handle, buf) = self.alloc_uninit(data.len())?;
        buf[..data.len()].copy_from_slice(data);
        Ok(handle)
    }

    /// Frees all allocated memory, resetting the allocator
    fn clear(&mut self);
}
