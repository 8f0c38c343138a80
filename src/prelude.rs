//! Prelude module for convenient imports
//!
//! This is the **only public API** for ummheap. All items should be accessed through:
//! ```
//! use ummheap::prelude::*;
//! ```

pub use crate::Allocator;
pub use crate::Handle;

pub use crate::backend::block::{BLOCK_SIZE, FreeBlock};
pub use crate::backend::fit::{BestFit, DefaultFit, FirstFit, FitStrategy};
pub use crate::backend::heap::{Heap, HeapInfo};

pub use crate::config::{
    Config, InvalidPointerPolicy, LenWidth, POISON_BYTE, PoisonConfig, log_corruption,
};
pub use crate::error::{Corruption, GuardRegion, HeapError};

#[cfg(feature = "global-alloc")]
pub use crate::global::{LockedHeap, RawSpinlock};
