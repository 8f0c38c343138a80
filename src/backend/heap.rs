//! The heap engine
//!
//! Blocks are carved out of one caller-owned arena and tracked by two
//! doubly-linked lists stored in the block headers themselves (see
//! [`block`](crate::backend::block)). Allocation splits a free block, free
//! merges with both neighbours immediately, so two free blocks are never
//! adjacent.

use core::marker::PhantomData;

use crate::backend::block::{BLOCK_SIZE, BODY_OFFSET, Blocks, MAX_BLOCKS, blocks_for, payload_of};
use crate::backend::fit::{DefaultFit, FitStrategy};
use crate::config::{Config, InvalidPointerPolicy};
use crate::error::{Corruption, HeapError};
use crate::guard::{integrity, poison};
use crate::{Allocator, Handle};

/// Head, one free block and the terminator
const MIN_BLOCKS: usize = 3;

/// Usage summary returned by [`Heap::info`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapInfo {
    /// Blocks between the head and the terminator
    pub total_blocks: usize,
    /// Blocks held by live allocations
    pub used_blocks: usize,
    /// Blocks on the free list
    pub free_blocks: usize,
    /// Number of live allocations
    pub used_entries: usize,
    /// Number of free runs
    pub free_entries: usize,
    /// Length of the largest free run in blocks
    pub max_free_blocks: usize,
}

impl HeapInfo {
    /// Bytes held by free blocks, headers included
    pub fn free_bytes(&self) -> usize {
        self.free_blocks * BLOCK_SIZE
    }

    /// Largest request a single free run could still satisfy, before poison overhead
    pub fn max_free_payload(&self) -> usize {
        match self.max_free_blocks {
            0 => 0,
            n => payload_of(n as u16),
        }
    }
}

/// Best-fit/first-fit heap over a borrowed arena
///
/// The strategy `S` is fixed by type. Use [`Heap::new`] for the
/// feature-selected default and [`Heap::with_strategy`] to pick one.
///
/// # Examples
///
/// ```
/// use ummheap::prelude::*;
///
/// let mut arena = [0u8; 1024];
/// let mut heap = Heap::new(&mut arena, Config::PLAIN).unwrap();
///
/// let handle = heap.alloc(b"hello").unwrap();
/// assert_eq!(&heap.get(handle).unwrap()[..5], b"hello");
///
/// heap.free(handle).unwrap();
/// assert!(heap.is_empty());
/// ```
pub struct Heap<'a, S: FitStrategy = DefaultFit> {
    blocks: Blocks<'a>,
    config: Config,
    live: usize,
    _strategy: PhantomData<S>,
}

impl<'a> Heap<'a> {
    /// Formats `arena` as an empty heap using the default strategy
    pub fn new(arena: &'a mut [u8], config: Config) -> Result<Self, HeapError> {
        Self::with_strategy(arena, config)
    }
}

impl<'a, S: FitStrategy> Heap<'a, S> {
    /// Formats `arena` as an empty heap searched with `S`
    ///
    /// Fails with [`HeapError::BufferTooSmall`] below three blocks. Bytes
    /// past 32768 blocks are left unused.
    pub fn with_strategy(arena: &'a mut [u8], config: Config) -> Result<Self, HeapError> {
        let available = arena.len() / BLOCK_SIZE;
        if available < MIN_BLOCKS {
            return Err(HeapError::BufferTooSmall {
                size: arena.len(),
                min: MIN_BLOCKS * BLOCK_SIZE,
            });
        }
        if available > MAX_BLOCKS {
            log::warn!(
                "heap: {} bytes past {} blocks left unused",
                arena.len() - MAX_BLOCKS * BLOCK_SIZE,
                MAX_BLOCKS
            );
        }

        let count = available.min(MAX_BLOCKS) as u16;
        let mut blocks = Blocks::new(arena, count);
        blocks.format();
        log::debug!("heap: {} blocks, {}", count, S::NAME);

        Ok(Self {
            blocks,
            config,
            live: 0,
            _strategy: PhantomData,
        })
    }

    /// Configuration the heap was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start of the arena
    pub fn base_ptr(&self) -> *const u8 {
        self.blocks.bytes().as_ptr()
    }

    /// Address of a handle's first byte
    pub fn address_of(&mut self, handle: Handle) -> *mut u8 {
        self.blocks
            .bytes_mut()
            .as_mut_ptr()
            .wrapping_add(handle.offset())
    }

    /// Handle for an address inside the arena
    pub fn handle_at(&self, ptr: *const u8) -> Option<Handle> {
        let offset = (ptr as usize).checked_sub(self.base_ptr() as usize)?;
        (offset < self.blocks.bytes().len()).then_some(Handle::from_offset(offset))
    }

    /// Alignment every handle's address is guaranteed to have
    pub fn user_alignment(&self) -> usize {
        let first = self.base_ptr() as usize + BODY_OFFSET + self.config.prefix();
        1 << first.trailing_zeros().min(BLOCK_SIZE.trailing_zeros())
    }

    /// Walks both lists and, with poisoning on, every guard region
    ///
    /// Runs automatically before each operation when
    /// [`Config::integrity_check`] is set. A failure is passed to the
    /// corruption hook and returned.
    pub fn check_integrity(&self) -> Result<(), HeapError> {
        integrity::check(&self.blocks).map_err(|c| self.corrupted(c))?;
        self.poison_walk().map_err(|c| self.corrupted(c))
    }

    /// Verifies the guards of every live allocation
    ///
    /// Does nothing when poisoning is off.
    pub fn check_poison(&self) -> Result<(), HeapError> {
        self.poison_walk().map_err(|c| self.corrupted(c))
    }

    /// Block and entry counts, walked in address order
    pub fn info(&self) -> HeapInfo {
        let mut info = HeapInfo::default();
        let last = self.blocks.last();
        let mut cur: u16 = 1;
        while cur != last {
            let next = self.blocks.next(cur);
            if next <= cur || next > last {
                break;
            }
            let len = (next - cur) as usize;
            info.total_blocks += len;
            if self.blocks.is_free(cur) {
                info.free_blocks += len;
                info.free_entries += 1;
                info.max_free_blocks = info.max_free_blocks.max(len);
            } else {
                info.used_blocks += len;
                info.used_entries += 1;
            }
            cur = next;
        }
        info
    }

    /// Bytes held by free blocks
    pub fn free_bytes(&self) -> usize {
        self.info().free_bytes()
    }

    /// Allocates `count * size` zeroed bytes
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<Handle, HeapError> {
        let total = count
            .checked_mul(size)
            .ok_or(HeapError::OutOfMemory { requested: usize::MAX })?;
        let handle = self.allocate(total)?;
        if let Some(bytes) = self.get_mut(handle) {
            bytes.fill(0);
        }
        Ok(handle)
    }

    fn handle_of(&self, block: u16) -> Handle {
        Handle::from_offset(Blocks::body(block) + self.config.prefix())
    }

    /// Block behind a handle, if it names a live allocation
    fn block_of(&self, handle: Handle) -> Option<u16> {
        let start = handle
            .offset()
            .checked_sub(BODY_OFFSET + self.config.prefix())?;
        if start % BLOCK_SIZE != 0 {
            return None;
        }
        let last = self.blocks.last();
        let block = start / BLOCK_SIZE;
        if block == 0 || block >= last as usize {
            return None;
        }
        let block = block as u16;

        // Only real block boundaries count, not offsets inside a block.
        let mut cur: u16 = 1;
        while cur < block {
            let next = self.blocks.next(cur);
            if next <= cur || next > last {
                return None;
            }
            cur = next;
        }
        (cur == block && !self.blocks.is_free(block)).then_some(block)
    }

    fn resolve(&self, handle: Handle) -> Result<u16, HeapError> {
        self.block_of(handle).ok_or_else(|| self.invalid(handle))
    }

    fn invalid(&self, handle: Handle) -> HeapError {
        match self.config.invalid_pointer {
            InvalidPointerPolicy::Fatal => {
                panic!("heap: offset {} is not a live allocation", handle.offset())
            }
            InvalidPointerPolicy::Report => {
                log::warn!("heap: offset {} is not a live allocation", handle.offset());
                HeapError::InvalidPointer {
                    offset: handle.offset(),
                }
            }
        }
    }

    fn corrupted(&self, corruption: Corruption) -> HeapError {
        (self.config.on_corruption)(&corruption);
        HeapError::Corruption(corruption)
    }

    fn precheck(&self) -> Result<(), HeapError> {
        if self.config.integrity_check {
            self.check_integrity()
        } else {
            Ok(())
        }
    }

    fn poison_walk(&self) -> Result<(), Corruption> {
        let Some(cfg) = self.config.poison else {
            return Ok(());
        };
        let last = self.blocks.last();
        let mut cur: u16 = 1;
        while cur != last {
            let next = self.blocks.next(cur);
            if next <= cur || next > last {
                return Err(Corruption::BlockOrder { block: cur });
            }
            if !self.blocks.is_free(cur) {
                poison::check(
                    self.blocks.bytes(),
                    cur,
                    Blocks::body(cur),
                    payload_of(next - cur),
                    &cfg,
                )?;
            }
            cur = next;
        }
        Ok(())
    }

    fn verify(&self, block: u16) -> Result<(), HeapError> {
        match self.config.poison {
            Some(cfg) => poison::check(
                self.blocks.bytes(),
                block,
                Blocks::body(block),
                payload_of(self.blocks.len(block)),
                &cfg,
            )
            .map(|_| ())
            .map_err(|c| self.corrupted(c)),
            None => Ok(()),
        }
    }

    fn stamp(&mut self, block: u16, len: usize) {
        if let Some(cfg) = self.config.poison {
            poison::stamp(self.blocks.bytes_mut(), Blocks::body(block), len, &cfg);
        }
    }

    fn blocks_needed(&self, size: usize) -> Option<u16> {
        if let Some(cfg) = self.config.poison {
            if size > cfg.len_width.max_len() {
                return None;
            }
        }
        blocks_for(size.checked_add(self.config.overhead())?)
    }

    /// Bytes the caller may use in `block`
    fn usable(&self, block: u16) -> usize {
        let capacity = payload_of(self.blocks.len(block)).saturating_sub(self.config.overhead());
        match self.config.poison {
            Some(cfg) => {
                poison::stored_len(self.blocks.bytes(), Blocks::body(block), &cfg).min(capacity)
            }
            None => capacity,
        }
    }

    /// Finds, splits and unlinks a free run of exactly `wanted` blocks
    fn take_blocks(&mut self, wanted: u16) -> Option<u16> {
        let found = S::select(self.blocks.free_blocks(), wanted)?;
        if self.blocks.len(found) > wanted {
            // the tail stays free and keeps the found block's list position
            self.blocks.split(found, wanted, true);
            self.blocks.replace_free(found, found + wanted);
        } else {
            self.blocks.unlink_free(found);
        }
        self.blocks.set_free(found, false);
        Some(found)
    }

    /// Returns `block` to the free list, merging with free neighbours
    ///
    /// Never runs the integrity check, so callers already inside an
    /// operation can use it.
    fn release(&mut self, block: u16) {
        let next = self.blocks.next(block);
        if self.blocks.is_free(next) {
            self.blocks.unlink_free(next);
            self.blocks.absorb_next(block);
        }

        let prev = self.blocks.prev(block);
        if self.blocks.is_free(prev) {
            self.blocks.absorb_next(prev);
        } else {
            self.blocks.set_free(block, true);
            self.blocks.push_free(block);
        }
    }

    /// Gives the blocks past `keep` back to the heap
    fn trim(&mut self, block: u16, keep: u16) {
        if self.blocks.len(block) > keep {
            self.blocks.split(block, keep, false);
            self.release(block + keep);
        }
    }

    #[cfg(test)]
    pub(crate) fn arena(&self) -> &[u8] {
        self.blocks.bytes()
    }

    #[cfg(test)]
    pub(crate) fn arena_mut(&mut self) -> &mut [u8] {
        self.blocks.bytes_mut()
    }

    #[cfg(test)]
    pub(crate) fn block_len(&self, handle: Handle) -> Option<u16> {
        self.block_of(handle).map(|b| self.blocks.len(b))
    }
}

impl<S: FitStrategy> Allocator for Heap<'_, S> {
    fn allocate(&mut self, size: usize) -> Result<Handle, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        self.precheck()?;

        let block = self
            .blocks_needed(size)
            .and_then(|wanted| self.take_blocks(wanted));
        let Some(block) = block else {
            log::debug!("heap: allocate({size}) -> out of memory");
            return Err(HeapError::OutOfMemory { requested: size });
        };

        self.live += 1;
        self.stamp(block, size);
        let handle = self.handle_of(block);
        log::trace!(
            "heap: allocate({size}) -> block {block} x{}",
            self.blocks.len(block)
        );
        Ok(handle)
    }

    fn resize(&mut self, handle: Handle, size: usize) -> Result<Handle, HeapError> {
        self.precheck()?;
        let block = self.resolve(handle)?;
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        self.verify(block)?;

        let wanted = self
            .blocks_needed(size)
            .ok_or(HeapError::OutOfMemory { requested: size })?;
        let current = self.blocks.len(block);

        if wanted <= current {
            self.trim(block, wanted);
            self.stamp(block, size);
            log::trace!("heap: resize block {block} x{current} -> x{wanted} in place");
            return Ok(handle);
        }

        let next = self.blocks.next(block);
        if self.blocks.is_free(next) && current + self.blocks.len(next) >= wanted {
            self.blocks.unlink_free(next);
            self.blocks.absorb_next(block);
            self.trim(block, wanted);
            self.stamp(block, size);
            log::trace!("heap: resize block {block} x{current} -> x{wanted} grown in place");
            return Ok(handle);
        }

        let keep = self.usable(block).min(size);
        let Some(moved) = self.take_blocks(wanted) else {
            log::debug!("heap: resize block {block} to {size} bytes -> out of memory");
            return Err(HeapError::OutOfMemory { requested: size });
        };
        let from = handle.offset();
        let to = self.handle_of(moved);
        self.blocks
            .bytes_mut()
            .copy_within(from..from + keep, to.offset());
        self.stamp(moved, size);
        self.release(block);
        log::trace!("heap: resize block {block} x{current} -> block {moved} x{wanted}");
        Ok(to)
    }

    fn free(&mut self, handle: Handle) -> Result<(), HeapError> {
        self.precheck()?;
        let block = self.resolve(handle)?;
        self.verify(block)?;

        self.release(block);
        self.live -= 1;
        log::trace!("heap: free block {block}");
        Ok(())
    }

    fn get(&self, handle: Handle) -> Option<&[u8]> {
        let block = self.block_of(handle)?;
        let start = handle.offset();
        Some(&self.blocks.bytes()[start..start + self.usable(block)])
    }

    fn get_mut(&mut self, handle: Handle) -> Option<&mut [u8]> {
        let block = self.block_of(handle)?;
        let start = handle.offset();
        let len = self.usable(block);
        Some(&mut self.blocks.bytes_mut()[start..start + len])
    }

    fn len(&self) -> usize {
        self.live
    }

    fn capacity(&self) -> usize {
        let largest = payload_of(self.blocks.last() - 1).saturating_sub(self.config.overhead());
        match self.config.poison {
            Some(cfg) => largest.min(cfg.len_width.max_len()),
            None => largest,
        }
    }

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn clear(&mut self) {
        self.blocks.format();
        self.live = 0;
    }
}
