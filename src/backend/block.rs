//! Block headers overlaid on the arena
//!
//! The arena is cut into 8-byte blocks. Every block boundary carries this
//! header, stored in native byte order:
//!
//! ```text
//!  0      2      4           6           8
//!  +------+------+-----------+-----------+
//!  | next | prev | next_free | prev_free |
//!  +------+------+-----------+-----------+
//!                ^ payload of an allocated block starts here
//! ```
//!
//! `next`/`prev` link every block in address order, `next_free`/`prev_free`
//! link the free blocks and are only meaningful while the block is free.
//! Bit 15 of `next` is the free flag, the low 15 bits are the index.

/// Size of one block in bytes
pub const BLOCK_SIZE: usize = 8;

/// Offset of the payload inside the first block of an allocation
pub const BODY_OFFSET: usize = 4;

/// Free flag in the `next` field
pub const FREE_MASK: u16 = 0x8000;

/// Index bits of the `next` field
pub const INDEX_MASK: u16 = 0x7FFF;

/// Most blocks an arena can be cut into
pub const MAX_BLOCKS: usize = INDEX_MASK as usize + 1;

const NEXT: usize = 0;
const PREV: usize = 2;
const NEXT_FREE: usize = 4;
const PREV_FREE: usize = 6;

/// Number of blocks needed for `payload` bytes, `None` when it can never fit
pub const fn blocks_for(payload: usize) -> Option<u16> {
    let blocks = if payload <= BLOCK_SIZE - BODY_OFFSET {
        1
    } else {
        // first block carries 4 payload bytes, the rest a full 8
        2 + (payload - (BLOCK_SIZE - BODY_OFFSET) - 1) / BLOCK_SIZE
    };
    if blocks > INDEX_MASK as usize {
        None
    } else {
        Some(blocks as u16)
    }
}

/// Payload bytes held by a run of `blocks` blocks
pub const fn payload_of(blocks: u16) -> usize {
    blocks as usize * BLOCK_SIZE - BODY_OFFSET
}

/// A free block as seen by a fit strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
    /// Block index
    pub index: u16,
    /// Length in blocks
    pub len: u16,
}

/// Typed view of the block headers inside the arena
pub(crate) struct Blocks<'a> {
    bytes: &'a mut [u8],
    count: u16,
}

impl<'a> Blocks<'a> {
    /// Wraps an arena already cut into `count` blocks
    pub(crate) fn new(bytes: &'a mut [u8], count: u16) -> Self {
        debug_assert!(count as usize * BLOCK_SIZE <= bytes.len());
        Self { bytes, count }
    }

    /// Writes the empty-heap layout: head, one free block, terminator
    pub(crate) fn format(&mut self) {
        let last = self.last();
        self.bytes[..self.count as usize * BLOCK_SIZE].fill(0);

        self.set_next(0, 1, false);
        self.set_prev(0, last);
        self.set_next_free(0, 1);
        self.set_prev_free(0, 1);

        self.set_next(1, last, true);
        self.set_prev(1, 0);
        self.set_next_free(1, 0);
        self.set_prev_free(1, 0);

        self.set_next(last, 0, false);
        self.set_prev(last, 1);
    }

    /// Index of the terminator block
    #[inline]
    pub(crate) fn last(&self) -> u16 {
        self.count - 1
    }

    #[inline]
    pub(crate) fn bytes(&self) -> &[u8] {
        &*self.bytes
    }

    #[inline]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.bytes
    }

    #[inline]
    fn read(&self, block: u16, field: usize) -> u16 {
        let at = block as usize * BLOCK_SIZE + field;
        u16::from_ne_bytes([self.bytes[at], self.bytes[at + 1]])
    }

    #[inline]
    fn write(&mut self, block: u16, field: usize, value: u16) {
        let at = block as usize * BLOCK_SIZE + field;
        self.bytes[at..at + 2].copy_from_slice(&value.to_ne_bytes());
    }

    /// Raw `next` field, free flag included
    #[inline]
    pub(crate) fn next_raw(&self, block: u16) -> u16 {
        self.read(block, NEXT)
    }

    #[inline]
    pub(crate) fn next(&self, block: u16) -> u16 {
        self.next_raw(block) & INDEX_MASK
    }

    #[inline]
    pub(crate) fn is_free(&self, block: u16) -> bool {
        self.next_raw(block) & FREE_MASK != 0
    }

    #[inline]
    pub(crate) fn prev(&self, block: u16) -> u16 {
        self.read(block, PREV)
    }

    #[inline]
    pub(crate) fn next_free(&self, block: u16) -> u16 {
        self.read(block, NEXT_FREE)
    }

    #[inline]
    pub(crate) fn prev_free(&self, block: u16) -> u16 {
        self.read(block, PREV_FREE)
    }

    /// Length in blocks, derived from the forward link
    #[inline]
    pub(crate) fn len(&self, block: u16) -> u16 {
        self.next(block).wrapping_sub(block)
    }

    pub(crate) fn set_next(&mut self, block: u16, next: u16, free: bool) {
        debug_assert!(next <= INDEX_MASK);
        let flag = if free { FREE_MASK } else { 0 };
        self.write(block, NEXT, next | flag);
    }

    pub(crate) fn set_free(&mut self, block: u16, free: bool) {
        let next = self.next(block);
        self.set_next(block, next, free);
    }

    pub(crate) fn set_prev(&mut self, block: u16, prev: u16) {
        self.write(block, PREV, prev);
    }

    pub(crate) fn set_next_free(&mut self, block: u16, next: u16) {
        self.write(block, NEXT_FREE, next);
    }

    pub(crate) fn set_prev_free(&mut self, block: u16, prev: u16) {
        self.write(block, PREV_FREE, prev);
    }

    /// Byte offset of a block's payload area
    #[inline]
    pub(crate) fn body(block: u16) -> usize {
        block as usize * BLOCK_SIZE + BODY_OFFSET
    }

    /// Cuts `block` after `blocks` blocks; the tail gets `tail_free` as its flag
    pub(crate) fn split(&mut self, block: u16, blocks: u16, tail_free: bool) {
        let tail = block + blocks;
        let next = self.next(block);
        let free = self.is_free(block);

        self.set_next(tail, next, tail_free);
        self.set_prev(tail, block);
        self.set_prev(next, tail);
        self.set_next(block, tail, free);
    }

    /// Absorbs the following block into `block`, keeping `block`'s flag
    pub(crate) fn absorb_next(&mut self, block: u16) {
        let gone = self.next(block);
        let next = self.next(gone);
        let free = self.is_free(block);

        self.set_prev(next, block);
        self.set_next(block, next, free);
    }

    /// Pushes `block` onto the head of the free list
    pub(crate) fn push_free(&mut self, block: u16) {
        let head = self.next_free(0);
        self.set_prev_free(head, block);
        self.set_next_free(block, head);
        self.set_prev_free(block, 0);
        self.set_next_free(0, block);
    }

    /// Takes `block` off the free list
    pub(crate) fn unlink_free(&mut self, block: u16) {
        let prev = self.prev_free(block);
        let next = self.next_free(block);
        self.set_next_free(prev, next);
        self.set_prev_free(next, prev);
    }

    /// Puts `new` in place of `old` on the free list
    pub(crate) fn replace_free(&mut self, old: u16, new: u16) {
        let prev = self.prev_free(old);
        let next = self.next_free(old);
        self.set_next_free(prev, new);
        self.set_prev_free(next, new);
        self.set_next_free(new, next);
        self.set_prev_free(new, prev);
    }

    /// Walks the free list in list order, at most `count` steps
    pub(crate) fn free_blocks(&self) -> FreeBlocks<'_, 'a> {
        FreeBlocks {
            blocks: self,
            cur: self.next_free(0),
            remaining: self.count,
        }
    }
}

/// Iterator over the free list
pub(crate) struct FreeBlocks<'b, 'a> {
    blocks: &'b Blocks<'a>,
    cur: u16,
    remaining: u16,
}

impl Iterator for FreeBlocks<'_, '_> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<FreeBlock> {
        if self.cur == 0 || self.cur >= self.blocks.count || self.remaining == 0 {
            return None;
        }
        let index = self.cur;
        self.remaining -= 1;
        self.cur = self.blocks.next_free(index);
        Some(FreeBlock {
            index,
            len: self.blocks.len(index),
        })
    }
}
