//! Error and corruption reports

use core::fmt;

/// Which guard region of a poisoned allocation failed its check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardRegion {
    /// Pattern between the length field and the payload
    Before,
    /// Pattern right after the requested byte range
    After,
}

/// Description of a failed integrity or poison check
///
/// Block numbers are indices into the arena in 8-byte units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corruption {
    /// The head or terminator block no longer has its fixed shape
    Sentinel,
    /// A block's forward link does not point strictly past it
    BlockOrder {
        /// Block whose `next` is bad
        block: u16,
    },
    /// A block's backward link disagrees with the forward walk
    BackLink {
        /// Block whose `prev` is bad
        block: u16,
    },
    /// Two neighbouring blocks are both marked free
    AdjacentFree {
        /// Second block of the free pair
        block: u16,
    },
    /// A free-list link is out of range or not mirrored by its neighbour
    FreeLink {
        /// Free-list member with the bad link
        block: u16,
    },
    /// A free-list member is not marked free
    FreeFlag {
        /// Listed block without the free flag
        block: u16,
    },
    /// The free list and the free flags disagree on the number of free blocks
    FreeCount {
        /// Blocks carrying the free flag
        flagged: u16,
        /// Blocks reached through the free list
        listed: u16,
    },
    /// A guard pattern around an allocation was overwritten
    Poison {
        /// Block holding the allocation
        block: u16,
        /// Guard that failed
        region: GuardRegion,
        /// Arena offset of the first bad byte
        offset: usize,
    },
    /// The stored request length does not fit the block
    LengthField {
        /// Block holding the allocation
        block: u16,
        /// Length found in the field
        len: usize,
    },
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Corruption::Sentinel => write!(f, "heap sentinel damaged"),
            Corruption::BlockOrder { block } => {
                write!(f, "block {block} links backwards or out of range")
            }
            Corruption::BackLink { block } => write!(f, "block {block} has a broken back link"),
            Corruption::AdjacentFree { block } => {
                write!(f, "block {block} is free next to a free block")
            }
            Corruption::FreeLink { block } => write!(f, "free list broken at block {block}"),
            Corruption::FreeFlag { block } => {
                write!(f, "block {block} is on the free list but not marked free")
            }
            Corruption::FreeCount { flagged, listed } => write!(
                f,
                "{flagged} blocks marked free but {listed} on the free list"
            ),
            Corruption::Poison {
                block,
                region,
                offset,
            } => write!(
                f,
                "poison {region:?} block {block} overwritten at byte {offset}"
            ),
            Corruption::LengthField { block, len } => {
                write!(f, "block {block} stores impossible length {len}")
            }
        }
    }
}

/// Errors returned by heap operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapError {
    /// The arena cannot hold the head, one free block and the terminator
    BufferTooSmall {
        /// Bytes handed in
        size: usize,
        /// Bytes needed
        min: usize,
    },
    /// Zero-byte requests are refused
    ZeroSize,
    /// No free block is large enough
    OutOfMemory {
        /// Bytes asked for
        requested: usize,
    },
    /// The handle does not name a live allocation
    InvalidPointer {
        /// Offset carried by the rejected handle
        offset: usize,
    },
    /// A consistency check failed; the heap was left untouched
    Corruption(Corruption),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::BufferTooSmall { size, min } => {
                write!(f, "heap buffer of {size} bytes is below the {min} byte minimum")
            }
            HeapError::ZeroSize => write!(f, "zero-sized request"),
            HeapError::OutOfMemory { requested } => {
                write!(f, "out of memory allocating {requested} bytes")
            }
            HeapError::InvalidPointer { offset } => {
                write!(f, "offset {offset} is not a live allocation")
            }
            HeapError::Corruption(c) => write!(f, "heap corruption: {c}"),
        }
    }
}

impl From<Corruption> for HeapError {
    fn from(c: Corruption) -> Self {
        HeapError::Corruption(c)
    }
}

impl core::error::Error for HeapError {}
