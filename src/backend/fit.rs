//! Free-block search strategies
//!
//! The strategy is a type parameter of [`Heap`](crate::prelude::Heap), so the
//! choice is made at build time. [`DefaultFit`] is [`BestFit`] unless the
//! `first-fit` feature is enabled.

use crate::backend::block::FreeBlock;

mod sealed {
    pub trait Sealed {}
}

/// Picks a free block for a request of `wanted` blocks
pub trait FitStrategy: sealed::Sealed {
    /// Name used in log output
    const NAME: &'static str;

    /// Returns the index of the chosen block, scanning `candidates` in
    /// free-list order
    fn select<I>(candidates: I, wanted: u16) -> Option<u16>
    where
        I: Iterator<Item = FreeBlock>;
}

/// Smallest block that fits; ties go to the first one scanned
#[derive(Clone, Copy, Debug, Default)]
pub struct BestFit;

/// First block that fits
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstFit;

impl sealed::Sealed for BestFit {}
impl sealed::Sealed for FirstFit {}

impl FitStrategy for BestFit {
    const NAME: &'static str = "best-fit";

    fn select<I>(candidates: I, wanted: u16) -> Option<u16>
    where
        I: Iterator<Item = FreeBlock>,
    {
        let mut best: Option<FreeBlock> = None;
        for block in candidates {
            if block.len < wanted {
                continue;
            }
            if block.len == wanted {
                return Some(block.index);
            }
            if best.is_none_or(|b| block.len < b.len) {
                best = Some(block);
            }
        }
        best.map(|b| b.index)
    }
}

impl FitStrategy for FirstFit {
    const NAME: &'static str = "first-fit";

    fn select<I>(mut candidates: I, wanted: u16) -> Option<u16>
    where
        I: Iterator<Item = FreeBlock>,
    {
        candidates.find(|b| b.len >= wanted).map(|b| b.index)
    }
}

/// Strategy selected by the crate features
#[cfg(feature = "first-fit")]
pub type DefaultFit = FirstFit;

/// Strategy selected by the crate features
#[cfg(not(feature = "first-fit"))]
pub type DefaultFit = BestFit;
