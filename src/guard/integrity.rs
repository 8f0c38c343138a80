//! Structural walk over both block lists

use crate::backend::block::Blocks;
use crate::error::Corruption;

/// Checks the address list, the free list and their agreement
///
/// Returns the number of free blocks on success. Every loop is bounded by the
/// block count, so a damaged link cannot make the walk spin.
pub(crate) fn check(blocks: &Blocks<'_>) -> Result<u16, Corruption> {
    let last = blocks.last();

    if blocks.next_raw(0) != 1 || blocks.prev(0) != last || blocks.next_raw(last) != 0 {
        return Err(Corruption::Sentinel);
    }

    // Address order: strictly increasing, mirrored back links, no free pairs.
    let mut flagged: u16 = 0;
    let mut prev: u16 = 0;
    let mut prev_free = false;
    let mut cur: u16 = 1;
    while cur != last {
        let next = blocks.next(cur);
        if next <= cur || next > last {
            return Err(Corruption::BlockOrder { block: cur });
        }
        if blocks.prev(cur) != prev {
            return Err(Corruption::BackLink { block: cur });
        }
        let free = blocks.is_free(cur);
        if free {
            if prev_free {
                return Err(Corruption::AdjacentFree { block: cur });
            }
            flagged += 1;
        }
        prev_free = free;
        prev = cur;
        cur = next;
    }
    if blocks.prev(last) != prev {
        return Err(Corruption::BackLink { block: last });
    }

    // Free list: in range, flagged, a real block boundary, mirrored links.
    let mut listed: u16 = 0;
    let mut prev: u16 = 0;
    let mut cur = blocks.next_free(0);
    while cur != 0 {
        if listed == flagged {
            return Err(Corruption::FreeCount {
                flagged,
                listed: listed + 1,
            });
        }
        if cur >= last {
            return Err(Corruption::FreeLink { block: cur });
        }
        if !blocks.is_free(cur) {
            return Err(Corruption::FreeFlag { block: cur });
        }
        // neighbours must be in range before they are followed
        let (before, after) = (blocks.prev(cur), blocks.next(cur));
        if blocks.prev_free(cur) != prev
            || before >= cur
            || after <= cur
            || after > last
            || blocks.next(before) != cur
            || blocks.prev(after) != cur
        {
            return Err(Corruption::FreeLink { block: cur });
        }
        listed += 1;
        prev = cur;
        cur = blocks.next_free(cur);
    }
    if blocks.prev_free(0) != prev {
        return Err(Corruption::FreeLink { block: 0 });
    }
    if listed != flagged {
        return Err(Corruption::FreeCount { flagged, listed });
    }

    Ok(flagged)
}
