//! Guard-byte stamping around allocations
//!
//! Layout of a poisoned payload area, starting at the block body:
//!
//! ```text
//! [ len (1/2/4 bytes, LE) ][ before guard ][ user bytes ... ][ after guard ]
//!                                          ^ handle
//! ```
//!
//! Storing the exact request length lets a single byte of overrun be caught
//! even when the block has slack behind it.

use crate::config::{LenWidth, POISON_BYTE, PoisonConfig};
use crate::error::{Corruption, GuardRegion};

fn write_len(bytes: &mut [u8], at: usize, width: LenWidth, len: usize) {
    let raw = (len as u32).to_le_bytes();
    let n = width.bytes();
    bytes[at..at + n].copy_from_slice(&raw[..n]);
}

/// Request length recorded in the payload area starting at `body`
pub(crate) fn stored_len(bytes: &[u8], body: usize, cfg: &PoisonConfig) -> usize {
    let mut raw = [0u8; 4];
    let n = cfg.len_width.bytes();
    raw[..n].copy_from_slice(&bytes[body..body + n]);
    u32::from_le_bytes(raw) as usize
}

/// Records `len` and stamps both guards
pub(crate) fn stamp(bytes: &mut [u8], body: usize, len: usize, cfg: &PoisonConfig) {
    write_len(bytes, body, cfg.len_width, len);

    let before = body + cfg.len_width.bytes();
    bytes[before..before + cfg.before].fill(POISON_BYTE);

    let after = before + cfg.before + len;
    bytes[after..after + cfg.after].fill(POISON_BYTE);
}

fn check_region(
    bytes: &[u8],
    start: usize,
    size: usize,
    block: u16,
    region: GuardRegion,
) -> Result<(), Corruption> {
    match bytes[start..start + size]
        .iter()
        .position(|&b| b != POISON_BYTE)
    {
        Some(i) => Err(Corruption::Poison {
            block,
            region,
            offset: start + i,
        }),
        None => Ok(()),
    }
}

/// Verifies the guards of the allocation in `block` and returns its length
///
/// `capacity` is the payload size of the block, used to reject a damaged
/// length field before it sends the check outside the block.
pub(crate) fn check(
    bytes: &[u8],
    block: u16,
    body: usize,
    capacity: usize,
    cfg: &PoisonConfig,
) -> Result<usize, Corruption> {
    let len = stored_len(bytes, body, cfg);
    if len.saturating_add(cfg.overhead()) > capacity {
        return Err(Corruption::LengthField { block, len });
    }

    let before = body + cfg.len_width.bytes();
    check_region(bytes, before, cfg.before, block, GuardRegion::Before)?;
    check_region(
        bytes,
        before + cfg.before + len,
        cfg.after,
        block,
        GuardRegion::After,
    )?;
    Ok(len)
}
