//! Scratch block message descriptor encoding.
//!
//! Spill and fill intrinsics are lowered to scratch block read/write
//! messages late in the pipeline; the descriptor layout below is the
//! contract with that encoder. Only power-of-two payloads up to 8 rows are
//! encodable, which is why the coalescer rejects every other span.

use crate::GirError;

/// Bits 0..=11: scratch offset, in HWord (register row) units.
const OFFSET_MASK: u32 = 0xfff;
/// Bits 12..=13: block size encoding (1, 2, 4, or 8 rows).
const BLOCK_SIZE_SHIFT: u32 = 12;
/// Bit 15: channel mode (DWord scattered access).
const CHANNEL_MODE_DWORD: u32 = 1 << 15;
/// Bit 16: operation type; set for writes.
const OP_WRITE: u32 = 1 << 16;
/// Bit 18: scratch block message category.
const CATEGORY_SCRATCH: u32 = 1 << 18;

fn block_size_encoding(payload_rows: u32) -> Result<u32, GirError> {
    match payload_rows {
        1 => Ok(0b00),
        2 => Ok(0b01),
        4 => Ok(0b10),
        8 => Ok(0b11),
        other => Err(GirError::UnsupportedPayloadSize(other)),
    }
}

fn encode(payload_rows: u32, offset: u32, write: bool) -> Result<u32, GirError> {
    debug_assert!(offset <= OFFSET_MASK, "scratch offset out of descriptor range");
    let mut desc = CATEGORY_SCRATCH | CHANNEL_MODE_DWORD;
    desc |= block_size_encoding(payload_rows)? << BLOCK_SIZE_SHIFT;
    desc |= offset & OFFSET_MASK;
    if write {
        desc |= OP_WRITE;
    }
    Ok(desc)
}

/// Encodes the descriptor of a scratch write of `payload_rows` rows at
/// `offset`.
pub fn encode_spill_desc(payload_rows: u32, offset: u32) -> Result<u32, GirError> {
    encode(payload_rows, offset, true)
}

/// Encodes the descriptor of a scratch read of `payload_rows` rows at
/// `offset`.
pub fn encode_fill_desc(payload_rows: u32, offset: u32) -> Result<u32, GirError> {
    encode(payload_rows, offset, false)
}
