//! Offsets in the 16-bit sequence space.
//!
//! Every window in the engine is a base plus a length, so the only
//! comparison it needs is how far forward of a base a sequence number sits:
//!
//! ```text
//!        base                 base + len
//!         |                       |
//!   ------[-----------------------]--------
//!         0   1   2   ...        len
//! ```
//!
//! Numbers just behind the base wrap to large offsets, which puts them
//! outside any window that is not close to the whole space.

/// How far `seq` lies past `base`, going forward around the ring.
pub fn seq_offset(seq: u16, base: u16) -> u16 {
    seq.wrapping_sub(base)
}

/// Whether `seq` lies in the inclusive range `[start, start + len]`.
pub fn is_in_window(seq: u16, start: u16, len: u16) -> bool {
    seq_offset(seq, start) <= len
}
