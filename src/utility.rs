//! Contains utilities for implementing the wire format.

/// A calculator for the 32-bit one's-complement checksum carried by every
/// segment.
///
/// Bytes are summed as big-endian `u32` words. A trailing pair of bytes is
/// added as a `u16` and a final odd byte as a `u8`, so both ends of a
/// connection always agree on how a region is folded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(u32);

impl Checksum {
    /// Creates a new checksum calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `u32` to the checksum value, folding the carry back in.
    pub fn add_u32(&mut self, value: u32) {
        let (sum, carry) = self.0.overflowing_add(value);
        self.0 = sum + carry as u32;
    }

    /// Adds a `u16` to the checksum value.
    pub fn add_u16(&mut self, value: u16) {
        self.add_u32(value as u32);
    }

    /// Adds a single byte to the checksum value.
    pub fn add_u8(&mut self, value: u8) {
        self.add_u32(value as u32);
    }

    /// Adds every byte of `bytes` to the checksum value.
    pub fn accumulate(&mut self, bytes: &[u8]) {
        let mut words = bytes.chunks_exact(4);
        for word in &mut words {
            self.add_u32(u32::from_be_bytes([word[0], word[1], word[2], word[3]]));
        }
        match *words.remainder() {
            [a, b, c] => {
                self.add_u16(u16::from_be_bytes([a, b]));
                self.add_u8(c);
            }
            [a, b] => self.add_u16(u16::from_be_bytes([a, b])),
            [a] => self.add_u8(a),
            _ => {}
        }
    }

    /// Computes the final checksum value.
    pub fn as_u32(&self) -> u32 {
        !self.0
    }
}

/// Computes the checksum of a serialized segment.
///
/// The region covers the first `header_length` bytes of `bytes`, plus
/// `payload_length` more when `include_payload` is set. When `bytes` already
/// contains a correct checksum the result is zero.
pub fn checksum(
    header_length: usize,
    include_payload: bool,
    bytes: &[u8],
    payload_length: usize,
) -> u32 {
    let mut end = header_length;
    if include_payload {
        end += payload_length;
    }
    let mut checksum = Checksum::new();
    checksum.accumulate(&bytes[..end.min(bytes.len())]);
    checksum.as_u32()
}

/// An extension trait for Iterator<Item = u8>. This should make it easier to parse bytes.
pub trait BytesExt: Iterator<Item = u8> {
    /// Advances the iterator and returns the next value.
    /// Functions identically to `Iterator<Item = u8>::next`.
    fn next_u8(&mut self) -> Option<u8> {
        self.next()
    }

    /// Advances the iterator by 2 bytes.
    /// Combines these 2 bytes in big-endian order into a u16.
    /// Returns None if there were fewer than 2 bytes left in the iterator.
    fn next_u16_be(&mut self) -> Option<u16> {
        let arr = [self.next()?, self.next()?];
        Some(u16::from_be_bytes(arr))
    }

    /// Advances the iterator by 4 bytes.
    /// Combines these 4 bytes in big-endian order into a u32.
    /// Returns None if there were fewer than 4 bytes left in the iterator.
    fn next_u32_be(&mut self) -> Option<u32> {
        let arr = [self.next()?, self.next()?, self.next()?, self.next()?];
        Some(u32::from_be_bytes(arr))
    }
}

impl<T: Iterator<Item = u8>> BytesExt for T {}
