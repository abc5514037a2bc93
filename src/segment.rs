//! The RUDP wire format.
//!
//! Every segment starts with a 12 byte common header, followed by a
//! kind-specific extension and, for data-bearing kinds, the payload. All
//! multi-byte fields are big-endian.
//!
//! ```text
//!  0        1        2        3        4               6               8
//! +--------+--------+--------+--------+---------------+---------------+
//! |  desc  |version |reserved| hdrlen |      seq      |      ack      |
//! +--------+--------+--------+--------+---------------+---------------+
//! |             checksum              |   extension (SYN: 10 bytes,   |
//! +-----------------------------------+   ACK/EACK: payload length    |
//!                                     |   then EACK list) ...         |
//!                                     +-------------------------------+
//! ```

mod builder;
mod header;
mod parsing;

pub use builder::*;
pub use header::*;
pub use parsing::*;

/// Length of the header every segment starts with.
pub const COMMON_HEADER_LENGTH: u8 = 12;
/// Length of a SYN header: the common header plus the connection
/// configuration.
pub const SYN_HEADER_LENGTH: u8 = COMMON_HEADER_LENGTH + 10;
/// Length of an RST header.
pub const RST_HEADER_LENGTH: u8 = COMMON_HEADER_LENGTH;
/// Length of a NUL header.
pub const NUL_HEADER_LENGTH: u8 = COMMON_HEADER_LENGTH;
/// Length of an ACK header: the common header plus the payload length.
pub const ACK_HEADER_LENGTH: u8 = COMMON_HEADER_LENGTH + 2;
/// The header length field is a single byte.
pub const MAX_HEADER_LENGTH: u8 = u8::MAX;
/// The most acknowledgments an EACK header has room for.
pub const MAX_EACKS: usize = (MAX_HEADER_LENGTH - ACK_HEADER_LENGTH) as usize / 2;
/// Byte offset of the checksum field.
pub const CHECKSUM_OFFSET: usize = 8;
