use super::{
    ACK_HEADER_LENGTH, MAX_EACKS, NUL_HEADER_LENGTH, RST_HEADER_LENGTH, SYN_HEADER_LENGTH,
};
use crate::config::ConnectionConfiguration;

/// The fields shared by every segment.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Flags describing what kind of segment this is
    pub description: Description,
    /// Always [`PROTOCOL_VERSION`](crate::PROTOCOL_VERSION) on the wire
    pub protocol_version: u8,
    /// Unused except by RST, which carries an error code here
    pub reserved: u8,
    /// The number of bytes before the payload. Filled in by serialization.
    pub header_length: u8,
    /// The sequence number of this segment. Data segments and SYN consume
    /// one; ACK, EACK without payload, NUL and RST repeat the next unused one.
    pub seq: u16,
    /// If the ACK flag is set, the latest in-order sequence number the sender
    /// has received.
    pub ack: u16,
    /// The one's-complement checksum. Filled in by serialization.
    pub checksum: u32,
}

/// A parsed or about-to-be-serialized header, split by the extension its
/// description calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Syn {
        base: SegmentHeader,
        config: ConnectionConfiguration,
    },
    Rst {
        base: SegmentHeader,
    },
    Nul {
        base: SegmentHeader,
    },
    /// A plain ACK, with or without payload
    Payload {
        base: SegmentHeader,
        payload_length: u16,
    },
    /// An ACK that also lists out-of-sequence segments already received
    Eack {
        base: SegmentHeader,
        payload_length: u16,
        acks: Vec<u16>,
    },
}

impl Header {
    pub fn base(&self) -> &SegmentHeader {
        match self {
            Header::Syn { base, .. }
            | Header::Rst { base }
            | Header::Nul { base }
            | Header::Payload { base, .. }
            | Header::Eack { base, .. } => base,
        }
    }

    pub fn base_mut(&mut self) -> &mut SegmentHeader {
        match self {
            Header::Syn { base, .. }
            | Header::Rst { base }
            | Header::Nul { base }
            | Header::Payload { base, .. }
            | Header::Eack { base, .. } => base,
        }
    }

    /// The payload length this header declares. Zero for kinds that carry no
    /// payload length field.
    pub fn payload_length(&self) -> u16 {
        match self {
            Header::Payload { payload_length, .. } | Header::Eack { payload_length, .. } => {
                *payload_length
            }
            _ => 0,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            Header::Syn { .. } => SegmentKind::Syn,
            Header::Rst { .. } => SegmentKind::Rst,
            Header::Nul { .. } => SegmentKind::Nul,
            Header::Payload { .. } => SegmentKind::Ack,
            Header::Eack { .. } => SegmentKind::Eack,
        }
    }
}

/// The header layouts a segment can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Syn,
    Rst,
    Nul,
    Ack,
    Eack,
}

/// Computes the header length for a segment of the given kind. For EACK,
/// `eack_count` is truncated to what fits in a header and the number that
/// fit is returned alongside.
pub fn header_length_for(kind: SegmentKind, eack_count: usize) -> (u8, usize) {
    match kind {
        SegmentKind::Syn => (SYN_HEADER_LENGTH, 0),
        SegmentKind::Rst => (RST_HEADER_LENGTH, 0),
        SegmentKind::Nul => (NUL_HEADER_LENGTH, 0),
        SegmentKind::Ack => (ACK_HEADER_LENGTH, 0),
        SegmentKind::Eack => {
            let fit = eack_count.min(MAX_EACKS);
            // Cannot overflow: MAX_EACKS keeps this at or below 255
            (ACK_HEADER_LENGTH + (fit * 2) as u8, fit)
        }
    }
}

/// Whether a description byte names a well-formed segment. SYN, RST and NUL
/// exclude each other, and a segment that is none of them must carry ACK or
/// EACK.
pub fn validate_description(description: Description) -> bool {
    let exclusive = description.syn() as u8 + description.rst() as u8 + description.nul() as u8;
    match exclusive {
        0 => description.ack() || description.eack(),
        1 => true,
        _ => false,
    }
}

/// The description bits of a segment header
#[derive(Default, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Description(u8);

impl Description {
    const SYN: u8 = 0;
    const RST: u8 = 1;
    const NUL: u8 = 2;
    const ACK: u8 = 3;
    const EACK: u8 = 4;
    const CHK: u8 = 5;

    /// Get whether this is a connection request
    pub const fn syn(self) -> bool {
        self.bit(Self::SYN)
    }

    pub fn set_syn(&mut self, state: bool) {
        self.set_bit(Self::SYN, state);
    }

    /// Get whether this is a reset
    pub const fn rst(self) -> bool {
        self.bit(Self::RST)
    }

    pub fn set_rst(&mut self, state: bool) {
        self.set_bit(Self::RST, state);
    }

    /// Get whether this is a keep-alive
    pub const fn nul(self) -> bool {
        self.bit(Self::NUL)
    }

    pub fn set_nul(&mut self, state: bool) {
        self.set_bit(Self::NUL, state);
    }

    /// Get whether the acknowledgment field is significant
    pub const fn ack(self) -> bool {
        self.bit(Self::ACK)
    }

    pub fn set_ack(&mut self, state: bool) {
        self.set_bit(Self::ACK, state);
    }

    /// Get whether the header carries a list of extended acknowledgments
    pub const fn eack(self) -> bool {
        self.bit(Self::EACK)
    }

    pub fn set_eack(&mut self, state: bool) {
        self.set_bit(Self::EACK, state);
    }

    /// Get whether the checksum covers the payload too
    pub const fn chk(self) -> bool {
        self.bit(Self::CHK)
    }

    pub fn set_chk(&mut self, state: bool) {
        self.set_bit(Self::CHK, state);
    }

    /// Whether the header carries a payload length field, which is the case
    /// for everything except SYN, RST and NUL.
    pub const fn has_payload_length(self) -> bool {
        !(self.syn() || self.rst() || self.nul())
    }

    /// Get the given bit
    const fn bit(self, bit: u8) -> bool {
        (self.0 >> bit) & 0b1 == 1
    }

    /// Set the given bit
    fn set_bit(&mut self, bit: u8, state: bool) {
        self.0 = (self.0 & !(1 << bit)) | ((state as u8) << bit);
    }
}

impl From<u8> for Description {
    fn from(n: u8) -> Self {
        Self(n)
    }
}

impl From<Description> for u8 {
    fn from(description: Description) -> Self {
        description.0
    }
}

impl std::fmt::Debug for Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = [
            (self.syn(), "SYN"),
            (self.rst(), "RST"),
            (self.nul(), "NUL"),
            (self.ack(), "ACK"),
            (self.eack(), "EACK"),
            (self.chk(), "CHK"),
        ];
        write!(f, "Description(")?;
        let mut wrote = false;
        for (_, name) in flags.iter().filter(|(set, _)| *set) {
            if wrote {
                write!(f, ", ")?;
            }
            wrote = true;
            write!(f, "{name}")?;
        }
        write!(f, ")")
    }
}
