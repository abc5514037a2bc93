use super::{header_length_for, Description, Header, SegmentHeader, SegmentKind, CHECKSUM_OFFSET};
use crate::{config::ConnectionConfiguration, utility::checksum, PROTOCOL_VERSION};
use thiserror::Error as ThisError;

fn common(description: Description, seq: u16, ack: Option<u16>) -> SegmentHeader {
    let mut description = description;
    description.set_ack(ack.is_some());
    SegmentHeader {
        description,
        protocol_version: PROTOCOL_VERSION,
        reserved: 0,
        seq,
        ack: ack.unwrap_or(0),
        // Filled in by serialize()
        header_length: 0,
        checksum: 0,
    }
}

/// A connection request carrying our configuration, acknowledging the
/// peer's SYN when `ack` is given.
pub fn build_syn(config: ConnectionConfiguration, seq: u16, ack: Option<u16>) -> Header {
    let mut description = Description::default();
    description.set_syn(true);
    Header::Syn {
        base: common(description, seq, ack),
        config,
    }
}

/// A reset with the given error code.
pub fn build_rst(error_code: u8, seq: u16, ack: Option<u16>) -> Header {
    let mut description = Description::default();
    description.set_rst(true);
    let mut base = common(description, seq, ack);
    base.reserved = error_code;
    Header::Rst { base }
}

/// A keep-alive. Always acknowledges.
pub fn build_nul(seq: u16, ack: u16) -> Header {
    let mut description = Description::default();
    description.set_nul(true);
    Header::Nul {
        base: common(description, seq, Some(ack)),
    }
}

/// A bare acknowledgment.
pub fn build_ack(seq: u16, ack: u16) -> Header {
    build_with_payload(seq, ack, 0)
}

/// An acknowledgment carrying `payload_length` bytes of data.
pub fn build_with_payload(seq: u16, ack: u16, payload_length: u16) -> Header {
    let mut description = Description::default();
    description.set_chk(payload_length > 0);
    Header::Payload {
        base: common(description, seq, Some(ack)),
        payload_length,
    }
}

/// An extended acknowledgment. Acknowledgments beyond what a header can
/// hold are dropped; the returned header lists the ones that fit.
pub fn build_eack(seq: u16, ack: u16, acks: &[u16]) -> Header {
    build_eack_with_payload(seq, ack, acks, 0)
}

/// An extended acknowledgment carrying `payload_length` bytes of data.
pub fn build_eack_with_payload(seq: u16, ack: u16, acks: &[u16], payload_length: u16) -> Header {
    let (_, fit) = header_length_for(SegmentKind::Eack, acks.len());
    let mut description = Description::default();
    description.set_eack(true);
    description.set_chk(payload_length > 0);
    Header::Eack {
        base: common(description, seq, Some(ack)),
        payload_length,
        acks: acks[..fit].to_vec(),
    }
}

impl Header {
    /// Appends the wire form of this header and `payload` to `out`,
    /// returning the number of bytes written.
    ///
    /// The header is written once with its length and checksum zeroed, then
    /// both are patched in place once the full segment is known. On success
    /// `self` holds the values that went on the wire.
    pub fn serialize(&mut self, payload: &[u8], out: &mut Vec<u8>) -> Result<usize, BuildError> {
        let actual: u16 = payload
            .len()
            .try_into()
            .map_err(|_| BuildError::OverlyLongPayload)?;
        if !self.base().description.has_payload_length() && actual > 0 {
            Err(BuildError::PayloadNotAllowed)?
        }
        let declared = self.payload_length();
        if declared != actual {
            Err(BuildError::PayloadLengthMismatch { declared, actual })?
        }

        let start = out.len();
        let base = *self.base();
        out.push(base.description.into());
        out.push(base.protocol_version);
        out.push(base.reserved);
        out.push(0);
        out.extend_from_slice(&base.seq.to_be_bytes());
        out.extend_from_slice(&base.ack.to_be_bytes());
        out.extend_from_slice(&[0; 4]);

        match self {
            Header::Syn { config, .. } => {
                out.extend_from_slice(&config.options.to_be_bytes());
                out.extend_from_slice(&config.retransmission_timeout.to_be_bytes());
                out.extend_from_slice(&config.null_segment_timeout.to_be_bytes());
                out.extend_from_slice(&config.max_segment_size.to_be_bytes());
                out.push(config.max_retransmissions);
                out.push(config.max_outstanding_segments);
            }
            Header::Rst { .. } | Header::Nul { .. } => {}
            Header::Payload { payload_length, .. } => {
                out.extend_from_slice(&payload_length.to_be_bytes());
            }
            Header::Eack {
                payload_length,
                acks,
                ..
            } => {
                out.extend_from_slice(&payload_length.to_be_bytes());
                for ack in acks.iter() {
                    out.extend_from_slice(&ack.to_be_bytes());
                }
            }
        }

        let header_length: u8 = match (out.len() - start).try_into() {
            Ok(header_length) => header_length,
            Err(_) => {
                out.truncate(start);
                Err(BuildError::OverlyLongHeader)?
            }
        };
        out.extend_from_slice(payload);

        let segment = &mut out[start..];
        segment[3] = header_length;
        let checksum = checksum(
            header_length as usize,
            base.description.chk(),
            segment,
            payload.len(),
        );
        segment[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_be_bytes());

        let base = self.base_mut();
        base.header_length = header_length;
        base.checksum = checksum;
        Ok(out.len() - start)
    }
}

/// An error that occurred while serializing a segment
#[derive(Debug, ThisError, PartialEq, Eq, Clone, Copy)]
pub enum BuildError {
    #[error("The payload is longer than can fit into a single segment")]
    OverlyLongPayload,
    #[error("The header declares {declared} payload bytes but {actual} were given")]
    PayloadLengthMismatch { declared: u16, actual: u16 },
    #[error("SYN, RST and NUL segments cannot carry a payload")]
    PayloadNotAllowed,
    #[error("The header does not fit in 255 bytes")]
    OverlyLongHeader,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{MAX_EACKS, SYN_HEADER_LENGTH};

    #[test]
    fn syn_layout() {
        let config = ConnectionConfiguration::default()
            .with_options(0x0102)
            .with_max_outstanding_segments(7);
        let mut header = build_syn(config, 0xABCD, None);
        let mut out = vec![];
        let len = header.serialize(&[], &mut out).unwrap();
        assert_eq!(len, SYN_HEADER_LENGTH as usize);
        assert_eq!(out.len(), 22);
        assert_eq!(out[0], 0b0000_0001);
        assert_eq!(out[1], PROTOCOL_VERSION);
        assert_eq!(out[3], 22);
        assert_eq!(&out[4..6], &[0xAB, 0xCD]);
        assert_eq!(&out[6..8], &[0, 0]);
        assert_eq!(&out[12..14], &[0x01, 0x02]);
        assert_eq!(&out[14..16], &600u16.to_be_bytes());
        assert_eq!(&out[16..18], &2000u16.to_be_bytes());
        assert_eq!(&out[18..20], &1400u16.to_be_bytes());
        assert_eq!(out[20], 5);
        assert_eq!(out[21], 7);
        assert_eq!(header.base().header_length, 22);
        assert_eq!(
            u32::from_be_bytes([out[8], out[9], out[10], out[11]]),
            header.base().checksum
        );
        assert_eq!(checksum(22, false, &out, 0), 0);
    }

    #[test]
    fn data_segment_layout() {
        let mut header = build_with_payload(7, 3, 5);
        assert!(header.base().description.chk());
        let mut out = vec![0xEE];
        let len = header.serialize(b"hello", &mut out).unwrap();
        assert_eq!(len, 19);
        // Serialization appends after existing contents
        assert_eq!(out[0], 0xEE);
        let segment = &out[1..];
        assert_eq!(segment[0], 0b0010_1000);
        assert_eq!(segment[3], 14);
        assert_eq!(&segment[12..14], &[0, 5]);
        assert_eq!(&segment[14..], b"hello");
        assert_eq!(checksum(14, true, segment, 5), 0);
    }

    #[test]
    fn rst_carries_error_code() {
        let mut header = build_rst(0x42, 9, Some(4));
        let mut out = vec![];
        header.serialize(&[], &mut out).unwrap();
        assert_eq!(out.len(), 12);
        assert_eq!(out[0], 0b0000_1010);
        assert_eq!(out[2], 0x42);
    }

    #[test]
    fn eack_truncates_to_fit() {
        let acks: Vec<u16> = (0..200).collect();
        let mut header = build_eack(1, 2, &acks);
        match &header {
            Header::Eack { acks, .. } => assert_eq!(acks.len(), MAX_EACKS),
            other => panic!("expected EACK, got {other:?}"),
        }
        let mut out = vec![];
        header.serialize(&[], &mut out).unwrap();
        assert_eq!(out[3], 254);
        assert_eq!(&out[14..18], &[0, 0, 0, 1]);
    }

    #[test]
    fn rejects_mismatched_payloads() {
        let mut out = vec![];
        assert_eq!(
            build_ack(1, 1).serialize(b"abc", &mut out),
            Err(BuildError::PayloadLengthMismatch {
                declared: 0,
                actual: 3
            })
        );
        assert_eq!(
            build_nul(1, 1).serialize(b"abc", &mut out),
            Err(BuildError::PayloadNotAllowed)
        );
        assert!(out.is_empty());
    }
}
