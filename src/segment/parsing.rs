use super::{
    validate_description, Description, Header, SegmentHeader, ACK_HEADER_LENGTH,
    NUL_HEADER_LENGTH, RST_HEADER_LENGTH, SYN_HEADER_LENGTH,
};
use crate::{
    config::ConnectionConfiguration,
    utility::{checksum, BytesExt},
    PROTOCOL_VERSION,
};
use thiserror::Error as ThisError;

/// An error that occurred while parsing a segment
#[derive(Debug, ThisError, PartialEq, Eq, Clone, Copy)]
pub enum ParseError {
    #[error("The segment is truncated or its lengths are inconsistent")]
    PacketInvalid,
    #[error("Expected protocol version {expected:#04x} but the segment carries {actual:#04x}")]
    ProtocolVersionMismatch { expected: u8, actual: u8 },
    #[error("The checksum did not verify, leaving residue {residue:#010x}")]
    ChecksumMismatch { residue: u32 },
}

/// A parsed segment borrowing its payload from the datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

/// Receives the outcome of [`deserialize`], one callback per segment kind.
pub trait SegmentHandler {
    fn on_syn(&mut self, header: &SegmentHeader, config: ConnectionConfiguration);
    fn on_rst(&mut self, header: &SegmentHeader);
    fn on_nul(&mut self, header: &SegmentHeader);
    fn on_eack(&mut self, header: &SegmentHeader, acks: &[u16], payload: &[u8]);
    fn on_regular(&mut self, header: &SegmentHeader, payload: &[u8]);
    fn on_invalid(&mut self, error: ParseError);
}

/// Parses `bytes` and hands the result to exactly one callback of `handler`.
pub fn deserialize<H: SegmentHandler + ?Sized>(bytes: &[u8], handler: &mut H) {
    match parse(bytes) {
        Ok(Segment { header, payload }) => match header {
            Header::Syn { base, config } => handler.on_syn(&base, config),
            Header::Rst { base } => handler.on_rst(&base),
            Header::Nul { base } => handler.on_nul(&base),
            Header::Payload { base, .. } => handler.on_regular(&base, payload),
            Header::Eack { base, acks, .. } => handler.on_eack(&base, &acks, payload),
        },
        Err(e) => handler.on_invalid(e),
    }
}

/// Parses a whole datagram as one segment.
///
/// Checks happen in a fixed order: field reads must fit, then the protocol
/// version, the description, the lengths, the checksum, and last the shape
/// of the EACK list.
pub fn parse(bytes: &[u8]) -> Result<Segment<'_>, ParseError> {
    let mut iter = bytes.iter().cloned();
    let mut next_u8 = || iter.next_u8().ok_or(ParseError::PacketInvalid);
    let description = Description::from(next_u8()?);
    let protocol_version = next_u8()?;
    let reserved = next_u8()?;
    let header_length = next_u8()?;
    let seq = iter.next_u16_be().ok_or(ParseError::PacketInvalid)?;
    let ack = iter.next_u16_be().ok_or(ParseError::PacketInvalid)?;
    let stored_checksum = iter.next_u32_be().ok_or(ParseError::PacketInvalid)?;

    if protocol_version != PROTOCOL_VERSION {
        Err(ParseError::ProtocolVersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: protocol_version,
        })?
    }
    if !validate_description(description) {
        Err(ParseError::PacketInvalid)?
    }

    let base = SegmentHeader {
        description,
        protocol_version,
        reserved,
        header_length,
        seq,
        ack,
        checksum: stored_checksum,
    };
    let header_end = header_length as usize;

    let payload_length = if description.has_payload_length() {
        let payload_length = iter.next_u16_be().ok_or(ParseError::PacketInvalid)?;
        if header_length < ACK_HEADER_LENGTH
            || header_end + payload_length as usize != bytes.len()
            || (payload_length > 0 && !description.chk())
        {
            Err(ParseError::PacketInvalid)?
        }
        payload_length
    } else {
        let expected = if description.syn() {
            SYN_HEADER_LENGTH
        } else if description.rst() {
            RST_HEADER_LENGTH
        } else {
            NUL_HEADER_LENGTH
        };
        if header_length != expected || bytes.len() != header_end {
            Err(ParseError::PacketInvalid)?
        }
        0
    };

    let residue = checksum(
        header_end,
        description.chk(),
        bytes,
        payload_length as usize,
    );
    if residue != 0 {
        Err(ParseError::ChecksumMismatch { residue })?
    }

    let payload = &bytes[header_end..];
    let header = if description.syn() {
        let config = ConnectionConfiguration {
            options: iter.next_u16_be().ok_or(ParseError::PacketInvalid)?,
            retransmission_timeout: iter.next_u16_be().ok_or(ParseError::PacketInvalid)?,
            null_segment_timeout: iter.next_u16_be().ok_or(ParseError::PacketInvalid)?,
            max_segment_size: iter.next_u16_be().ok_or(ParseError::PacketInvalid)?,
            max_retransmissions: iter.next_u8().ok_or(ParseError::PacketInvalid)?,
            max_outstanding_segments: iter.next_u8().ok_or(ParseError::PacketInvalid)?,
        };
        Header::Syn { base, config }
    } else if description.rst() {
        Header::Rst { base }
    } else if description.nul() {
        Header::Nul { base }
    } else {
        let region = &bytes[ACK_HEADER_LENGTH as usize..header_end];
        if description.eack() {
            if region.len() % 2 != 0 {
                Err(ParseError::PacketInvalid)?
            }
            let acks = region
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Header::Eack {
                base,
                payload_length,
                acks,
            }
        } else {
            if !region.is_empty() {
                Err(ParseError::PacketInvalid)?
            }
            Header::Payload {
                base,
                payload_length,
            }
        }
    };

    Ok(Segment { header, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{
        build_ack, build_eack_with_payload, build_nul, build_rst, build_syn, build_with_payload,
    };

    fn serialize(mut header: Header, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![];
        header.serialize(payload, &mut out).unwrap();
        out
    }

    #[derive(Debug, Default, PartialEq)]
    struct Recorder(Vec<String>);

    impl SegmentHandler for Recorder {
        fn on_syn(&mut self, header: &SegmentHeader, config: ConnectionConfiguration) {
            self.0.push(format!(
                "syn {} {} {}",
                header.seq, header.ack, config.max_outstanding_segments
            ));
        }

        fn on_rst(&mut self, header: &SegmentHeader) {
            self.0.push(format!("rst {} {}", header.seq, header.reserved));
        }

        fn on_nul(&mut self, header: &SegmentHeader) {
            self.0.push(format!("nul {} {}", header.seq, header.ack));
        }

        fn on_eack(&mut self, header: &SegmentHeader, acks: &[u16], payload: &[u8]) {
            self.0.push(format!("eack {} {acks:?} {payload:?}", header.seq));
        }

        fn on_regular(&mut self, header: &SegmentHeader, payload: &[u8]) {
            self.0.push(format!("regular {} {} {payload:?}", header.seq, header.ack));
        }

        fn on_invalid(&mut self, error: ParseError) {
            self.0.push(format!("invalid {error:?}"));
        }
    }

    fn dispatch(bytes: &[u8]) -> String {
        let mut recorder = Recorder::default();
        deserialize(bytes, &mut recorder);
        assert_eq!(recorder.0.len(), 1);
        recorder.0.remove(0)
    }

    #[test]
    fn dispatches_by_kind() {
        let config = ConnectionConfiguration::default().with_max_outstanding_segments(9);
        assert_eq!(dispatch(&serialize(build_syn(config, 100, Some(7)), &[])), "syn 100 7 9");
        assert_eq!(dispatch(&serialize(build_rst(3, 5, None), &[])), "rst 5 3");
        assert_eq!(dispatch(&serialize(build_nul(8, 2), &[])), "nul 8 2");
        assert_eq!(
            dispatch(&serialize(build_with_payload(11, 4, 2), &[1, 2])),
            "regular 11 4 [1, 2]"
        );
        assert_eq!(
            dispatch(&serialize(build_eack_with_payload(12, 4, &[14, 16], 1), &[9])),
            "eack 12 [14, 16] [9]"
        );
    }

    #[test]
    fn parse_recovers_header() {
        let config = ConnectionConfiguration::default();
        let cases: [(Header, &[u8]); 5] = [
            (build_syn(config, 300, Some(101)), &[]),
            (build_rst(2, 40, Some(17)), &[]),
            (build_nul(41, 17), &[]),
            (build_ack(42, 17), &[]),
            (build_eack_with_payload(42, 17, &[19, 23, 24], 4), b"data"),
        ];
        for (mut header, payload) in cases {
            let mut out = vec![];
            header.serialize(payload, &mut out).unwrap();
            let segment = parse(&out).unwrap();
            // Serializing fills in the length and checksum, which parsing reads back
            assert_eq!(segment.header, header);
            assert_eq!(segment.payload, payload);
        }
    }

    #[test]
    fn truncated() {
        let bytes = serialize(build_with_payload(1, 1, 3), b"abc");
        assert_eq!(parse(&bytes[..5]), Err(ParseError::PacketInvalid));
        assert_eq!(parse(&bytes[..13]), Err(ParseError::PacketInvalid));
        assert_eq!(parse(&bytes[..16]), Err(ParseError::PacketInvalid));
        assert_eq!(parse(&[]), Err(ParseError::PacketInvalid));
    }

    #[test]
    fn wrong_version() {
        let mut bytes = serialize(build_nul(1, 1), &[]);
        bytes[1] = 2;
        assert_eq!(
            parse(&bytes),
            Err(ParseError::ProtocolVersionMismatch {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn version_checked_before_description() {
        let mut bytes = serialize(build_nul(1, 1), &[]);
        bytes[0] = 0b11;
        bytes[1] = 9;
        assert!(matches!(
            parse(&bytes),
            Err(ParseError::ProtocolVersionMismatch { .. })
        ));
    }

    #[test]
    fn bad_description() {
        let mut bytes = serialize(build_nul(1, 1), &[]);
        // NUL and RST together
        bytes[0] |= 0b10;
        assert_eq!(parse(&bytes), Err(ParseError::PacketInvalid));
    }

    #[test]
    fn inconsistent_lengths() {
        let mut bytes = serialize(build_with_payload(1, 1, 3), b"abc");
        bytes.push(0);
        assert_eq!(parse(&bytes), Err(ParseError::PacketInvalid));

        let mut bytes = serialize(build_rst(0, 1, None), &[]);
        bytes.push(0);
        assert_eq!(parse(&bytes), Err(ParseError::PacketInvalid));
    }

    #[test]
    fn corrupted_checksum() {
        let segments = [
            serialize(build_syn(Default::default(), 1, None), &[]),
            serialize(build_rst(3, 9, Some(4)), &[]),
            serialize(build_nul(9, 4), &[]),
            serialize(build_with_payload(10, 4, 3), b"abc"),
            serialize(build_eack_with_payload(11, 4, &[13, 16], 2), b"de"),
        ];
        for bytes in segments {
            let description = Description::from(bytes[0]);
            // Flipping the description, version, header length or payload
            // length is caught before the checksum is looked at
            let covered = (2..bytes.len()).filter(|&i| {
                i != 3 && !(description.has_payload_length() && (12..14).contains(&i))
            });
            for i in covered {
                let mut corrupted = bytes.clone();
                corrupted[i] ^= 0xFF;
                assert!(
                    matches!(parse(&corrupted), Err(ParseError::ChecksumMismatch { .. })),
                    "flipping byte {i} of {description:?} went unnoticed"
                );
            }
        }

        let mut bytes = serialize(build_syn(Default::default(), 1, None), &[]);
        bytes[20] = bytes[20].wrapping_add(1);
        assert!(matches!(
            parse(&bytes),
            Err(ParseError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn odd_eack_region() {
        // An EACK whose list is one byte short of a whole entry. The header
        // is rebuilt by hand so the checksum still verifies.
        let mut bytes = serialize(build_eack_with_payload(1, 1, &[5], 0), &[]);
        bytes.pop();
        bytes[3] = 15;
        bytes[8..12].copy_from_slice(&[0; 4]);
        let sum = checksum(15, false, &bytes, 0);
        bytes[8..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(parse(&bytes), Err(ParseError::PacketInvalid));
    }
}
