//! Lower transport wire types, constants, and bit-exact framing.
//!
//! Header layouts follow the Mesh Profile v1.0.1 §3.5.2. All multi-byte
//! fields are big-endian; bit fields are packed MSB first within each byte.

use crate::address::Address;
use crate::error::{TransportError, TransportResult};
use bytes::{BufMut, Bytes, BytesMut};

/// Lower transport protocol constants.
pub mod constants {
    /// Largest access payload that still fits one unsegmented PDU.
    pub const MAX_UNSEGMENTED_ACCESS_PAYLOAD: usize = 11;
    /// Payload bytes carried by every access segment except possibly the last.
    pub const MAX_SEGMENT_ACCESS_PAYLOAD: usize = 12;
    /// Largest control payload that still fits one unsegmented PDU.
    pub const MAX_UNSEGMENTED_CONTROL_PAYLOAD: usize = 8;
    /// Payload bytes carried by every control segment except possibly the last.
    pub const MAX_SEGMENT_CONTROL_PAYLOAD: usize = 8;
    /// A segmented transaction carries at most 32 segments.
    pub const MAX_SEGMENTS: usize = 32;
    /// Largest segmentable access payload (32 segments of 12 bytes).
    pub const MAX_ACCESS_PAYLOAD: usize = MAX_SEGMENTS * MAX_SEGMENT_ACCESS_PAYLOAD;
    /// Largest segmentable control payload (32 segments of 8 bytes).
    pub const MAX_CONTROL_PAYLOAD: usize = MAX_SEGMENTS * MAX_SEGMENT_CONTROL_PAYLOAD;

    pub const UNSEGMENTED_HEADER_LEN: usize = 1;
    pub const SEGMENTED_HEADER_LEN: usize = 4;
    /// Segment Acknowledgement parameters: OBO/SeqZero (2) + BlockAck (4).
    pub const SEGMENT_ACK_PAYLOAD_LEN: usize = 6;

    /// Segment Acknowledgement control opcode.
    pub const OPCODE_SEGMENT_ACK: u8 = 0x00;
    /// Heartbeat control opcode. Recognized but not interpreted here.
    pub const OPCODE_HEARTBEAT: u8 = 0x0A;

    /// SeqZero is the low 13 bits of a sequence number.
    pub const SEQ_ZERO_MASK: u32 = 0x1FFF;
    /// Sequence numbers are 24-bit.
    pub const SEQ_MASK: u32 = 0x00FF_FFFF;
}

use constants::*;

/// 24-bit sequence number, stored in the low bits of a `u32`.
pub type SequenceNumber = u32;

/// 56-bit monotonic replay-protection value: `(iv_index << 24) | seq`.
pub type SeqAuth = u64;

/// Combine an IV index and a 24-bit sequence number into a [`SeqAuth`].
pub fn seq_auth(iv_index: u32, seq: SequenceNumber) -> SeqAuth {
    ((iv_index as u64) << 24) | (seq & SEQ_MASK) as u64
}

/// Recover the sequence number of a transaction's first segment.
///
/// Returns the largest 24-bit value not greater than `seq` whose low 13 bits
/// equal `seq_zero`, wrapping within the 24-bit sequence space.
pub fn first_segment_seq(seq: SequenceNumber, seq_zero: u16) -> SequenceNumber {
    let seq = seq & SEQ_MASK;
    let seq_zero = (seq_zero as u32) & SEQ_ZERO_MASK;
    if (seq & SEQ_ZERO_MASK) >= seq_zero {
        (seq & !SEQ_ZERO_MASK) | seq_zero
    } else {
        (seq.wrapping_sub(SEQ_ZERO_MASK + 1) & !SEQ_ZERO_MASK & SEQ_MASK) | seq_zero
    }
}

/// Key that encrypted an access payload: the device key, or an application
/// key identified by its 6-bit AID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyId {
    Device,
    Application(u8),
}

impl KeyId {
    /// The AKF/AID header byte contribution: `AKF(1) | AID(6)`.
    fn akf_aid(self) -> u8 {
        match self {
            KeyId::Device => 0,
            KeyId::Application(aid) => 0x40 | (aid & 0x3F),
        }
    }

    fn from_header(header: u8) -> Self {
        if header & 0x40 != 0 {
            KeyId::Application(header & 0x3F)
        } else {
            KeyId::Device
        }
    }
}

/// Size of the MIC on segmented access messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SzMic {
    /// 32-bit TransMIC.
    #[default]
    Mic32,
    /// 64-bit TransMIC.
    Mic64,
}

impl SzMic {
    fn bit(self) -> u8 {
        match self {
            SzMic::Mic32 => 0,
            SzMic::Mic64 => 1,
        }
    }

    fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            SzMic::Mic32
        } else {
            SzMic::Mic64
        }
    }
}

/// A PDU exchanged with the network layer.
///
/// Inbound, the network layer has already de-obfuscated and authenticated
/// the fields and decrypted `transport_pdu`. Outbound, the network layer
/// applies its own TTL default when `ttl` is `None`; Segment Acks echo the
/// TTL of the segment that triggered them.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkPdu {
    pub src: Address,
    pub dst: Address,
    pub ttl: u8,
    /// Network-layer CTL bit: control (true) or access (false) class.
    pub ctl: bool,
    pub seq: SequenceNumber,
    pub transport_pdu: Bytes,
}

/// A framed lower transport PDU ready to hand to the network layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LowerSegment {
    pub src: Address,
    pub dst: Address,
    pub seq: SequenceNumber,
    /// `None` lets the network layer use its default TTL.
    pub ttl: Option<u8>,
    pub ctl: bool,
    pub transport_pdu: Bytes,
}

/// Decoded view of an inbound lower transport PDU.
#[derive(Debug, Clone, PartialEq)]
pub enum LowerPdu {
    UnsegmentedAccess {
        key: KeyId,
        payload: Bytes,
    },
    AccessSegment {
        key: KeyId,
        szmic: SzMic,
        seq_zero: u16,
        seg_o: u8,
        seg_n: u8,
        segment: Bytes,
    },
    UnsegmentedControl {
        opcode: u8,
        payload: Bytes,
    },
    ControlSegment {
        opcode: u8,
        seq_zero: u16,
        seg_o: u8,
        seg_n: u8,
        segment: Bytes,
    },
    SegmentAck(SegmentAck),
}

impl LowerPdu {
    /// Decode an access-class transport PDU (network CTL bit clear).
    pub fn decode_access(bytes: &Bytes) -> TransportResult<LowerPdu> {
        let header = *bytes
            .first()
            .ok_or_else(|| TransportError::malformed("empty access pdu"))?;
        let key = KeyId::from_header(header);
        if header & 0x80 == 0 {
            return Ok(LowerPdu::UnsegmentedAccess {
                key,
                payload: bytes.slice(UNSEGMENTED_HEADER_LEN..),
            });
        }
        let (szmic_bit, seq_zero, seg_o, seg_n, segment) =
            decode_segment_fields(bytes, MAX_SEGMENT_ACCESS_PAYLOAD)?;
        Ok(LowerPdu::AccessSegment {
            key,
            szmic: SzMic::from_bit(szmic_bit),
            seq_zero,
            seg_o,
            seg_n,
            segment,
        })
    }

    /// Decode a control-class transport PDU (network CTL bit set).
    pub fn decode_control(bytes: &Bytes) -> TransportResult<LowerPdu> {
        let header = *bytes
            .first()
            .ok_or_else(|| TransportError::malformed("empty control pdu"))?;
        let opcode = header & 0x7F;
        if header & 0x80 == 0 {
            if opcode == OPCODE_SEGMENT_ACK {
                let ack = SegmentAck::decode_payload(&bytes[UNSEGMENTED_HEADER_LEN..])?;
                return Ok(LowerPdu::SegmentAck(ack));
            }
            return Ok(LowerPdu::UnsegmentedControl {
                opcode,
                payload: bytes.slice(UNSEGMENTED_HEADER_LEN..),
            });
        }
        if opcode == OPCODE_SEGMENT_ACK {
            return Err(TransportError::malformed("segmented segment-ack"));
        }
        let (szmic_bit, seq_zero, seg_o, seg_n, segment) =
            decode_segment_fields(bytes, MAX_SEGMENT_CONTROL_PAYLOAD)?;
        // The SZMIC position is RFU on control segments.
        if szmic_bit != 0 {
            return Err(TransportError::malformed("reserved bit set in control segment"));
        }
        Ok(LowerPdu::ControlSegment {
            opcode,
            seq_zero,
            seg_o,
            seg_n,
            segment,
        })
    }
}

/// Decode bytes 1–3 of a segmented header plus the segment payload.
fn decode_segment_fields(
    bytes: &Bytes,
    max_segment: usize,
) -> TransportResult<(u8, u16, u8, u8, Bytes)> {
    if bytes.len() < SEGMENTED_HEADER_LEN + 1 {
        return Err(TransportError::malformed("truncated segmented pdu"));
    }
    let (b1, b2, b3) = (bytes[1], bytes[2], bytes[3]);
    let szmic_bit = (b1 >> 7) & 0x01;
    let seq_zero = (((b1 & 0x7F) as u16) << 6) | (((b2 & 0xFC) as u16) >> 2);
    let seg_o = ((b2 & 0x03) << 3) | ((b3 & 0xE0) >> 5);
    let seg_n = b3 & 0x1F;
    if seg_o > seg_n {
        return Err(TransportError::malformed("segment offset beyond final segment"));
    }
    let segment = bytes.slice(SEGMENTED_HEADER_LEN..);
    if seg_o < seg_n && segment.len() != max_segment {
        return Err(TransportError::malformed("non-final segment must be full size"));
    }
    if segment.len() > max_segment {
        return Err(TransportError::malformed("oversized segment"));
    }
    Ok((szmic_bit, seq_zero, seg_o, seg_n, segment))
}

/// Frame an unsegmented access PDU: `SEG=0 | AKF | AID` + payload.
pub fn encode_unsegmented_access(key: KeyId, payload: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(UNSEGMENTED_HEADER_LEN + payload.len());
    buf.put_u8(key.akf_aid());
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Frame one access segment with the shared 4-byte segmented header.
pub fn encode_access_segment(
    key: KeyId,
    szmic: SzMic,
    seq_zero: u16,
    seg_o: u8,
    seg_n: u8,
    segment: &Bytes,
) -> Bytes {
    encode_segment(0x80 | key.akf_aid(), szmic.bit(), seq_zero, seg_o, seg_n, segment)
}

/// Frame an unsegmented control PDU: `SEG=0 | OPCODE(7)` + payload.
///
/// Opcode `0x00` is reserved for Segment Acks and rejected here; use
/// [`SegmentAck::encode_pdu`] for those.
pub fn encode_unsegmented_control(opcode: u8, payload: &Bytes) -> TransportResult<Bytes> {
    if opcode == OPCODE_SEGMENT_ACK || opcode > 0x7F {
        return Err(TransportError::InvalidOpcode { opcode });
    }
    let mut buf = BytesMut::with_capacity(UNSEGMENTED_HEADER_LEN + payload.len());
    buf.put_u8(opcode);
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// Frame one control segment. The SZMIC position is reserved (0).
pub fn encode_control_segment(
    opcode: u8,
    seq_zero: u16,
    seg_o: u8,
    seg_n: u8,
    segment: &Bytes,
) -> Bytes {
    encode_segment(0x80 | (opcode & 0x7F), 0, seq_zero, seg_o, seg_n, segment)
}

fn encode_segment(b0: u8, szmic_bit: u8, seq_zero: u16, seg_o: u8, seg_n: u8, segment: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(SEGMENTED_HEADER_LEN + segment.len());
    buf.put_u8(b0);
    buf.put_u8((szmic_bit << 7) | ((seq_zero >> 6) as u8 & 0x7F));
    buf.put_u8(((seq_zero << 2) as u8 & 0xFC) | ((seg_o >> 3) & 0x03));
    buf.put_u8(((seg_o << 5) & 0xE0) | (seg_n & 0x1F));
    buf.extend_from_slice(segment);
    buf.freeze()
}

/// Segment Acknowledgement: which segments of a transaction have arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentAck {
    /// Acknowledged on behalf of a low-power node.
    pub obo: bool,
    pub seq_zero: u16,
    /// Bit `i` set iff segment `i` has been received. All-zero means the
    /// peer cancelled the transaction.
    pub block_ack: u32,
}

impl SegmentAck {
    /// Frame the complete 7-byte lower transport PDU: control header with
    /// opcode `0x00` followed by the 6-byte parameters.
    pub fn encode_pdu(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(UNSEGMENTED_HEADER_LEN + SEGMENT_ACK_PAYLOAD_LEN);
        buf.put_u8(OPCODE_SEGMENT_ACK);
        buf.put_u8(((self.obo as u8) << 7) | ((self.seq_zero >> 6) as u8 & 0x7F));
        buf.put_u8((self.seq_zero << 2) as u8 & 0xFC);
        buf.put_u32(self.block_ack);
        buf.freeze()
    }

    /// Decode the 6-byte parameters that follow the control header.
    pub fn decode_payload(payload: &[u8]) -> TransportResult<SegmentAck> {
        if payload.len() != SEGMENT_ACK_PAYLOAD_LEN {
            return Err(TransportError::malformed("segment-ack payload must be 6 bytes"));
        }
        if payload[1] & 0x03 != 0 {
            return Err(TransportError::malformed("reserved bits set in segment-ack"));
        }
        let obo = payload[0] & 0x80 != 0;
        let seq_zero = (((payload[0] & 0x7F) as u16) << 6) | (((payload[1] & 0xFC) as u16) >> 2);
        let block_ack = u32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]);
        Ok(SegmentAck {
            obo,
            seq_zero,
            block_ack,
        })
    }

    /// Whether segment `seg_o` is acknowledged.
    pub fn acked(&self, seg_o: u8) -> bool {
        self.block_ack & (1 << seg_o) != 0
    }
}

/// Set the bit for a received segment in a BlockAck bitmap.
pub fn block_ack_mark(block_ack: u32, seg_o: u8) -> u32 {
    block_ack | (1 << seg_o)
}

/// Whether a BlockAck bitmap covers every segment of a transaction.
pub fn block_ack_complete(block_ack: u32, seg_n: u8) -> bool {
    let all = all_segments_mask(seg_n);
    block_ack & all == all
}

/// Bitmap with one bit set per segment `0..=seg_n`.
pub fn all_segments_mask(seg_n: u8) -> u32 {
    if seg_n >= 31 {
        u32::MAX
    } else {
        (1u32 << (seg_n as u32 + 1)) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_segment_access_framing() {
        // 13-byte payload splits into a full 12-byte segment plus 1 byte.
        let payload = Bytes::from_static(&[
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
        ]);
        let key = KeyId::Application(0x05);

        let seg0 = encode_access_segment(key, SzMic::Mic32, 0x0001, 0, 1, &payload.slice(..12));
        let seg1 = encode_access_segment(key, SzMic::Mic32, 0x0001, 1, 1, &payload.slice(12..));

        assert_eq!(&seg0[..4], &[0xC5, 0x00, 0x04, 0x01]);
        assert_eq!(&seg0[4..], &payload[..12]);
        assert_eq!(&seg1[..4], &[0xC5, 0x00, 0x04, 0x21]);
        assert_eq!(&seg1[4..], &payload[12..]);
    }

    #[test]
    fn test_access_segment_roundtrip() {
        let segment = Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02, 0x03]);
        let pdu = encode_access_segment(KeyId::Application(0x3F), SzMic::Mic64, 0x1FFF, 7, 7, &segment);
        match LowerPdu::decode_access(&pdu).unwrap() {
            LowerPdu::AccessSegment {
                key,
                szmic,
                seq_zero,
                seg_o,
                seg_n,
                segment: got,
            } => {
                assert_eq!(key, KeyId::Application(0x3F));
                assert_eq!(szmic, SzMic::Mic64);
                assert_eq!(seq_zero, 0x1FFF);
                assert_eq!(seg_o, 7);
                assert_eq!(seg_n, 7);
                assert_eq!(got, segment);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_unsegmented_access_roundtrip() {
        let payload = Bytes::from_static(b"hello");
        let pdu = encode_unsegmented_access(KeyId::Device, &payload);
        assert_eq!(pdu[0], 0x00);
        match LowerPdu::decode_access(&pdu).unwrap() {
            LowerPdu::UnsegmentedAccess { key, payload: got } => {
                assert_eq!(key, KeyId::Device);
                assert_eq!(got, payload);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_control_segment_roundtrip() {
        let segment = Bytes::from_static(&[1, 2, 3]);
        let pdu = encode_control_segment(0x0A, 0x0042, 2, 2, &segment);
        match LowerPdu::decode_control(&pdu).unwrap() {
            LowerPdu::ControlSegment {
                opcode,
                seq_zero,
                seg_o,
                seg_n,
                segment: got,
            } => {
                assert_eq!(opcode, 0x0A);
                assert_eq!(seq_zero, 0x0042);
                assert_eq!(seg_o, 2);
                assert_eq!(seg_n, 2);
                assert_eq!(got, segment);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_segment_ack_roundtrip() {
        let ack = SegmentAck {
            obo: false,
            seq_zero: 0x0042,
            block_ack: 0b0000_0101,
        };
        let pdu = ack.encode_pdu();
        assert_eq!(pdu.len(), 7);
        assert_eq!(pdu[0], 0x00);
        // OBO=0, SeqZero=0x42: 0x42 >> 6 = 0x01, (0x42 << 2) & 0xFC = 0x08.
        assert_eq!(&pdu[1..3], &[0x01, 0x08]);
        assert_eq!(&pdu[3..7], &[0x00, 0x00, 0x00, 0x05]);

        match LowerPdu::decode_control(&pdu).unwrap() {
            LowerPdu::SegmentAck(got) => assert_eq!(got, ack),
            other => panic!("unexpected decode: {other:?}"),
        }
        assert!(ack.acked(0));
        assert!(!ack.acked(1));
        assert!(ack.acked(2));
    }

    #[test]
    fn test_reserved_bits_rejected() {
        // Segmented segment-ack.
        let pdu = encode_segment(0x80, 0, 0, 0, 0, &Bytes::from_static(&[0]));
        assert!(LowerPdu::decode_control(&pdu).is_err());

        // SZMIC position set on a control segment.
        let pdu = encode_segment(0x8A, 1, 0, 0, 0, &Bytes::from_static(&[0]));
        assert!(LowerPdu::decode_control(&pdu).is_err());

        // RFU bits in the segment-ack parameters.
        let mut raw = SegmentAck {
            obo: false,
            seq_zero: 0,
            block_ack: 1,
        }
        .encode_pdu()
        .to_vec();
        raw[2] |= 0x01;
        assert!(LowerPdu::decode_control(&Bytes::from(raw)).is_err());
    }

    #[test]
    fn test_malformed_segment_shapes() {
        // Truncated segmented header.
        let pdu = Bytes::from_static(&[0xC5, 0x00, 0x04]);
        assert!(LowerPdu::decode_access(&pdu).is_err());

        // seg_o beyond seg_n.
        let pdu = encode_segment(0xC5, 0, 1, 3, 1, &Bytes::from_static(&[0; 12]));
        assert!(LowerPdu::decode_access(&pdu).is_err());

        // Non-final segment shorter than the full segment size.
        let pdu = encode_segment(0xC5, 0, 1, 0, 1, &Bytes::from_static(&[0; 5]));
        assert!(LowerPdu::decode_access(&pdu).is_err());

        // Oversized final segment.
        let pdu = encode_segment(0xC5, 0, 1, 1, 1, &Bytes::from_static(&[0; 13]));
        assert!(LowerPdu::decode_access(&pdu).is_err());
    }

    #[test]
    fn test_invalid_outbound_opcode() {
        let payload = Bytes::new();
        assert!(matches!(
            encode_unsegmented_control(0x00, &payload),
            Err(TransportError::InvalidOpcode { opcode: 0x00 })
        ));
        assert!(encode_unsegmented_control(0x0A, &payload).is_ok());
    }

    #[test]
    fn test_first_segment_seq() {
        // Low bits already equal seq_zero.
        assert_eq!(first_segment_seq(0x000042, 0x0042), 0x000042);
        // Later segments of the same transaction resolve to the first.
        assert_eq!(first_segment_seq(0x000044, 0x0042), 0x000042);
        assert_eq!(first_segment_seq(0x002041, 0x0042), 0x000042);
        // Crossing a 13-bit boundary borrows from the high bits.
        assert_eq!(first_segment_seq(0x002001, 0x1FFF), 0x001FFF);
        // Wraps within the 24-bit space.
        assert_eq!(first_segment_seq(0x000000, 0x0001), 0xFFE001);
    }

    #[test]
    fn test_block_ack_helpers() {
        let mut ack = 0;
        for seg_o in [0u8, 2, 1] {
            ack = block_ack_mark(ack, seg_o);
        }
        assert_eq!(ack, 0b111);
        assert!(block_ack_complete(ack, 2));
        assert!(!block_ack_complete(ack, 3));
        assert_eq!(all_segments_mask(31), u32::MAX);
        assert_eq!(all_segments_mask(0), 1);
    }
}
