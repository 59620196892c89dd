//! Inbound reassembly slots for segmented messages.

use crate::address::Address;
use crate::protocol::{block_ack_mark, KeyId, SeqAuth, SequenceNumber, SzMic};
use bytes::{Bytes, BytesMut};

/// Message class of a reassembly slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Access { key: KeyId, szmic: SzMic },
    Control { opcode: u8 },
}

/// Result of offering a segment to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentInsert {
    Inserted,
    /// This offset was already present; timers must not be touched.
    Duplicate,
}

/// One in-flight inbound segmented message.
///
/// Created on the first segment of a new SeqAuth, destroyed on completion,
/// incomplete-timer expiry, or eviction by a newer SeqAuth from the same
/// source. Segments land in a dense vector indexed by SegO; SegN is at
/// most 31.
#[derive(Debug)]
pub(crate) struct InFlightRx {
    pub src: Address,
    pub dst: Address,
    /// TTL of the received segments; scales the Block-Ack timer.
    pub ttl: u8,
    pub seq_auth: SeqAuth,
    pub seq_zero: u16,
    /// Sequence number of the transaction's first segment.
    pub first_seq: SequenceNumber,
    pub kind: SlotKind,
    pub seg_n: u8,
    segments: Vec<Option<Bytes>>,
    pub block_ack: u32,
    received: u8,
    /// Absolute deadline of the incomplete timer.
    pub incomplete_deadline: u64,
    /// Absolute deadline of the Block-Ack timer, if one is scheduled.
    pub ack_deadline: Option<u64>,
    pub ack_sent: bool,
}

impl InFlightRx {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        src: Address,
        dst: Address,
        ttl: u8,
        seq_auth: SeqAuth,
        seq_zero: u16,
        first_seq: SequenceNumber,
        kind: SlotKind,
        seg_n: u8,
        incomplete_deadline: u64,
    ) -> Self {
        Self {
            src,
            dst,
            ttl,
            seq_auth,
            seq_zero,
            first_seq,
            kind,
            seg_n,
            segments: vec![None; seg_n as usize + 1],
            block_ack: 0,
            received: 0,
            incomplete_deadline,
            ack_deadline: None,
            ack_sent: false,
        }
    }

    /// Store a segment at its offset. The codec guarantees `seg_o <= seg_n`.
    pub fn insert(&mut self, seg_o: u8, segment: Bytes) -> SegmentInsert {
        let slot = &mut self.segments[seg_o as usize];
        if slot.is_some() {
            return SegmentInsert::Duplicate;
        }
        *slot = Some(segment);
        self.block_ack = block_ack_mark(self.block_ack, seg_o);
        self.received += 1;
        SegmentInsert::Inserted
    }

    pub fn is_complete(&self) -> bool {
        self.received as usize == self.seg_n as usize + 1
    }

    /// Only unicast destinations are acknowledged.
    pub fn expects_ack(&self) -> bool {
        self.dst.is_unicast()
    }

    /// Concatenate all segments in offset order. Call only when complete.
    pub fn assemble(&self) -> Bytes {
        let total = self
            .segments
            .iter()
            .flatten()
            .map(|segment| segment.len())
            .sum();
        let mut payload = BytesMut::with_capacity(total);
        for segment in self.segments.iter().flatten() {
            payload.extend_from_slice(segment);
        }
        payload.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(seg_n: u8) -> InFlightRx {
        InFlightRx::new(
            Address(0x0100),
            Address(0x0200),
            5,
            0x1_000042,
            0x0042,
            0x000042,
            SlotKind::Access {
                key: KeyId::Device,
                szmic: SzMic::Mic32,
            },
            seg_n,
            10_000,
        )
    }

    #[test]
    fn test_out_of_order_assembly() {
        let mut rx = slot(2);
        assert_eq!(rx.insert(0, Bytes::from_static(b"aaa")), SegmentInsert::Inserted);
        assert_eq!(rx.insert(2, Bytes::from_static(b"ccc")), SegmentInsert::Inserted);
        assert_eq!(rx.block_ack, 0b101);
        assert!(!rx.is_complete());

        assert_eq!(rx.insert(1, Bytes::from_static(b"bbb")), SegmentInsert::Inserted);
        assert!(rx.is_complete());
        assert_eq!(rx.block_ack, 0b111);
        assert_eq!(rx.assemble(), Bytes::from_static(b"aaabbbccc"));
    }

    #[test]
    fn test_duplicate_segment_ignored() {
        let mut rx = slot(1);
        assert_eq!(rx.insert(0, Bytes::from_static(b"xx")), SegmentInsert::Inserted);
        assert_eq!(rx.insert(0, Bytes::from_static(b"yy")), SegmentInsert::Duplicate);
        assert_eq!(rx.block_ack, 0b01);
        assert!(!rx.is_complete());
    }

    #[test]
    fn test_single_segment_transaction() {
        let mut rx = slot(0);
        assert_eq!(rx.insert(0, Bytes::from_static(b"only")), SegmentInsert::Inserted);
        assert!(rx.is_complete());
        assert_eq!(rx.assemble(), Bytes::from_static(b"only"));
    }
}
