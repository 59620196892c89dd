//! Outbound segmentation bookkeeping.
//!
//! The engine frames and emits segments; this module tracks one in-flight
//! segmented transmission per peer so an external retransmission manager
//! can ask which segments a Segment Ack left unacknowledged.

use crate::protocol::{block_ack_complete, LowerSegment, SegmentAck};

/// How an inbound Segment Ack affected an outbound transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckDisposition {
    /// All segments acknowledged; the transmission is done.
    Completed,
    /// Some segments still outstanding.
    Partial,
    /// BlockAck was all-zero: the peer cancelled the transaction.
    Cancelled,
    /// SeqZero did not match this transmission; ack ignored.
    Stale,
}

/// One in-flight outbound segmented transmission to a single peer. The
/// engine keys these by destination address.
#[derive(Debug)]
pub(crate) struct OutboundTx {
    pub seq_zero: u16,
    pub seg_n: u8,
    /// Bit `i` set iff the peer has acknowledged segment `i`.
    pub acked: u32,
    /// Set on peer cancel or host cancel; no further segments go out.
    pub failed: bool,
    segments: Vec<LowerSegment>,
}

impl OutboundTx {
    pub fn new(seq_zero: u16, seg_n: u8, segments: Vec<LowerSegment>) -> Self {
        Self {
            seq_zero,
            seg_n,
            acked: 0,
            failed: false,
            segments,
        }
    }

    /// Merge an inbound Segment Ack into the acknowledged bitmap.
    pub fn apply_ack(&mut self, ack: &SegmentAck) -> AckDisposition {
        if ack.seq_zero != self.seq_zero {
            return AckDisposition::Stale;
        }
        if ack.block_ack == 0 {
            self.failed = true;
            return AckDisposition::Cancelled;
        }
        self.acked |= ack.block_ack;
        if block_ack_complete(self.acked, self.seg_n) {
            AckDisposition::Completed
        } else {
            AckDisposition::Partial
        }
    }

    /// Offsets of segments not yet acknowledged. Empty once failed.
    pub fn unacked(&self) -> Vec<u8> {
        if self.failed {
            return Vec::new();
        }
        (0..=self.seg_n)
            .filter(|seg_o| self.acked & (1 << seg_o) == 0)
            .collect()
    }

    /// The framed segment at `seg_o`, for handing back to the network layer.
    pub fn segment(&self, seg_o: u8) -> Option<&LowerSegment> {
        if self.failed {
            return None;
        }
        self.segments.get(seg_o as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::protocol::{encode_control_segment, SequenceNumber};
    use bytes::Bytes;

    fn tx(seg_n: u8) -> OutboundTx {
        let segments = (0..=seg_n)
            .map(|seg_o| LowerSegment {
                src: Address(0x0001),
                dst: Address(0x0200),
                seq: seg_o as SequenceNumber,
                ttl: None,
                ctl: true,
                transport_pdu: encode_control_segment(
                    0x0A,
                    0x0042,
                    seg_o,
                    seg_n,
                    &Bytes::from_static(&[0; 8]),
                ),
            })
            .collect();
        OutboundTx::new(0x0042, seg_n, segments)
    }

    fn ack(block_ack: u32) -> SegmentAck {
        SegmentAck {
            obo: false,
            seq_zero: 0x0042,
            block_ack,
        }
    }

    #[test]
    fn test_partial_ack_leaves_gaps() {
        let mut tx = tx(3);
        assert_eq!(tx.apply_ack(&ack(0b0101)), AckDisposition::Partial);
        assert_eq!(tx.unacked(), vec![1, 3]);
        assert!(tx.segment(1).is_some());
    }

    #[test]
    fn test_acks_accumulate_to_completion() {
        let mut tx = tx(3);
        assert_eq!(tx.apply_ack(&ack(0b0101)), AckDisposition::Partial);
        assert_eq!(tx.apply_ack(&ack(0b1010)), AckDisposition::Completed);
        assert!(tx.unacked().is_empty());
    }

    #[test]
    fn test_zero_block_ack_cancels() {
        let mut tx = tx(2);
        assert_eq!(tx.apply_ack(&ack(0)), AckDisposition::Cancelled);
        assert!(tx.failed);
        assert!(tx.unacked().is_empty());
        assert!(tx.segment(0).is_none());
    }

    #[test]
    fn test_mismatched_seq_zero_ignored() {
        let mut tx = tx(1);
        let stale = SegmentAck {
            obo: false,
            seq_zero: 0x0001,
            block_ack: 0b11,
        };
        assert_eq!(tx.apply_ack(&stale), AckDisposition::Stale);
        assert_eq!(tx.unacked(), vec![0, 1]);
    }
}
