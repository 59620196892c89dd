//! The lower transport engine: single entry point for inbound PDUs,
//! outbound segmentation, and timer-driven acknowledgements.
//!
//! The engine is synchronous and owns no threads. Timers are absolute
//! deadlines on a min-heap; the host calls [`LowerTransport::tick`] when its
//! event loop wakes, either from a scheduled deadline or an inbound PDU.

use crate::address::Address;
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::protocol::constants::*;
use crate::protocol::{
    self, encode_access_segment, encode_control_segment, encode_unsegmented_access,
    encode_unsegmented_control, first_segment_seq, KeyId, LowerPdu, LowerSegment, NetworkPdu,
    SegmentAck, SeqAuth, SequenceNumber, SzMic,
};
use crate::reassembly::{InFlightRx, SegmentInsert, SlotKind};
use crate::segmentation::{AckDisposition, OutboundTx};
use crate::seq_auth::{SeqAuthCheck, SeqAuthStore};

use bytes::Bytes;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, trace, warn};

/// Identity of a pending timer. One timer of each kind per source address;
/// re-arming a token overwrites the previous deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerToken {
    /// Incomplete timer of the reassembly from this source.
    Incomplete(Address),
    /// Block-Ack timer of the reassembly from this source.
    BlockAck(Address),
}

/// Capability surface the host provides at construction: the network port,
/// clock, sequence-number source, IV index, and delivery callbacks.
pub trait Host {
    /// Hand a framed lower transport PDU to the network layer.
    fn send_pdu(&mut self, pdu: LowerSegment);

    /// Current time in milliseconds, monotonic.
    fn now(&self) -> u64;

    /// A timer was (re)armed; wake the event loop no later than `deadline`
    /// and call [`LowerTransport::tick`]. Overwrite semantics per token.
    fn schedule(&mut self, deadline: u64, token: TimerToken) {
        let _ = (deadline, token);
    }

    /// Next sequence number for the element `src`, monotonic per source.
    fn next_seq(&mut self, src: Address) -> SequenceNumber;

    /// Current IV index of the network.
    fn iv_index(&self) -> u32;

    /// A fully reassembled (or unsegmented) access message arrived.
    fn on_access_delivered(&mut self, msg: AccessMessage);

    /// A control message arrived, including Segment Acks (opcode `0x00`)
    /// for an external retransmission manager.
    fn on_control_delivered(&mut self, msg: ControlMessage);

    /// A reassembly was discarded because its incomplete timer expired.
    fn on_incomplete_timer_expired(&mut self, src: Address);

    /// The engine constructed a Segment Ack that must be transmitted.
    fn on_segment_ack_required(&mut self, ack: LowerSegment);

    /// A SeqAuth commit to persist; replayed into
    /// [`LowerTransport::restore_seq_auth`] after a reboot.
    fn seq_auth_committed(&mut self, src: Address, seq_auth: SeqAuth) {
        let _ = (src, seq_auth);
    }
}

/// An access message handed up to the upper transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessMessage {
    pub src: Address,
    pub dst: Address,
    pub key: KeyId,
    pub szmic: SzMic,
    /// Sequence number of the first (or only) PDU; input to the nonce.
    pub seq: SequenceNumber,
    pub payload: Bytes,
}

/// A control message handed up to the upper transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    pub src: Address,
    pub dst: Address,
    pub opcode: u8,
    pub payload: Bytes,
}

/// What [`LowerTransport::on_receive`] did with an inbound PDU.
///
/// Segment Ack emission is not a separate outcome: an immediate ack always
/// accompanies a delivery and is observable through
/// [`Host::on_segment_ack_required`] before the delivery callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    /// Dropped, or a segment was buffered; nothing delivered yet.
    Nothing,
    DeliveredAccess,
    DeliveredControl,
}

/// Counters for traffic and the silently-dropped error classes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportStats {
    pub segments_sent: u64,
    pub pdus_received: u64,
    pub access_delivered: u64,
    pub control_delivered: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    pub malformed_drops: u64,
    pub replay_drops: u64,
    pub duplicate_drops: u64,
    pub incomplete_timeouts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    deadline: u64,
    order: u64,
    token: TimerToken,
}

/// The lower transport engine.
pub struct LowerTransport<H: Host> {
    config: TransportConfig,
    host: H,
    seq_auth: SeqAuthStore,
    rx_slots: HashMap<Address, InFlightRx>,
    tx_attempts: HashMap<Address, OutboundTx>,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    timer_order: u64,
    stats: TransportStats,
}

impl<H: Host> LowerTransport<H> {
    /// Create an engine over the given host capabilities.
    pub fn new(config: TransportConfig, host: H) -> TransportResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            host,
            seq_auth: SeqAuthStore::new(),
            rx_slots: HashMap::new(),
            tx_attempts: HashMap::new(),
            timers: BinaryHeap::new(),
            timer_order: 0,
            stats: TransportStats::default(),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Current traffic and drop counters.
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Seed the replay tracker from persisted state.
    pub fn restore_seq_auth(&mut self, src: Address, value: SeqAuth) {
        self.seq_auth.restore(src, value);
    }

    /// Highest SeqAuth accepted from `src`, if any.
    pub fn last_seq_auth(&self, src: Address) -> Option<SeqAuth> {
        self.seq_auth.last(src)
    }

    /// Earliest pending timer deadline.
    ///
    /// May be conservative: a deadline superseded by a restart is still
    /// reported until `tick` drains it, causing at worst a spurious wakeup.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.peek().map(|Reverse(entry)| entry.deadline)
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Frame an access payload into one unsegmented PDU or a segmented
    /// transaction, emit every PDU through the network port in order, and
    /// return the framed segments.
    pub fn send_access(
        &mut self,
        payload: Bytes,
        dst: Address,
        key: KeyId,
        szmic: SzMic,
    ) -> TransportResult<Vec<LowerSegment>> {
        if payload.len() > MAX_ACCESS_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_ACCESS_PAYLOAD,
            });
        }
        let src = self.config.element_addr;
        if payload.len() <= MAX_UNSEGMENTED_ACCESS_PAYLOAD {
            let seq = self.host.next_seq(src);
            let pdu = LowerSegment {
                src,
                dst,
                seq,
                ttl: None,
                ctl: false,
                transport_pdu: encode_unsegmented_access(key, &payload),
            };
            self.emit(&pdu);
            return Ok(vec![pdu]);
        }

        let count = payload.len().div_ceil(MAX_SEGMENT_ACCESS_PAYLOAD);
        let seg_n = (count - 1) as u8;
        let mut seq_zero = 0u16;
        let mut segments = Vec::with_capacity(count);
        let mut offset = 0;
        for seg_o in 0..count as u8 {
            let seq = self.host.next_seq(src);
            if seg_o == 0 {
                seq_zero = (seq & SEQ_ZERO_MASK) as u16;
            }
            let len = MAX_SEGMENT_ACCESS_PAYLOAD.min(payload.len() - offset);
            let segment = payload.slice(offset..offset + len);
            offset += len;
            segments.push(LowerSegment {
                src,
                dst,
                seq,
                ttl: None,
                ctl: false,
                transport_pdu: encode_access_segment(key, szmic, seq_zero, seg_o, seg_n, &segment),
            });
        }
        trace!(dst = %dst, seq_zero, segments = count, "segmented access transmission");
        self.start_outbound(dst, seq_zero, seg_n, segments)
    }

    /// Frame a control payload. Opcode `0x00` is reserved for Segment Acks
    /// the engine itself constructs.
    pub fn send_control(
        &mut self,
        opcode: u8,
        payload: Bytes,
        dst: Address,
    ) -> TransportResult<Vec<LowerSegment>> {
        if opcode == OPCODE_SEGMENT_ACK || opcode > 0x7F {
            return Err(TransportError::InvalidOpcode { opcode });
        }
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_CONTROL_PAYLOAD,
            });
        }
        let src = self.config.element_addr;
        if payload.len() <= MAX_UNSEGMENTED_CONTROL_PAYLOAD {
            let seq = self.host.next_seq(src);
            let pdu = LowerSegment {
                src,
                dst,
                seq,
                ttl: None,
                ctl: true,
                transport_pdu: encode_unsegmented_control(opcode, &payload)?,
            };
            self.emit(&pdu);
            return Ok(vec![pdu]);
        }

        let count = payload.len().div_ceil(MAX_SEGMENT_CONTROL_PAYLOAD);
        let seg_n = (count - 1) as u8;
        let mut seq_zero = 0u16;
        let mut segments = Vec::with_capacity(count);
        let mut offset = 0;
        for seg_o in 0..count as u8 {
            let seq = self.host.next_seq(src);
            if seg_o == 0 {
                seq_zero = (seq & SEQ_ZERO_MASK) as u16;
            }
            let len = MAX_SEGMENT_CONTROL_PAYLOAD.min(payload.len() - offset);
            let segment = payload.slice(offset..offset + len);
            offset += len;
            segments.push(LowerSegment {
                src,
                dst,
                seq,
                ttl: None,
                ctl: true,
                transport_pdu: encode_control_segment(opcode, seq_zero, seg_o, seg_n, &segment),
            });
        }
        trace!(dst = %dst, seq_zero, segments = count, "segmented control transmission");
        self.start_outbound(dst, seq_zero, seg_n, segments)
    }

    /// Mark the outbound transmission to `dst` failed; no further segments
    /// will be handed out for it.
    pub fn cancel_outbound(&mut self, dst: Address) {
        if let Some(tx) = self.tx_attempts.get_mut(&dst) {
            tx.failed = true;
            debug!(dst = %dst, "outbound transmission cancelled");
        }
    }

    /// Offsets of segments the peer has not acknowledged yet. Empty when
    /// there is no live transmission to `dst`.
    pub fn segments_to_resend(&self, dst: Address) -> Vec<u8> {
        self.tx_attempts
            .get(&dst)
            .map(|tx| tx.unacked())
            .unwrap_or_default()
    }

    /// The framed segment at `seg_o` of the transmission to `dst`, for the
    /// retransmission manager to hand back to the network layer.
    pub fn resend_segment(&self, dst: Address, seg_o: u8) -> Option<LowerSegment> {
        self.tx_attempts
            .get(&dst)
            .and_then(|tx| tx.segment(seg_o))
            .cloned()
    }

    fn start_outbound(
        &mut self,
        dst: Address,
        seq_zero: u16,
        seg_n: u8,
        segments: Vec<LowerSegment>,
    ) -> TransportResult<Vec<LowerSegment>> {
        let tx = OutboundTx::new(seq_zero, seg_n, segments.clone());
        if self.tx_attempts.insert(dst, tx).is_some() {
            warn!(dst = %dst, "replacing in-flight segmented transmission");
        }
        for segment in &segments {
            self.emit(segment);
        }
        Ok(segments)
    }

    fn emit(&mut self, pdu: &LowerSegment) {
        self.stats.segments_sent += 1;
        self.host.send_pdu(pdu.clone());
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Process one PDU from the network layer. The single entry point for
    /// all inbound traffic; never fails — wire garbage is dropped, counted,
    /// and traced.
    pub fn on_receive(&mut self, pdu: NetworkPdu) -> RxOutcome {
        self.stats.pdus_received += 1;
        let decoded = if pdu.ctl {
            LowerPdu::decode_control(&pdu.transport_pdu)
        } else {
            LowerPdu::decode_access(&pdu.transport_pdu)
        };
        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(error) => {
                self.stats.malformed_drops += 1;
                debug!(src = %pdu.src, %error, "malformed pdu dropped");
                return RxOutcome::Nothing;
            }
        };
        match decoded {
            LowerPdu::UnsegmentedAccess { key, payload } => {
                self.receive_unsegmented_access(&pdu, key, payload)
            }
            LowerPdu::AccessSegment {
                key,
                szmic,
                seq_zero,
                seg_o,
                seg_n,
                segment,
            } => self.receive_segment(
                &pdu,
                SlotKind::Access { key, szmic },
                seq_zero,
                seg_o,
                seg_n,
                segment,
            ),
            LowerPdu::UnsegmentedControl { opcode, payload } => {
                self.receive_unsegmented_control(&pdu, opcode, payload)
            }
            LowerPdu::ControlSegment {
                opcode,
                seq_zero,
                seg_o,
                seg_n,
                segment,
            } => self.receive_segment(
                &pdu,
                SlotKind::Control { opcode },
                seq_zero,
                seg_o,
                seg_n,
                segment,
            ),
            LowerPdu::SegmentAck(ack) => self.receive_segment_ack(&pdu, ack),
        }
    }

    fn receive_unsegmented_access(
        &mut self,
        pdu: &NetworkPdu,
        key: KeyId,
        payload: Bytes,
    ) -> RxOutcome {
        let seq_auth = protocol::seq_auth(self.host.iv_index(), pdu.seq);
        match self.seq_auth.check(pdu.src, seq_auth) {
            SeqAuthCheck::Accept => {
                if self.seq_auth.commit(pdu.src, seq_auth) {
                    self.host.seq_auth_committed(pdu.src, seq_auth);
                }
                self.stats.access_delivered += 1;
                self.host.on_access_delivered(AccessMessage {
                    src: pdu.src,
                    dst: pdu.dst,
                    key,
                    // Unsegmented access messages always carry a 32-bit MIC.
                    szmic: SzMic::Mic32,
                    seq: pdu.seq,
                    payload,
                });
                RxOutcome::DeliveredAccess
            }
            SeqAuthCheck::DuplicateSameSeqAuth => {
                self.stats.duplicate_drops += 1;
                trace!(src = %pdu.src, seq_auth, "duplicate unsegmented access dropped");
                RxOutcome::Nothing
            }
            SeqAuthCheck::Replay => {
                self.stats.replay_drops += 1;
                trace!(src = %pdu.src, seq_auth, "replayed unsegmented access dropped");
                RxOutcome::Nothing
            }
        }
    }

    fn receive_unsegmented_control(
        &mut self,
        pdu: &NetworkPdu,
        opcode: u8,
        payload: Bytes,
    ) -> RxOutcome {
        if opcode == OPCODE_HEARTBEAT {
            trace!(src = %pdu.src, "heartbeat received");
        }
        self.stats.control_delivered += 1;
        self.host.on_control_delivered(ControlMessage {
            src: pdu.src,
            dst: pdu.dst,
            opcode,
            payload,
        });
        RxOutcome::DeliveredControl
    }

    fn receive_segment(
        &mut self,
        pdu: &NetworkPdu,
        kind: SlotKind,
        seq_zero: u16,
        seg_o: u8,
        seg_n: u8,
        segment: Bytes,
    ) -> RxOutcome {
        let first_seq = first_segment_seq(pdu.seq, seq_zero);
        let seq_auth = protocol::seq_auth(self.host.iv_index(), first_seq);
        let now = self.host.now();

        match self.seq_auth.check(pdu.src, seq_auth) {
            SeqAuthCheck::Replay => {
                self.stats.replay_drops += 1;
                trace!(src = %pdu.src, seq_auth, "replayed segment dropped");
                RxOutcome::Nothing
            }
            SeqAuthCheck::Accept => {
                if let Some(old) = self.rx_slots.remove(&pdu.src) {
                    trace!(
                        src = %pdu.src,
                        evicted_seq_auth = old.seq_auth,
                        "newer transaction evicts in-flight reassembly"
                    );
                }
                if self.seq_auth.commit(pdu.src, seq_auth) {
                    self.host.seq_auth_committed(pdu.src, seq_auth);
                }
                let mut slot = InFlightRx::new(
                    pdu.src,
                    pdu.dst,
                    pdu.ttl,
                    seq_auth,
                    seq_zero,
                    first_seq,
                    kind,
                    seg_n,
                    now + self.config.incomplete_timer_ms,
                );
                slot.insert(seg_o, segment);
                // The Block-Ack timer is armed on the first segment of a new
                // transaction, whichever segment that is, and only for
                // unicast destinations.
                if slot.expects_ack() {
                    let deadline = now + self.config.ack_timeout(pdu.ttl);
                    slot.ack_deadline = Some(deadline);
                    self.push_timer(deadline, TimerToken::BlockAck(pdu.src));
                }
                trace!(src = %pdu.src, seq_auth, seg_o, seg_n, "reassembly started");
                self.rx_slots.insert(pdu.src, slot);
                self.finish_insert(pdu.src, now)
            }
            SeqAuthCheck::DuplicateSameSeqAuth => {
                let Some(slot) = self.rx_slots.get_mut(&pdu.src) else {
                    // Transaction already completed or timed out.
                    self.stats.duplicate_drops += 1;
                    trace!(src = %pdu.src, seq_auth, "segment for finished transaction dropped");
                    return RxOutcome::Nothing;
                };
                if slot.seq_zero != seq_zero || slot.kind != kind || slot.seg_n != seg_n {
                    self.stats.malformed_drops += 1;
                    debug!(src = %pdu.src, "segment disagrees with in-flight transaction");
                    return RxOutcome::Nothing;
                }
                match slot.insert(seg_o, segment) {
                    SegmentInsert::Duplicate => {
                        self.stats.duplicate_drops += 1;
                        trace!(src = %pdu.src, seg_o, "duplicate segment dropped");
                        RxOutcome::Nothing
                    }
                    SegmentInsert::Inserted => self.finish_insert(pdu.src, now),
                }
            }
        }
    }

    /// After a segment landed in its slot: deliver on completion, otherwise
    /// restart the incomplete timer and re-arm the Block-Ack timer if it is
    /// not currently scheduled.
    fn finish_insert(&mut self, src: Address, now: u64) -> RxOutcome {
        let complete = self
            .rx_slots
            .get(&src)
            .map(|slot| slot.is_complete())
            .unwrap_or(false);
        if complete {
            return match self.rx_slots.remove(&src) {
                Some(slot) => self.deliver(slot),
                None => RxOutcome::Nothing,
            };
        }

        let mut to_arm: [Option<(u64, TimerToken)>; 2] = [None, None];
        if let Some(slot) = self.rx_slots.get_mut(&src) {
            let deadline = now + self.config.incomplete_timer_ms;
            slot.incomplete_deadline = deadline;
            to_arm[0] = Some((deadline, TimerToken::Incomplete(src)));
            if slot.expects_ack() && slot.ack_deadline.is_none() {
                let deadline = now + self.config.ack_timeout(slot.ttl);
                slot.ack_deadline = Some(deadline);
                to_arm[1] = Some((deadline, TimerToken::BlockAck(src)));
            }
        }
        for (deadline, token) in to_arm.into_iter().flatten() {
            self.push_timer(deadline, token);
        }
        RxOutcome::Nothing
    }

    /// Complete a reassembly: immediate ack first (unicast only), then the
    /// delivery callback. The slot is gone, which also cancels both of its
    /// timers.
    fn deliver(&mut self, slot: InFlightRx) -> RxOutcome {
        if slot.expects_ack() {
            trace!(
                src = %slot.src,
                block_ack = slot.block_ack,
                ack_sent = slot.ack_sent,
                "reassembly complete, sending immediate ack"
            );
            let ack = self.ack_pdu(slot.dst, slot.src, slot.ttl, slot.seq_zero, slot.block_ack);
            self.stats.acks_sent += 1;
            self.host.on_segment_ack_required(ack);
        }
        let payload = slot.assemble();
        match slot.kind {
            SlotKind::Access { key, szmic } => {
                self.stats.access_delivered += 1;
                self.host.on_access_delivered(AccessMessage {
                    src: slot.src,
                    dst: slot.dst,
                    key,
                    szmic,
                    seq: slot.first_seq,
                    payload,
                });
                RxOutcome::DeliveredAccess
            }
            SlotKind::Control { opcode } => {
                self.stats.control_delivered += 1;
                self.host.on_control_delivered(ControlMessage {
                    src: slot.src,
                    dst: slot.dst,
                    opcode,
                    payload,
                });
                RxOutcome::DeliveredControl
            }
        }
    }

    fn receive_segment_ack(&mut self, pdu: &NetworkPdu, ack: SegmentAck) -> RxOutcome {
        self.stats.acks_received += 1;
        let mut completed = false;
        if let Some(tx) = self.tx_attempts.get_mut(&pdu.src) {
            match tx.apply_ack(&ack) {
                AckDisposition::Completed => {
                    trace!(dst = %pdu.src, "all segments acknowledged");
                    completed = true;
                }
                AckDisposition::Cancelled => {
                    debug!(dst = %pdu.src, "peer cancelled segmented transmission");
                }
                AckDisposition::Partial => {}
                AckDisposition::Stale => {
                    trace!(dst = %pdu.src, seq_zero = ack.seq_zero, "ack for unknown transaction");
                }
            }
        }
        if completed {
            self.tx_attempts.remove(&pdu.src);
        }
        // Surface the ack so a retransmission manager can react to it.
        self.stats.control_delivered += 1;
        self.host.on_control_delivered(ControlMessage {
            src: pdu.src,
            dst: pdu.dst,
            opcode: OPCODE_SEGMENT_ACK,
            payload: pdu.transport_pdu.slice(UNSEGMENTED_HEADER_LEN..),
        });
        RxOutcome::DeliveredControl
    }

    fn ack_pdu(
        &mut self,
        src: Address,
        dst: Address,
        ttl: u8,
        seq_zero: u16,
        block_ack: u32,
    ) -> LowerSegment {
        let ack = SegmentAck {
            obo: false,
            seq_zero,
            block_ack,
        };
        let seq = self.host.next_seq(src);
        LowerSegment {
            src,
            dst,
            seq,
            ttl: Some(ttl),
            ctl: true,
            transport_pdu: ack.encode_pdu(),
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Fire every timer due at `now`, emitting at most one ack and at most
    /// one incomplete-timer notification per invocation; anything beyond
    /// that budget stays queued for the next call.
    pub fn tick(&mut self, now: u64) {
        let mut ack_emitted = false;
        let mut expiry_notified = false;
        while let Some(&Reverse(entry)) = self.timers.peek() {
            if entry.deadline > now {
                break;
            }
            let live = match entry.token {
                // A slot whose incomplete deadline has also passed is
                // already dead at `now`; never ack it.
                TimerToken::BlockAck(src) => self.rx_slots.get(&src).is_some_and(|slot| {
                    slot.ack_deadline == Some(entry.deadline) && slot.incomplete_deadline > now
                }),
                TimerToken::Incomplete(src) => self
                    .rx_slots
                    .get(&src)
                    .is_some_and(|slot| slot.incomplete_deadline == entry.deadline),
            };
            if live {
                match entry.token {
                    TimerToken::BlockAck(_) if ack_emitted => break,
                    TimerToken::Incomplete(_) if expiry_notified => break,
                    _ => {}
                }
            }
            self.timers.pop();
            if !live {
                continue;
            }
            match entry.token {
                TimerToken::BlockAck(src) => {
                    self.fire_block_ack(src);
                    ack_emitted = true;
                }
                TimerToken::Incomplete(src) => {
                    self.expire_incomplete(src);
                    expiry_notified = true;
                }
            }
        }
    }

    fn fire_block_ack(&mut self, src: Address) {
        let Some(slot) = self.rx_slots.get_mut(&src) else {
            return;
        };
        slot.ack_sent = true;
        slot.ack_deadline = None;
        let (ack_src, ack_dst, ttl, seq_zero, block_ack) =
            (slot.dst, slot.src, slot.ttl, slot.seq_zero, slot.block_ack);
        trace!(dst = %ack_dst, block_ack, "block-ack timer fired");
        let pdu = self.ack_pdu(ack_src, ack_dst, ttl, seq_zero, block_ack);
        self.stats.acks_sent += 1;
        self.host.on_segment_ack_required(pdu);
    }

    fn expire_incomplete(&mut self, src: Address) {
        if self.rx_slots.remove(&src).is_some() {
            self.stats.incomplete_timeouts += 1;
            debug!(src = %src, "incomplete timer expired, reassembly discarded");
            self.host.on_incomplete_timer_expired(src);
        }
    }

    fn push_timer(&mut self, deadline: u64, token: TimerToken) {
        self.timer_order += 1;
        self.timers.push(Reverse(TimerEntry {
            deadline,
            order: self.timer_order,
            token,
        }));
        self.host.schedule(deadline, token);
    }
}
