//! Actor-based engine driver — owns the [`LowerTransport`] engine in a
//! dedicated task, communicates via channels. Zero locks on the hot path.
//!
//! The engine itself is synchronous; this layer turns its deadline queue
//! into `tokio::time` sleeps and its host callbacks into a
//! [`TransportEvent`] stream. No protocol decision lives here.

use crate::error::{DriverError, Result};

use mesh_transport_core::engine::{AccessMessage, ControlMessage, Host, LowerTransport};
use mesh_transport_core::{
    Address, KeyId, LowerSegment, NetworkPdu, SeqAuth, SequenceNumber, SzMic, TransportConfig,
    TransportStats,
};

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::trace;

/// Ports the embedding application supplies: the sequence-number source it
/// persists, and the network's current IV index.
pub struct DriverPorts {
    pub next_seq: Box<dyn FnMut(Address) -> SequenceNumber + Send>,
    pub iv_index: Box<dyn Fn() -> u32 + Send>,
}

/// Commands sent to the driver task.
pub(crate) enum TransportCmd {
    SendAccess {
        payload: Bytes,
        dst: Address,
        key: KeyId,
        szmic: SzMic,
        reply: oneshot::Sender<Result<Vec<LowerSegment>>>,
    },
    SendControl {
        opcode: u8,
        payload: Bytes,
        dst: Address,
        reply: oneshot::Sender<Result<Vec<LowerSegment>>>,
    },
    CancelOutbound {
        dst: Address,
    },
    SegmentsToResend {
        dst: Address,
        reply: oneshot::Sender<Vec<u8>>,
    },
    ResendSegment {
        dst: Address,
        seg_o: u8,
        reply: oneshot::Sender<Option<LowerSegment>>,
    },
    Stats {
        reply: oneshot::Sender<TransportStats>,
    },
    Close,
}

/// Everything the engine emits, in order.
#[derive(Debug)]
pub enum TransportEvent {
    /// An outbound PDU for the network layer.
    Pdu(LowerSegment),
    /// A Segment Ack the engine constructed; transmit it.
    AckRequired(LowerSegment),
    /// A fully reassembled (or unsegmented) access message.
    Access(AccessMessage),
    /// A control message, including inbound Segment Acks (opcode `0x00`).
    Control(ControlMessage),
    /// A reassembly was discarded after its incomplete timer expired.
    IncompleteTimeout(Address),
    /// A SeqAuth commit the application should persist.
    SeqAuthCommitted(Address, SeqAuth),
}

/// Clonable, lock-free handle to the driver task.
#[derive(Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::Sender<TransportCmd>,
}

impl TransportHandle {
    pub async fn send_access(
        &self,
        payload: Bytes,
        dst: Address,
        key: KeyId,
        szmic: SzMic,
    ) -> Result<Vec<LowerSegment>> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCmd::SendAccess {
                payload,
                dst,
                key,
                szmic,
                reply,
            })
            .await
            .map_err(|_| DriverError::Closed)?;
        rx.await.map_err(|_| DriverError::Closed)?
    }

    pub async fn send_control(
        &self,
        opcode: u8,
        payload: Bytes,
        dst: Address,
    ) -> Result<Vec<LowerSegment>> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCmd::SendControl {
                opcode,
                payload,
                dst,
                reply,
            })
            .await
            .map_err(|_| DriverError::Closed)?;
        rx.await.map_err(|_| DriverError::Closed)?
    }

    /// Mark the outbound transmission to `dst` failed.
    pub async fn cancel_outbound(&self, dst: Address) -> Result<()> {
        self.cmd_tx
            .send(TransportCmd::CancelOutbound { dst })
            .await
            .map_err(|_| DriverError::Closed)
    }

    /// Offsets of segments the peer has not acknowledged yet.
    pub async fn segments_to_resend(&self, dst: Address) -> Result<Vec<u8>> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCmd::SegmentsToResend { dst, reply })
            .await
            .map_err(|_| DriverError::Closed)?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    /// The framed segment at `seg_o` of the transmission to `dst`.
    pub async fn resend_segment(&self, dst: Address, seg_o: u8) -> Result<Option<LowerSegment>> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCmd::ResendSegment { dst, seg_o, reply })
            .await
            .map_err(|_| DriverError::Closed)?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    pub async fn stats(&self) -> Result<TransportStats> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCmd::Stats { reply })
            .await
            .map_err(|_| DriverError::Closed)?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    pub fn close(&self) {
        let _ = self.cmd_tx.try_send(TransportCmd::Close);
    }
}

/// A running transport driver: the command handle plus the two data paths.
pub struct TransportDriver {
    pub handle: TransportHandle,
    /// Engine output: outbound PDUs, acks, deliveries, notifications.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Inbound path: feed PDUs from the network layer here.
    pub inbound: mpsc::Sender<NetworkPdu>,
}

/// Host implementation that forwards engine callbacks onto the event
/// channel and answers the clock/sequence/IV ports.
struct ChannelHost {
    events: mpsc::UnboundedSender<TransportEvent>,
    epoch: Instant,
    ports: DriverPorts,
}

impl Host for ChannelHost {
    fn send_pdu(&mut self, pdu: LowerSegment) {
        let _ = self.events.send(TransportEvent::Pdu(pdu));
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn next_seq(&mut self, src: Address) -> SequenceNumber {
        (self.ports.next_seq)(src)
    }

    fn iv_index(&self) -> u32 {
        (self.ports.iv_index)()
    }

    fn on_access_delivered(&mut self, msg: AccessMessage) {
        let _ = self.events.send(TransportEvent::Access(msg));
    }

    fn on_control_delivered(&mut self, msg: ControlMessage) {
        let _ = self.events.send(TransportEvent::Control(msg));
    }

    fn on_incomplete_timer_expired(&mut self, src: Address) {
        let _ = self.events.send(TransportEvent::IncompleteTimeout(src));
    }

    fn on_segment_ack_required(&mut self, ack: LowerSegment) {
        let _ = self.events.send(TransportEvent::AckRequired(ack));
    }

    fn seq_auth_committed(&mut self, src: Address, seq_auth: SeqAuth) {
        let _ = self.events.send(TransportEvent::SeqAuthCommitted(src, seq_auth));
    }
}

/// Spawn the driver task. Must run inside a tokio runtime.
pub fn spawn(config: TransportConfig, ports: DriverPorts) -> Result<TransportDriver> {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (pdu_tx, pdu_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let epoch = Instant::now();
    let host = ChannelHost {
        events: event_tx,
        epoch,
        ports,
    };
    let engine = LowerTransport::new(config, host)?;
    tokio::spawn(run_transport_actor(engine, cmd_rx, pdu_rx, epoch));

    Ok(TransportDriver {
        handle: TransportHandle { cmd_tx },
        events: event_rx,
        inbound: pdu_tx,
    })
}

/// Run the driver loop: commands, inbound PDUs, and timer deadlines.
async fn run_transport_actor(
    mut engine: LowerTransport<ChannelHost>,
    mut cmd_rx: mpsc::Receiver<TransportCmd>,
    mut pdu_rx: mpsc::Receiver<NetworkPdu>,
    epoch: Instant,
) {
    loop {
        let deadline = engine
            .next_deadline()
            .map(|ms| epoch + Duration::from_millis(ms));

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCmd::SendAccess { payload, dst, key, szmic, reply }) => {
                        let result = engine
                            .send_access(payload, dst, key, szmic)
                            .map_err(DriverError::from);
                        let _ = reply.send(result);
                    }
                    Some(TransportCmd::SendControl { opcode, payload, dst, reply }) => {
                        let result = engine
                            .send_control(opcode, payload, dst)
                            .map_err(DriverError::from);
                        let _ = reply.send(result);
                    }
                    Some(TransportCmd::CancelOutbound { dst }) => {
                        engine.cancel_outbound(dst);
                    }
                    Some(TransportCmd::SegmentsToResend { dst, reply }) => {
                        let _ = reply.send(engine.segments_to_resend(dst));
                    }
                    Some(TransportCmd::ResendSegment { dst, seg_o, reply }) => {
                        let _ = reply.send(engine.resend_segment(dst, seg_o));
                    }
                    Some(TransportCmd::Stats { reply }) => {
                        let _ = reply.send(*engine.stats());
                    }
                    Some(TransportCmd::Close) | None => {
                        trace!("Command channel closed, stopping driver");
                        break;
                    }
                }
            }

            pdu = pdu_rx.recv() => {
                match pdu {
                    Some(pdu) => {
                        engine.on_receive(pdu);
                    }
                    None => {
                        trace!("Inbound channel closed, stopping driver");
                        break;
                    }
                }
            }

            _ = sleep_until(deadline) => {
                let now = epoch.elapsed().as_millis() as u64;
                engine.tick(now);
            }
        }
    }
}

/// Sleep until the deadline, or forever when no timer is pending.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
