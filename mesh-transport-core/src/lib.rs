//! Pure synchronous Bluetooth Mesh lower transport engine.
//!
//! This crate implements segmentation, reassembly, block acknowledgements,
//! and replay protection with zero runtime dependencies — no tokio, no
//! async, no I/O. It only depends on `bytes` and `tracing`.
//!
//! ```text
//! ┌────────────────────────────────┐
//! │  mesh-transport-core           │
//! │                                │
//! │  protocol     ← wire framing   │
//! │  address      ← address kinds  │
//! │  seq_auth     ← replay guard   │
//! │  reassembly   ← inbound slots  │
//! │  segmentation ← outbound state │
//! │  engine       ← state machine  │
//! └────────────────────────────────┘
//! ```
//!
//! The engine sits between a network layer (which de-obfuscates and
//! authenticates individual PDUs) and an upper transport layer (which
//! handles end-to-end encryption). The host owns the event loop: it feeds
//! inbound PDUs to [`LowerTransport::on_receive`] and calls
//! [`LowerTransport::tick`] when a scheduled deadline passes. The engine
//! never blocks and owns no threads.

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
mod reassembly;
mod segmentation;
pub mod seq_auth;

pub use address::Address;
pub use config::TransportConfig;
pub use engine::{
    AccessMessage, ControlMessage, Host, LowerTransport, RxOutcome, TimerToken, TransportStats,
};
pub use error::{TransportError, TransportResult};
pub use protocol::{
    first_segment_seq, seq_auth, KeyId, LowerSegment, NetworkPdu, SegmentAck, SeqAuth,
    SequenceNumber, SzMic,
};
pub use seq_auth::{SeqAuthCheck, SeqAuthStore};
