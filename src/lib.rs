//! # Mesh Transport — Bluetooth Mesh Lower Transport Layer
//!
//! Segmentation, reassembly, block acknowledgements, and replay protection
//! for Bluetooth Mesh, sitting between a network layer (which
//! de-obfuscates and authenticates individual PDUs) and an upper transport
//! layer (which handles end-to-end encryption of access payloads).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   Upper Transport    │  end-to-end encryption, MIC
//! ├──────────────────────┤
//! │   Async Driver       │  TransportHandle, TransportEvent stream
//! ├──────────────────────┤
//! │   Protocol Core      │  mesh-transport-core: sans-io state machine
//! ├──────────────────────┤
//! │   Network Layer      │  obfuscation, NetMIC, bearers
//! └──────────────────────┘
//! ```
//!
//! The protocol lives entirely in [`mesh_transport_core`]: a synchronous,
//! tick-driven engine with no threads and no I/O. This crate wraps it in a
//! tokio actor task so applications get an async handle and an event
//! stream instead of a callback trait.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use mesh_transport::driver::{self, DriverPorts, TransportEvent};
//! use mesh_transport::{Address, KeyId, SzMic, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TransportConfig::new(Address(0x0001));
//!     let mut seq = 0u32;
//!     let ports = DriverPorts {
//!         next_seq: Box::new(move |_src| {
//!             let s = seq;
//!             seq += 1;
//!             s
//!         }),
//!         iv_index: Box::new(|| 0),
//!     };
//!     let mut transport = driver::spawn(config, ports)?;
//!
//!     // Send an access payload; segments come back on the event stream.
//!     transport
//!         .handle
//!         .send_access(
//!             Bytes::from_static(b"hello mesh"),
//!             Address(0x0200),
//!             KeyId::Application(0x05),
//!             SzMic::Mic32,
//!         )
//!         .await?;
//!
//!     while let Some(event) = transport.events.recv().await {
//!         if let TransportEvent::Pdu(pdu) = event {
//!             // hand pdu to the network layer
//!             let _ = pdu;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod driver;
pub mod error;

pub use driver::{DriverPorts, TransportDriver, TransportEvent, TransportHandle};
pub use error::{DriverError, Result};

// Re-export the protocol core.
pub use mesh_transport_core::{
    Address, AccessMessage, ControlMessage, Host, KeyId, LowerSegment, LowerTransport, NetworkPdu,
    RxOutcome, SegmentAck, SeqAuth, SeqAuthCheck, SeqAuthStore, SequenceNumber, SzMic, TimerToken,
    TransportConfig, TransportError, TransportStats,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
