//! Error types for the async transport driver.

use mesh_transport_core::TransportError;
use thiserror::Error;

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by the async driver layer.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The engine rejected the operation.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The driver task has shut down.
    #[error("transport driver closed")]
    Closed,
}
