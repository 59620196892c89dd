//! Configuration for the lower transport engine.

use crate::address::Address;
use crate::error::{TransportError, TransportResult};

/// Timer tuning and local identity for the engine.
///
/// The defaults are the Mesh Profile minimums; `validate()` refuses values
/// below them.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Unicast address of the local element. Source of outbound messages.
    pub element_addr: Address,
    /// Base duration of the Block-Ack timer in milliseconds.
    pub ack_timer_base_ms: u64,
    /// Added to the Block-Ack timer per hop of TTL, in milliseconds.
    pub ack_timer_per_ttl_ms: u64,
    /// Incomplete timer duration in milliseconds.
    pub incomplete_timer_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            element_addr: Address(0x0001),
            ack_timer_base_ms: 150,
            ack_timer_per_ttl_ms: 50,
            incomplete_timer_ms: 10_000,
        }
    }
}

impl TransportConfig {
    /// Create a configuration for the given local element address.
    pub fn new(element_addr: Address) -> Self {
        Self {
            element_addr,
            ..Self::default()
        }
    }

    /// Set the Block-Ack timer base duration.
    pub fn ack_timer_base(mut self, ms: u64) -> Self {
        self.ack_timer_base_ms = ms;
        self
    }

    /// Set the per-TTL Block-Ack timer increment.
    pub fn ack_timer_per_ttl(mut self, ms: u64) -> Self {
        self.ack_timer_per_ttl_ms = ms;
        self
    }

    /// Set the incomplete timer duration.
    pub fn incomplete_timer(mut self, ms: u64) -> Self {
        self.incomplete_timer_ms = ms;
        self
    }

    /// Block-Ack timer duration for a segment received with `ttl`.
    pub fn ack_timeout(&self, ttl: u8) -> u64 {
        self.ack_timer_base_ms + self.ack_timer_per_ttl_ms * ttl as u64
    }

    /// Validate against the profile minimums.
    pub fn validate(&self) -> TransportResult<()> {
        if !self.element_addr.is_unicast() {
            return Err(TransportError::config("element address must be unicast"));
        }
        if self.ack_timer_base_ms < 150 {
            return Err(TransportError::config("ack timer base must be at least 150 ms"));
        }
        if self.incomplete_timer_ms < 10_000 {
            return Err(TransportError::config(
                "incomplete timer must be at least 10 seconds",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(TransportConfig::default().validate().is_ok());
    }

    #[test]
    fn test_ack_timeout_scales_with_ttl() {
        let config = TransportConfig::default();
        assert_eq!(config.ack_timeout(0), 150);
        assert_eq!(config.ack_timeout(5), 400);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(TransportConfig::new(Address(0xC000)).validate().is_err());
        assert!(TransportConfig::default()
            .incomplete_timer(5_000)
            .validate()
            .is_err());
        assert!(TransportConfig::default().ack_timer_base(100).validate().is_err());
    }
}
