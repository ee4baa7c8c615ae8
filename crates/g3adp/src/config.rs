// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Adaptation layer configuration.
//!
//! Every table capacity and timeout is injected here; the algorithms never
//! hard-code them. Defaults follow the stack's reference profile (150
//! routes, 20 blacklist slots, 400-byte fragments).

use crate::fragment::ReassemblyConfig;
use crate::lbp::ExtendedAddress;
use crate::pool::PoolConfig;
use crate::routing::ShortAddress;

/// Dispatcher and table configuration.
#[derive(Debug, Clone)]
pub struct AdpConfig {
    /// This node's 16-bit mesh address.
    pub short_address: ShortAddress,
    /// This node's EUI-64, used in bootstrap frames.
    pub extended_address: ExtendedAddress,

    /// Route table capacity.
    pub route_table_size: usize,
    /// Blacklist capacity.
    pub blacklist_size: usize,
    /// Pending route-request table capacity.
    pub pending_request_size: usize,
    /// Route-reply-generation table capacity.
    pub reply_generation_size: usize,
    /// Route-request-forward table capacity.
    pub request_forward_size: usize,
    /// Route-discovery bookkeeping table capacity.
    pub discovery_size: usize,

    /// Route entry lifetime.
    pub route_ttl_ms: u64,
    /// Blacklist entry lifetime.
    pub blacklist_ttl_ms: u64,
    /// Route discovery timeout.
    pub discovery_timeout_ms: u64,

    /// Reassembly table tuning.
    pub reassembly: ReassemblyConfig,
    /// Per-fragment payload budget for outbound datagrams.
    pub fragment_size: usize,

    /// TX queue capacity (priority mode).
    pub tx_queue_capacity: u16,
    /// RX staging queue capacity (FIFO).
    pub rx_queue_capacity: u16,

    /// Maximum hops a relayed route request may travel.
    pub max_hops: u8,
    /// Respond to malformed bootstrap frames with a `Decline` instead of
    /// dropping them silently.
    pub decline_on_decode_error: bool,

    /// Frame buffer pool layout.
    pub pool: PoolConfig,
}

impl Default for AdpConfig {
    fn default() -> Self {
        Self {
            short_address: 0x0000,
            extended_address: 0,
            route_table_size: 150,
            blacklist_size: 20,
            pending_request_size: 6,
            reply_generation_size: 3,
            request_forward_size: 5,
            discovery_size: 6,
            route_ttl_ms: 300_000,
            blacklist_ttl_ms: 120_000,
            discovery_timeout_ms: 10_000,
            reassembly: ReassemblyConfig::default(),
            fragment_size: 400,
            tx_queue_capacity: 16,
            rx_queue_capacity: 16,
            max_hops: 8,
            decline_on_decode_error: true,
            pool: PoolConfig::default(),
        }
    }
}

impl AdpConfig {
    pub fn with_short_address(mut self, addr: ShortAddress) -> Self {
        self.short_address = addr;
        self
    }

    pub fn with_extended_address(mut self, addr: ExtendedAddress) -> Self {
        self.extended_address = addr;
        self
    }

    pub fn with_route_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.route_ttl_ms = ttl_ms;
        self
    }

    pub fn with_discovery_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.discovery_timeout_ms = timeout_ms;
        self
    }

    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    pub fn with_queue_capacities(mut self, tx: u16, rx: u16) -> Self {
        self.tx_queue_capacity = tx;
        self.rx_queue_capacity = rx;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_profile() {
        let cfg = AdpConfig::default();
        assert_eq!(cfg.route_table_size, 150);
        assert_eq!(cfg.blacklist_size, 20);
        assert_eq!(cfg.fragment_size, 400);
        assert_eq!(cfg.pool.classes.len(), 3);
    }

    #[test]
    fn test_builders() {
        let cfg = AdpConfig::default()
            .with_short_address(0x0042)
            .with_fragment_size(128)
            .with_queue_capacities(4, 8);
        assert_eq!(cfg.short_address, 0x0042);
        assert_eq!(cfg.fragment_size, 128);
        assert_eq!(cfg.tx_queue_capacity, 4);
        assert_eq!(cfg.rx_queue_capacity, 8);
    }
}
