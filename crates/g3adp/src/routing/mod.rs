// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LOADng routing bookkeeping: route table, neighbor blacklist, and the
//! in-flight route-discovery tables.
//!
//! All tables are fixed-capacity slot arrays keyed by destination or
//! `(originator, sequence number)`. Expiry never reads a clock; callers
//! pass a monotonic `now_ms` into `expire`/lookup operations, which keeps
//! the tables deterministic under test.

mod blacklist;
mod discovery;
mod route_table;

pub use blacklist::BlacklistTable;
pub use discovery::{DiscoveryState, DiscoveryStats, DiscoveryTable, DiscoveryTables};
pub use route_table::{RouteEntry, RouteTable};

use std::fmt;

/// 16-bit mesh short address.
pub type ShortAddress = u16;

/// Broadcast short address.
pub const ADDR_BROADCAST: ShortAddress = 0xFFFF;

/// Bounded-table errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// No free slot and no entry evictable under the table's policy.
    TableFull,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull => write!(f, "table full"),
        }
    }
}

impl std::error::Error for TableError {}

/// Outcome of a next-hop lookup that honors the blacklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// A live route exists; forward via this neighbor.
    Forward(ShortAddress),
    /// A route exists but its next hop is currently blacklisted.
    Blacklisted,
    /// No live route; the caller should start discovery.
    NoRoute,
}

/// Route lookup combining route table and blacklist state.
pub fn next_hop(
    routes: &RouteTable,
    blacklist: &BlacklistTable,
    destination: ShortAddress,
    now_ms: u64,
) -> RouteDecision {
    match routes.lookup(destination, now_ms) {
        Some(entry) if blacklist.is_blacklisted(entry.next_hop, now_ms) => {
            RouteDecision::Blacklisted
        }
        Some(entry) => RouteDecision::Forward(entry.next_hop),
        None => RouteDecision::NoRoute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_hop_decisions() {
        let mut routes = RouteTable::new(4);
        let mut blacklist = BlacklistTable::new(4);

        assert_eq!(next_hop(&routes, &blacklist, 0x0010, 0), RouteDecision::NoRoute);

        routes
            .insert_or_refresh(RouteEntry::new(0x0010, 0x0002, 1, 1), 10_000, 0)
            .unwrap();
        assert_eq!(
            next_hop(&routes, &blacklist, 0x0010, 0),
            RouteDecision::Forward(0x0002)
        );

        blacklist.mark(0x0002, 5_000, 0).unwrap();
        assert_eq!(
            next_hop(&routes, &blacklist, 0x0010, 0),
            RouteDecision::Blacklisted
        );

        // Blacklist entry expires before the route does.
        assert_eq!(
            next_hop(&routes, &blacklist, 0x0010, 6_000),
            RouteDecision::Forward(0x0002)
        );
    }
}
