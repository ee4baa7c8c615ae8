// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-flight route-discovery bookkeeping.
//!
//! Four small bounded tables share one entry shape, keyed by
//! `(originator, sequence number)`:
//!
//! - **pending**: route requests this node originated
//! - **reply**: route replies this node still owes (it was the target)
//! - **forward**: route requests relayed for other nodes
//! - **discovery**: general per-discovery state used for duplicate
//!   suppression
//!
//! Entry lifecycle: created when a request is issued or relayed, destroyed
//! on the matching reply, on timeout, or by oldest-first eviction when the
//! table is full. Per-key state machine:
//! `Pending -> (RouteFound | Forwarded | TimedOut)`.

use super::ShortAddress;

/// Discovery entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Waiting for a route reply.
    Pending,
    /// Reply received; entry is removed on this transition.
    RouteFound,
    /// Request relayed for another originator; waiting for the reply to
    /// pass back through.
    Forwarded,
    /// Discovery timeout elapsed; entry is evicted by `expire`.
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
struct DiscoveryEntry {
    originator: ShortAddress,
    seq_no: u16,
    state: DiscoveryState,
    created_at: u64,
    deadline: u64,
}

/// Counters accumulated across `expire` sweeps and evictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub timeouts: u64,
    pub evictions: u64,
    pub resolved: u64,
}

/// One bounded discovery table.
#[derive(Debug)]
pub struct DiscoveryTable {
    name: &'static str,
    slots: Vec<Option<DiscoveryEntry>>,
    stats: DiscoveryStats,
}

impl DiscoveryTable {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            slots: vec![None; capacity],
            stats: DiscoveryStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> DiscoveryStats {
        self.stats
    }

    pub fn contains(&self, originator: ShortAddress, seq_no: u16) -> bool {
        self.find(originator, seq_no).is_some()
    }

    pub fn state(&self, originator: ShortAddress, seq_no: u16) -> Option<DiscoveryState> {
        let i = self.find(originator, seq_no)?;
        self.slots[i].as_ref().map(|e| e.state)
    }

    /// Insert an entry, refreshing the deadline if the key already exists.
    ///
    /// Returns `true` if the key was new. A full table evicts its oldest
    /// entry (smallest `created_at`).
    pub fn insert(
        &mut self,
        originator: ShortAddress,
        seq_no: u16,
        state: DiscoveryState,
        timeout_ms: u64,
        now_ms: u64,
    ) -> bool {
        if let Some(i) = self.find(originator, seq_no) {
            if let Some(entry) = self.slots[i].as_mut() {
                entry.state = state;
                entry.deadline = now_ms.saturating_add(timeout_ms);
            }
            return false;
        }

        let slot = match self.slots.iter().position(|s| s.is_none()) {
            Some(i) => i,
            None => {
                // Oldest-first eviction.
                let i = self
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| s.as_ref().map(|e| (i, e.created_at)))
                    .min_by_key(|&(_, created)| created)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                log::debug!("[{}] table full, evicting oldest entry", self.name);
                self.stats.evictions += 1;
                i
            }
        };
        self.slots[slot] = Some(DiscoveryEntry {
            originator,
            seq_no,
            state,
            created_at: now_ms,
            deadline: now_ms.saturating_add(timeout_ms),
        });
        true
    }

    /// Resolve a key (matching reply arrived): `Pending`/`Forwarded`
    /// transitions to `RouteFound` and the entry is destroyed.
    pub fn resolve(&mut self, originator: ShortAddress, seq_no: u16) -> bool {
        if let Some(i) = self.find(originator, seq_no) {
            self.slots[i] = None;
            self.stats.resolved += 1;
            true
        } else {
            false
        }
    }

    /// Time out entries past their deadline (`Pending -> TimedOut`, then
    /// evicted; `Forwarded` entries time out the same way).
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let mut removed = 0;
        for slot in &mut self.slots {
            if slot.map_or(false, |e| e.deadline <= now_ms) {
                if let Some(e) = slot.take() {
                    log::debug!(
                        "[{}] discovery timed out originator=0x{:04x} seq={}",
                        self.name,
                        e.originator,
                        e.seq_no
                    );
                }
                removed += 1;
            }
        }
        self.stats.timeouts += removed as u64;
        removed
    }

    fn find(&self, originator: ShortAddress, seq_no: u16) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.map_or(false, |e| e.originator == originator && e.seq_no == seq_no)
        })
    }
}

/// The four discovery tables, operated as one unit by the dispatcher.
#[derive(Debug)]
pub struct DiscoveryTables {
    pending: DiscoveryTable,
    reply: DiscoveryTable,
    forward: DiscoveryTable,
    discovery: DiscoveryTable,
    timeout_ms: u64,
}

impl DiscoveryTables {
    pub fn new(
        pending_capacity: usize,
        reply_capacity: usize,
        forward_capacity: usize,
        discovery_capacity: usize,
        timeout_ms: u64,
    ) -> Self {
        Self {
            pending: DiscoveryTable::new("rreq-pending", pending_capacity),
            reply: DiscoveryTable::new("rrep-gen", reply_capacity),
            forward: DiscoveryTable::new("rreq-forward", forward_capacity),
            discovery: DiscoveryTable::new("discovery", discovery_capacity),
            timeout_ms,
        }
    }

    /// Start a discovery this node originates. Returns `false` if one is
    /// already pending for the key (duplicate suppression: no second
    /// request goes out).
    pub fn begin(&mut self, originator: ShortAddress, seq_no: u16, now_ms: u64) -> bool {
        let fresh = self.pending.insert(
            originator,
            seq_no,
            DiscoveryState::Pending,
            self.timeout_ms,
            now_ms,
        );
        self.discovery.insert(
            originator,
            seq_no,
            DiscoveryState::Pending,
            self.timeout_ms,
            now_ms,
        );
        fresh
    }

    /// Per-request duplicate suppression against the shared discovery
    /// table. Returns `false` if this `(originator, seq_no)` was already
    /// seen; the caller must not act on the request again.
    pub fn note_request_seen(
        &mut self,
        originator: ShortAddress,
        seq_no: u16,
        now_ms: u64,
    ) -> bool {
        if self.discovery.contains(originator, seq_no) {
            return false;
        }
        self.discovery.insert(
            originator,
            seq_no,
            DiscoveryState::Forwarded,
            self.timeout_ms,
            now_ms,
        );
        true
    }

    /// Record a relayed request. Returns `false` for duplicates, which the
    /// caller must not relay again.
    pub fn note_forwarded(&mut self, originator: ShortAddress, seq_no: u16, now_ms: u64) -> bool {
        if !self.note_request_seen(originator, seq_no, now_ms) {
            return false;
        }
        self.forward.insert(
            originator,
            seq_no,
            DiscoveryState::Forwarded,
            self.timeout_ms,
            now_ms,
        )
    }

    /// Record that this node owes a reply for a request addressed to it.
    pub fn note_reply_owed(&mut self, originator: ShortAddress, seq_no: u16, now_ms: u64) -> bool {
        self.reply.insert(
            originator,
            seq_no,
            DiscoveryState::Pending,
            self.timeout_ms,
            now_ms,
        )
    }

    /// The owed reply was queued for transmission.
    pub fn reply_sent(&mut self, originator: ShortAddress, seq_no: u16) -> bool {
        self.reply.resolve(originator, seq_no)
    }

    /// A reply for a discovery this node originated arrived.
    pub fn route_found(&mut self, originator: ShortAddress, seq_no: u16) -> bool {
        let was_pending = self.pending.resolve(originator, seq_no);
        self.discovery.resolve(originator, seq_no);
        was_pending
    }

    /// A relayed reply passed back through this node.
    pub fn reply_relayed(&mut self, originator: ShortAddress, seq_no: u16) -> bool {
        let relayed = self.forward.resolve(originator, seq_no);
        self.discovery.resolve(originator, seq_no);
        relayed
    }

    /// True while a request this node relayed is still waiting for its
    /// reply.
    pub fn is_forwarding(&self, originator: ShortAddress, seq_no: u16) -> bool {
        self.forward.contains(originator, seq_no)
    }

    pub fn is_pending(&self, originator: ShortAddress, seq_no: u16) -> bool {
        self.pending.contains(originator, seq_no)
    }

    /// Sweep all four tables. Returns total entries timed out.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        self.pending.expire(now_ms)
            + self.reply.expire(now_ms)
            + self.forward.expire(now_ms)
            + self.discovery.expire(now_ms)
    }

    pub fn stats(&self) -> DiscoveryStats {
        let mut total = DiscoveryStats::default();
        for table in [&self.pending, &self.reply, &self.forward, &self.discovery] {
            let s = table.stats();
            total.timeouts += s.timeouts;
            total.evictions += s.evictions;
            total.resolved += s.resolved;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_lifecycle() {
        let mut tables = DiscoveryTables::new(4, 4, 4, 8, 1_000);
        assert!(tables.begin(0x0001, 10, 0));
        assert!(tables.is_pending(0x0001, 10));
        // Duplicate begin is suppressed.
        assert!(!tables.begin(0x0001, 10, 100));

        assert!(tables.route_found(0x0001, 10));
        assert!(!tables.is_pending(0x0001, 10));
        assert!(!tables.route_found(0x0001, 10));
    }

    #[test]
    fn test_pending_times_out() {
        let mut tables = DiscoveryTables::new(4, 4, 4, 8, 1_000);
        tables.begin(0x0001, 10, 0);
        assert_eq!(tables.expire(999), 0);
        // Entry sits in both pending and discovery tables.
        assert_eq!(tables.expire(1_000), 2);
        assert!(!tables.is_pending(0x0001, 10));
    }

    #[test]
    fn test_forward_duplicate_suppression() {
        let mut tables = DiscoveryTables::new(4, 4, 4, 8, 1_000);
        assert!(tables.note_forwarded(0x0002, 5, 0));
        assert!(!tables.note_forwarded(0x0002, 5, 10));
        assert!(tables.is_forwarding(0x0002, 5));
        assert!(tables.reply_relayed(0x0002, 5));
        assert!(!tables.is_forwarding(0x0002, 5));
    }

    #[test]
    fn test_request_seen_dedup() {
        let mut tables = DiscoveryTables::new(4, 4, 4, 8, 1_000);
        assert!(tables.note_request_seen(0x0004, 2, 0));
        assert!(!tables.note_request_seen(0x0004, 2, 50));
        // A later forward of the same request is a duplicate too.
        assert!(!tables.note_forwarded(0x0004, 2, 60));
    }

    #[test]
    fn test_reply_owed() {
        let mut tables = DiscoveryTables::new(4, 4, 4, 8, 1_000);
        assert!(tables.note_reply_owed(0x0003, 1, 0));
        assert!(tables.reply_sent(0x0003, 1));
        assert!(!tables.reply_sent(0x0003, 1));
    }

    #[test]
    fn test_oldest_first_eviction() {
        let mut table = DiscoveryTable::new("test", 2);
        table.insert(1, 1, DiscoveryState::Pending, 1_000, 0);
        table.insert(2, 1, DiscoveryState::Pending, 1_000, 100);
        table.insert(3, 1, DiscoveryState::Pending, 1_000, 200);
        assert!(!table.contains(1, 1));
        assert!(table.contains(2, 1));
        assert!(table.contains(3, 1));
        assert_eq!(table.stats().evictions, 1);
    }

    #[test]
    fn test_state_query() {
        let mut table = DiscoveryTable::new("test", 2);
        table.insert(1, 1, DiscoveryState::Forwarded, 1_000, 0);
        assert_eq!(table.state(1, 1), Some(DiscoveryState::Forwarded));
        assert_eq!(table.state(9, 9), None);
    }
}
