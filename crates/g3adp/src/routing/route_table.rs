// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route table with TTL-based expiry and bounded eviction.
//!
//! Entries are created on successful route discovery, refreshed by valid
//! traffic, and destroyed on TTL expiry or administrative invalidation.
//! When the table is full, insertion evicts the entry with the nearest
//! expiry, but never one that would outlive the new entry's initial TTL.

use super::{ShortAddress, TableError};

/// A discovered mesh route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: ShortAddress,
    pub next_hop: ShortAddress,
    pub hop_count: u8,
    pub seq_no: u16,
    /// Absolute expiry, monotonic milliseconds.
    pub valid_until: u64,
}

impl RouteEntry {
    /// Entry with `valid_until` unset; `insert_or_refresh` stamps it.
    pub fn new(
        destination: ShortAddress,
        next_hop: ShortAddress,
        hop_count: u8,
        seq_no: u16,
    ) -> Self {
        Self {
            destination,
            next_hop,
            hop_count,
            seq_no,
            valid_until: 0,
        }
    }

    fn remaining(&self, now_ms: u64) -> u64 {
        self.valid_until.saturating_sub(now_ms)
    }
}

/// Fixed-capacity route table, keyed by destination address.
#[derive(Debug)]
pub struct RouteTable {
    slots: Vec<Option<RouteEntry>>,
}

impl RouteTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Look up a live route. Expired entries are treated as absent (they
    /// are physically removed by the next `expire` sweep).
    pub fn lookup(&self, destination: ShortAddress, now_ms: u64) -> Option<&RouteEntry> {
        self.slots
            .iter()
            .flatten()
            .find(|e| e.destination == destination && e.valid_until > now_ms)
    }

    /// Insert a route or refresh an existing one for the same destination.
    ///
    /// Refresh updates next hop/hop count/sequence number and restarts the
    /// TTL. On a full table the entry with the smallest remaining TTL is
    /// evicted, unless every entry would outlive the new one; then the
    /// insertion is rejected with `TableFull`.
    pub fn insert_or_refresh(
        &mut self,
        mut entry: RouteEntry,
        ttl_ms: u64,
        now_ms: u64,
    ) -> Result<(), TableError> {
        entry.valid_until = now_ms.saturating_add(ttl_ms);

        if let Some(slot) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|e| e.destination == entry.destination)
        {
            *slot = entry;
            return Ok(());
        }

        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some(entry);
            return Ok(());
        }

        // Evict the nearest-expiry entry, but never one fresher than the
        // newcomer's initial TTL.
        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (i, e.remaining(now_ms))))
            .min_by_key(|&(_, remaining)| remaining)
            .filter(|&(_, remaining)| remaining <= ttl_ms)
            .map(|(i, _)| i);

        match victim {
            Some(i) => {
                log::debug!(
                    "[route] table full, evicting dest=0x{:04x} for dest=0x{:04x}",
                    self.slots[i].as_ref().map_or(0, |e| e.destination),
                    entry.destination
                );
                self.slots[i] = Some(entry);
                Ok(())
            }
            None => Err(TableError::TableFull),
        }
    }

    /// Extend the TTL of an existing route (valid traffic observed).
    pub fn refresh(&mut self, destination: ShortAddress, ttl_ms: u64, now_ms: u64) -> bool {
        if let Some(entry) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|e| e.destination == destination && e.valid_until > now_ms)
        {
            entry.valid_until = now_ms.saturating_add(ttl_ms);
            true
        } else {
            false
        }
    }

    /// Administrative removal (e.g. on a route error report).
    pub fn invalidate(&mut self, destination: ShortAddress) -> bool {
        for slot in &mut self.slots {
            if slot.map_or(false, |e| e.destination == destination) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Remove every entry with `valid_until <= now_ms`. Returns the number
    /// of entries removed.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let mut removed = 0;
        for slot in &mut self.slots {
            if slot.map_or(false, |e| e.valid_until <= now_ms) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }
}
