// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Neighbor blacklist.
//!
//! A neighbor is marked when route validation through it fails; while the
//! entry lives, next-hop lookups via that neighbor report `Blacklisted`.
//! Entries disappear on expiry or explicit clear.

use super::{ShortAddress, TableError};

#[derive(Debug, Clone, Copy)]
struct BlacklistEntry {
    neighbor: ShortAddress,
    valid_until: u64,
}

/// Fixed-capacity blacklist keyed by neighbor address.
#[derive(Debug)]
pub struct BlacklistTable {
    slots: Vec<Option<BlacklistEntry>>,
}

impl BlacklistTable {
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

    /// Insert or refresh a blacklist entry for `duration_ms`.
    ///
    /// On a full table the nearest-expiry entry is replaced.
    pub fn mark(
        &mut self,
        neighbor: ShortAddress,
        duration_ms: u64,
        now_ms: u64,
    ) -> Result<(), TableError> {
        let valid_until = now_ms.saturating_add(duration_ms);

        if let Some(entry) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|e| e.neighbor == neighbor)
        {
            entry.valid_until = valid_until;
            return Ok(());
        }

        let slot = match self.slots.iter().position(|s| s.is_none()) {
            Some(i) => i,
            None => {
                let i = self
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| s.as_ref().map(|e| (i, e.valid_until)))
                    .min_by_key(|&(_, until)| until)
                    .map(|(i, _)| i)
                    .ok_or(TableError::TableFull)?;
                log::debug!(
                    "[blacklist] table full, replacing neighbor=0x{:04x}",
                    self.slots[i].map_or(0, |e| e.neighbor)
                );
                i
            }
        };
        self.slots[slot] = Some(BlacklistEntry {
            neighbor,
            valid_until,
        });
        Ok(())
    }

    /// True while a live entry exists for the neighbor.
    pub fn is_blacklisted(&self, neighbor: ShortAddress, now_ms: u64) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|e| e.neighbor == neighbor && e.valid_until > now_ms)
    }

    /// Explicit administrative clear.
    pub fn clear(&mut self, neighbor: ShortAddress) -> bool {
        for slot in &mut self.slots {
            if slot.map_or(false, |e| e.neighbor == neighbor) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Remove entries with `valid_until <= now_ms`.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_expiry() {
        let mut bl = BlacklistTable::new(2);
        bl.mark(0x0005, 1_000, 0).unwrap();
        assert!(bl.is_blacklisted(0x0005, 999));
        assert!(!bl.is_blacklisted(0x0005, 1_000));
        assert_eq!(bl.expire(1_000), 1);
        assert_eq!(bl.len(), 0);
    }

    #[test]
    fn test_mark_refreshes() {
        let mut bl = BlacklistTable::new(1);
        bl.mark(0x0005, 1_000, 0).unwrap();
        bl.mark(0x0005, 1_000, 500).unwrap();
        assert_eq!(bl.len(), 1);
        assert!(bl.is_blacklisted(0x0005, 1_200));
    }

    #[test]
    fn test_full_table_replaces_nearest_expiry() {
        let mut bl = BlacklistTable::new(2);
        bl.mark(1, 500, 0).unwrap();
        bl.mark(2, 5_000, 0).unwrap();
        bl.mark(3, 1_000, 0).unwrap();
        assert!(!bl.is_blacklisted(1, 0));
        assert!(bl.is_blacklisted(2, 0));
        assert!(bl.is_blacklisted(3, 0));
    }

    #[test]
    fn test_clear() {
        let mut bl = BlacklistTable::new(2);
        bl.mark(7, 1_000, 0).unwrap();
        assert!(bl.clear(7));
        assert!(!bl.clear(7));
        assert!(!bl.is_blacklisted(7, 0));
    }
}
