// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram fragmentation and reassembly.
//!
//! Datagrams larger than the mesh MTU travel as multiple fragments, each
//! carrying a fixed header:
//!
//! ```text
//! FragHeader = tag(u16 BE) | total(u16 BE) | offset(u16 BE) | flags(u8)
//! ```
//!
//! - `tag`: datagram tag, shared by all fragments of one transfer
//! - `total`: declared total datagram length
//! - `offset`: byte offset of this fragment's payload
//! - `flags`: bit 0 = last fragment
//!
//! Reassembly tracks received byte **ranges** rather than a running
//! counter, so out-of-order and duplicate fragments are tolerated; a
//! transfer completes when coverage equals the declared total. Transfers
//! idle past the configured timeout are purged, and a full table evicts
//! its least-recently-active transfer.

use std::fmt;

use crate::routing::ShortAddress;

/// Encoded fragment header length.
pub const FRAG_HEADER_LEN: usize = 7;

const FLAG_LAST: u8 = 0x01;

/// Fragmentation/reassembly errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragError {
    /// Output buffer cannot hold the encoded fragment.
    BufferTooSmall,
    /// Header shorter than [`FRAG_HEADER_LEN`] or reserved flags set.
    InvalidHeader,
    /// Declared total exceeds the configured maximum datagram size.
    DatagramTooLarge,
    /// Fragment payload would extend past the declared total.
    FragmentOverrun,
    /// Fragment declares a different total than the existing transfer, or
    /// the last fragment does not end at the declared total.
    TotalMismatch,
    /// Payload too large to split into `u16`-addressable fragments.
    PayloadTooLarge,
}

impl fmt::Display for FragError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::InvalidHeader => write!(f, "invalid fragment header"),
            Self::DatagramTooLarge => write!(f, "datagram exceeds configured maximum"),
            Self::FragmentOverrun => write!(f, "fragment extends past declared total"),
            Self::TotalMismatch => write!(f, "declared total length mismatch"),
            Self::PayloadTooLarge => write!(f, "payload too large to fragment"),
        }
    }
}

impl std::error::Error for FragError {}

/// Fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragHeader {
    pub tag: u16,
    pub total: u16,
    pub offset: u16,
    pub is_last: bool,
}

impl FragHeader {
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FragError> {
        if buf.len() < FRAG_HEADER_LEN {
            return Err(FragError::BufferTooSmall);
        }
        buf[0..2].copy_from_slice(&self.tag.to_be_bytes());
        buf[2..4].copy_from_slice(&self.total.to_be_bytes());
        buf[4..6].copy_from_slice(&self.offset.to_be_bytes());
        buf[6] = if self.is_last { FLAG_LAST } else { 0 };
        Ok(FRAG_HEADER_LEN)
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FragError> {
        if buf.len() < FRAG_HEADER_LEN {
            return Err(FragError::InvalidHeader);
        }
        let flags = buf[6];
        if flags & !FLAG_LAST != 0 {
            return Err(FragError::InvalidHeader);
        }
        Ok((
            Self {
                tag: u16::from_be_bytes([buf[0], buf[1]]),
                total: u16::from_be_bytes([buf[2], buf[3]]),
                offset: u16::from_be_bytes([buf[4], buf[5]]),
                is_last: flags & FLAG_LAST != 0,
            },
            FRAG_HEADER_LEN,
        ))
    }
}

/// Reassembly table configuration.
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// Maximum simultaneous in-progress transfers.
    pub max_transfers: usize,
    /// Maximum accepted declared datagram length.
    pub max_datagram_size: usize,
    /// Idle timeout before a partial transfer is purged.
    pub timeout_ms: u64,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            max_transfers: 8,
            max_datagram_size: 1280,
            timeout_ms: 15_000,
        }
    }
}

/// Reassembly counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReassemblyStats {
    pub fragments_received: u64,
    pub datagrams_completed: u64,
    pub transfers_timed_out: u64,
    pub transfers_evicted: u64,
    pub duplicates_merged: u64,
}

#[derive(Debug)]
struct Transfer {
    origin: ShortAddress,
    tag: u16,
    total: usize,
    buf: Vec<u8>,
    /// Sorted, non-overlapping received byte ranges `[start, end)`.
    ranges: Vec<(usize, usize)>,
    last_activity: u64,
}

impl Transfer {
    fn new(origin: ShortAddress, tag: u16, total: usize, now_ms: u64) -> Self {
        Self {
            origin,
            tag,
            total,
            buf: vec![0u8; total],
            ranges: Vec::new(),
            last_activity: now_ms,
        }
    }

    /// Merge `[start, end)` into the received set. Returns `true` if the
    /// range added no new bytes (pure duplicate).
    fn add_range(&mut self, start: usize, end: usize) -> bool {
        let covered = self
            .ranges
            .iter()
            .any(|&(s, e)| s <= start && end <= e);
        if covered {
            return true;
        }
        self.ranges.push((start, end));
        self.ranges.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
        false
    }

    fn is_complete(&self) -> bool {
        self.ranges == [(0, self.total)]
    }
}

/// Fixed-size table of in-progress transfers, keyed `(origin, tag)`.
#[derive(Debug)]
pub struct ReassemblyTable {
    config: ReassemblyConfig,
    transfers: Vec<Option<Transfer>>,
    stats: ReassemblyStats,
}

impl ReassemblyTable {
    pub fn new(config: ReassemblyConfig) -> Self {
        let max = config.max_transfers;
        Self {
            config,
            transfers: (0..max).map(|_| None).collect(),
            stats: ReassemblyStats::default(),
        }
    }

    pub fn pending(&self) -> usize {
        self.transfers.iter().filter(|t| t.is_some()).count()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Feed one received fragment.
    ///
    /// The first fragment of an unknown tag creates a transfer sized by
    /// the declared total. Returns `Ok(Some(datagram))` when coverage
    /// reaches the declared total (the transfer entry is destroyed),
    /// `Ok(None)` while incomplete.
    pub fn on_fragment(
        &mut self,
        origin: ShortAddress,
        header: &FragHeader,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<Option<Vec<u8>>, FragError> {
        self.stats.fragments_received += 1;

        let total = header.total as usize;
        let start = header.offset as usize;
        let end = start
            .checked_add(payload.len())
            .ok_or(FragError::FragmentOverrun)?;

        if total > self.config.max_datagram_size {
            return Err(FragError::DatagramTooLarge);
        }
        if end > total {
            return Err(FragError::FragmentOverrun);
        }
        if header.is_last && end != total {
            return Err(FragError::TotalMismatch);
        }

        let slot = match self.find(origin, header.tag) {
            Some(i) => i,
            None => {
                let i = self.free_slot();
                self.transfers[i] = Some(Transfer::new(origin, header.tag, total, now_ms));
                i
            }
        };
        // Slot was found or just filled above.
        let Some(transfer) = self.transfers[slot].as_mut() else {
            return Err(FragError::InvalidHeader);
        };

        if transfer.total != total {
            return Err(FragError::TotalMismatch);
        }

        transfer.buf[start..end].copy_from_slice(payload);
        if transfer.add_range(start, end) {
            self.stats.duplicates_merged += 1;
        }
        transfer.last_activity = now_ms;

        if transfer.is_complete() {
            let done = self.transfers[slot].take();
            self.stats.datagrams_completed += 1;
            log::debug!(
                "[frag] transfer complete origin=0x{:04x} tag={} len={}",
                origin,
                header.tag,
                total
            );
            return Ok(done.map(|t| t.buf));
        }
        Ok(None)
    }

    /// Purge transfers unmodified for longer than the configured timeout.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let timeout = self.config.timeout_ms;
        let mut removed = 0;
        for slot in &mut self.transfers {
            let stale = slot
                .as_ref()
                .map_or(false, |t| now_ms.saturating_sub(t.last_activity) >= timeout);
            if stale {
                if let Some(t) = slot.take() {
                    log::debug!(
                        "[frag] reassembly timeout origin=0x{:04x} tag={}",
                        t.origin,
                        t.tag
                    );
                }
                removed += 1;
            }
        }
        self.stats.transfers_timed_out += removed as u64;
        removed
    }

    fn find(&self, origin: ShortAddress, tag: u16) -> Option<usize> {
        self.transfers.iter().position(|s| {
            s.as_ref()
                .map_or(false, |t| t.origin == origin && t.tag == tag)
        })
    }

    /// A free slot, evicting the least-recently-active transfer if none.
    fn free_slot(&mut self) -> usize {
        if let Some(i) = self.transfers.iter().position(|s| s.is_none()) {
            return i;
        }
        let i = self
            .transfers
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|t| (i, t.last_activity)))
            .min_by_key(|&(_, at)| at)
            .map(|(i, _)| i)
            .unwrap_or(0);
        log::debug!("[frag] transfer table full, evicting stalest entry");
        self.stats.transfers_evicted += 1;
        self.transfers[i] = None;
        i
    }
}

// ============================================================================
// Fragmenter (sender side)
// ============================================================================

/// Splits outbound datagrams into MTU-sized fragments.
#[derive(Debug, Clone)]
pub struct Fragmenter {
    max_frag_payload: usize,
}

impl Fragmenter {
    /// `fragment_size` is the per-fragment payload budget, header excluded.
    pub fn new(fragment_size: usize) -> Self {
        Self {
            max_frag_payload: fragment_size.max(1),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_frag_payload
    }

    pub fn needs_fragmentation(&self, payload_len: usize) -> bool {
        payload_len > self.max_frag_payload
    }

    /// Split `payload` into `(header, chunk)` pairs covering it in order.
    /// An empty payload yields a single empty last fragment.
    pub fn fragment(
        &self,
        tag: u16,
        payload: &[u8],
    ) -> Result<Vec<(FragHeader, Vec<u8>)>, FragError> {
        if payload.len() > u16::MAX as usize {
            return Err(FragError::PayloadTooLarge);
        }
        let total = payload.len() as u16;
        if payload.is_empty() {
            return Ok(vec![(
                FragHeader {
                    tag,
                    total: 0,
                    offset: 0,
                    is_last: true,
                },
                Vec::new(),
            )]);
        }

        let mut out = Vec::with_capacity(payload.len().div_ceil(self.max_frag_payload));
        let mut offset = 0usize;
        while offset < payload.len() {
            let end = (offset + self.max_frag_payload).min(payload.len());
            out.push((
                FragHeader {
                    tag,
                    total,
                    offset: offset as u16,
                    is_last: end == payload.len(),
                },
                payload[offset..end].to_vec(),
            ));
            offset = end;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(tag: u16, total: u16, offset: u16, is_last: bool) -> FragHeader {
        FragHeader {
            tag,
            total,
            offset,
            is_last,
        }
    }

    // ========================================================================
    // FragHeader
    // ========================================================================

    #[test]
    fn test_header_roundtrip() {
        let h = header(0x1234, 400, 250, true);
        let mut buf = [0u8; 16];
        let n = h.encode(&mut buf).unwrap();
        let (decoded, consumed) = FragHeader::decode(&buf).unwrap();
        assert_eq!(n, consumed);
        assert_eq!(decoded, h);
    }

    #[test]
    fn test_header_truncated() {
        let h = header(1, 10, 0, false);
        let mut buf = [0u8; 16];
        h.encode(&mut buf).unwrap();
        assert_eq!(
            FragHeader::decode(&buf[..FRAG_HEADER_LEN - 1]),
            Err(FragError::InvalidHeader)
        );
    }

    #[test]
    fn test_header_reserved_flags() {
        let mut buf = [0u8; FRAG_HEADER_LEN];
        buf[6] = 0x80;
        assert_eq!(FragHeader::decode(&buf), Err(FragError::InvalidHeader));
    }

    // ========================================================================
    // Reassembly
    // ========================================================================

    #[test]
    fn test_in_order_reassembly() {
        let mut table = ReassemblyTable::new(ReassemblyConfig::default());
        let original: Vec<u8> = (0..400u16).map(|i| i as u8).collect();

        let r = table
            .on_fragment(1, &header(7, 400, 0, false), &original[0..100], 0)
            .unwrap();
        assert!(r.is_none());
        let r = table
            .on_fragment(1, &header(7, 400, 100, false), &original[100..250], 0)
            .unwrap();
        assert!(r.is_none());
        let r = table
            .on_fragment(1, &header(7, 400, 250, true), &original[250..400], 0)
            .unwrap();
        assert_eq!(r.unwrap(), original);
        assert_eq!(table.pending(), 0);
        assert_eq!(table.stats().datagrams_completed, 1);
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let mut table = ReassemblyTable::new(ReassemblyConfig::default());
        let original: Vec<u8> = (0..400u16).map(|i| i as u8).collect();

        assert!(table
            .on_fragment(1, &header(7, 400, 250, true), &original[250..400], 0)
            .unwrap()
            .is_none());
        assert!(table
            .on_fragment(1, &header(7, 400, 0, false), &original[0..100], 0)
            .unwrap()
            .is_none());
        let r = table
            .on_fragment(1, &header(7, 400, 100, false), &original[100..250], 0)
            .unwrap();
        assert_eq!(r.unwrap(), original);
    }

    #[test]
    fn test_duplicate_fragment_merged() {
        let mut table = ReassemblyTable::new(ReassemblyConfig::default());
        let data = [0xAAu8; 50];
        table
            .on_fragment(1, &header(3, 100, 0, false), &data, 0)
            .unwrap();
        table
            .on_fragment(1, &header(3, 100, 0, false), &data, 0)
            .unwrap();
        assert_eq!(table.stats().duplicates_merged, 1);
        assert_eq!(table.pending(), 1);
    }

    #[test]
    fn test_overrun_rejected() {
        let mut table = ReassemblyTable::new(ReassemblyConfig::default());
        let data = [0u8; 60];
        assert_eq!(
            table.on_fragment(1, &header(3, 100, 50, false), &data, 0),
            Err(FragError::FragmentOverrun)
        );
    }

    #[test]
    fn test_total_mismatch_rejected() {
        let mut table = ReassemblyTable::new(ReassemblyConfig::default());
        table
            .on_fragment(1, &header(3, 100, 0, false), &[0u8; 50], 0)
            .unwrap();
        assert_eq!(
            table.on_fragment(1, &header(3, 200, 50, false), &[0u8; 50], 0),
            Err(FragError::TotalMismatch)
        );
    }

    #[test]
    fn test_last_fragment_must_end_at_total() {
        let mut table = ReassemblyTable::new(ReassemblyConfig::default());
        assert_eq!(
            table.on_fragment(1, &header(3, 100, 0, true), &[0u8; 50], 0),
            Err(FragError::TotalMismatch)
        );
    }

    #[test]
    fn test_oversize_datagram_rejected() {
        let mut table = ReassemblyTable::new(ReassemblyConfig {
            max_datagram_size: 256,
            ..Default::default()
        });
        assert_eq!(
            table.on_fragment(1, &header(3, 1000, 0, false), &[0u8; 10], 0),
            Err(FragError::DatagramTooLarge)
        );
    }

    #[test]
    fn test_reassembly_timeout() {
        let mut table = ReassemblyTable::new(ReassemblyConfig {
            timeout_ms: 1_000,
            ..Default::default()
        });
        table
            .on_fragment(1, &header(3, 100, 0, false), &[0u8; 50], 0)
            .unwrap();
        assert_eq!(table.expire(999), 0);
        assert_eq!(table.expire(1_000), 1);
        assert_eq!(table.pending(), 0);
        assert_eq!(table.stats().transfers_timed_out, 1);
    }

    #[test]
    fn test_full_table_evicts_stalest() {
        let mut table = ReassemblyTable::new(ReassemblyConfig {
            max_transfers: 2,
            ..Default::default()
        });
        table
            .on_fragment(1, &header(1, 100, 0, false), &[0u8; 10], 0)
            .unwrap();
        table
            .on_fragment(1, &header(2, 100, 0, false), &[0u8; 10], 100)
            .unwrap();
        table
            .on_fragment(1, &header(3, 100, 0, false), &[0u8; 10], 200)
            .unwrap();
        assert_eq!(table.pending(), 2);
        assert_eq!(table.stats().transfers_evicted, 1);
        // tag=1 was the stalest; tag=2/3 remain.
        assert!(table.find(1, 1).is_none());
        assert!(table.find(1, 2).is_some());
        assert!(table.find(1, 3).is_some());
    }

    #[test]
    fn test_transfers_separated_by_origin() {
        let mut table = ReassemblyTable::new(ReassemblyConfig::default());
        let a = table
            .on_fragment(1, &header(5, 10, 0, true), &[1u8; 10], 0)
            .unwrap();
        let b = table
            .on_fragment(2, &header(5, 20, 0, false), &[2u8; 10], 0)
            .unwrap();
        assert_eq!(a.unwrap(), vec![1u8; 10]);
        assert!(b.is_none());
    }

    // ========================================================================
    // Fragmenter
    // ========================================================================

    #[test]
    fn test_fragment_reassemble_roundtrip() {
        let fragmenter = Fragmenter::new(100);
        let mut table = ReassemblyTable::new(ReassemblyConfig::default());
        let original: Vec<u8> = (0..=255u8).cycle().take(617).collect();

        let frags = fragmenter.fragment(42, &original).unwrap();
        assert_eq!(frags.len(), 7);
        assert!(frags.last().unwrap().0.is_last);

        let mut result = None;
        for (h, data) in frags {
            result = table.on_fragment(9, &h, &data, 0).unwrap();
        }
        assert_eq!(result.unwrap(), original);
    }

    #[test]
    fn test_fragment_small_payload_single() {
        let fragmenter = Fragmenter::new(100);
        assert!(!fragmenter.needs_fragmentation(100));
        let frags = fragmenter.fragment(1, &[7u8; 80]).unwrap();
        assert_eq!(frags.len(), 1);
        assert!(frags[0].0.is_last);
        assert_eq!(frags[0].0.offset, 0);
    }

    #[test]
    fn test_fragment_empty_payload() {
        let fragmenter = Fragmenter::new(100);
        let frags = fragmenter.fragment(1, &[]).unwrap();
        assert_eq!(frags.len(), 1);
        assert!(frags[0].0.is_last);
        assert_eq!(frags[0].0.total, 0);
        assert!(frags[0].1.is_empty());
    }
}
