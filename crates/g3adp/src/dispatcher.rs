// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Adaptation dispatcher.
//!
//! Ties the components together: stages inbound frames through a FIFO
//! queue backed by the frame pool, classifies them (data / bootstrap /
//! route control), advances route, discovery and reassembly state, and
//! emits events for the layers above. Outbound datagrams are routed,
//! fragmented and queued on a priority queue the MAC layer drains via
//! [`Adp::next_tx`].
//!
//! One `Adp` instance is one node; it is explicitly constructed and owned
//! by the caller, never a global. All mutations must come from a single
//! logical owner (the periodic stack task) and timeouts are driven by
//! the `now_ms` values that task passes in, never by an internal clock.
//!
//! # Frame kinds
//!
//! ```text
//! frame = kind(1) | body
//! kind 0x01 Data   : FragHeader | fragment payload
//! kind 0x02 Lbp    : LBP frame (see lbp module)
//! kind 0x03 Route  : subtype(1) | originator(2) | target(2) | seq(2) | hops(1)
//! ```

use crate::config::AdpConfig;
use crate::error::{AdpError, Result};
use crate::fragment::{FragHeader, Fragmenter, ReassemblyTable, FRAG_HEADER_LEN};
use crate::lbp::{self, ExtendedAddress, LbpMessageType, MediaOptions, MediaType};
use crate::pool::{BufferPool, FrameBuffer};
use crate::qmm::{Position, Queue, QueueMode};
use crate::routing::{
    next_hop, BlacklistTable, DiscoveryTables, RouteDecision, RouteEntry, RouteTable,
    ShortAddress, ADDR_BROADCAST,
};

/// Frame kind tags.
pub const FRAME_KIND_DATA: u8 = 0x01;
pub const FRAME_KIND_LBP: u8 = 0x02;
pub const FRAME_KIND_ROUTE: u8 = 0x03;

/// Priority for control traffic (route discovery, bootstrap replies).
pub const PRIO_CONTROL: u8 = 0;

const ROUTE_CONTROL_LEN: usize = 8;

/// Route-control subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteControlKind {
    /// Route request, flooded toward the target.
    Request,
    /// Route reply, unicast back to the originator.
    Reply,
    /// Route error, reported by a node that lost its next hop.
    Error,
}

impl RouteControlKind {
    fn code(self) -> u8 {
        match self {
            Self::Request => 0x01,
            Self::Reply => 0x02,
            Self::Error => 0x03,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::Reply),
            0x03 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Route-control frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteControl {
    pub kind: RouteControlKind,
    pub originator: ShortAddress,
    pub target: ShortAddress,
    pub seq_no: u16,
    pub hop_count: u8,
}

impl RouteControl {
    fn encode(&self, buf: &mut [u8]) -> usize {
        debug_assert!(buf.len() >= ROUTE_CONTROL_LEN);
        buf[0] = self.kind.code();
        buf[1..3].copy_from_slice(&self.originator.to_be_bytes());
        buf[3..5].copy_from_slice(&self.target.to_be_bytes());
        buf[5..7].copy_from_slice(&self.seq_no.to_be_bytes());
        buf[7] = self.hop_count;
        ROUTE_CONTROL_LEN
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ROUTE_CONTROL_LEN {
            return Err(AdpError::TruncatedFrame);
        }
        Ok(Self {
            kind: RouteControlKind::from_code(buf[0])
                .ok_or(AdpError::UnknownFrameKind(buf[0]))?,
            originator: u16::from_be_bytes([buf[1], buf[2]]),
            target: u16::from_be_bytes([buf[3], buf[4]]),
            seq_no: u16::from_be_bytes([buf[5], buf[6]]),
            hop_count: buf[7],
        })
    }

    fn to_frame(self) -> Vec<u8> {
        let mut frame = vec![0u8; 1 + ROUTE_CONTROL_LEN];
        frame[0] = FRAME_KIND_ROUTE;
        self.encode(&mut frame[1..]);
        frame
    }
}

/// Events handed to the layers above the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdpEvent {
    /// A fragmented datagram completed reassembly.
    DatagramReady {
        origin: ShortAddress,
        data: Vec<u8>,
    },
    /// A well-formed bootstrap frame arrived.
    LbpIndication {
        msg_type: LbpMessageType,
        device_addr: ExtendedAddress,
        media: Option<MediaOptions>,
        eap_identifier: Option<u8>,
        payload: Vec<u8>,
    },
    /// A route discovery this node originated resolved.
    RouteEstablished {
        destination: ShortAddress,
        next_hop: ShortAddress,
        hop_count: u8,
    },
    /// A neighbor reported a broken route.
    RouteError {
        reporter: ShortAddress,
        destination: ShortAddress,
    },
    /// A `Decline` was queued in response to a malformed bootstrap frame.
    DeclineQueued { device_addr: ExtendedAddress },
}

/// Dispatcher counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdpStats {
    pub frames_rx: u64,
    pub frames_rx_dropped: u64,
    pub frames_tx_queued: u64,
    pub frames_tx_dropped: u64,
    pub datagrams_queued: u64,
    pub datagrams_reassembled: u64,
    pub lbp_rx: u64,
    pub lbp_decode_errors: u64,
    pub declines_queued: u64,
    pub route_rx: u64,
    pub requests_relayed: u64,
    pub replies_relayed: u64,
    pub frame_errors: u64,
}

#[derive(Debug)]
struct OutboundFrame {
    dest: ShortAddress,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct InboundFrame {
    source: ShortAddress,
    buffer: FrameBuffer,
}

/// The adaptation layer for one mesh node.
#[derive(Debug)]
pub struct Adp {
    cfg: AdpConfig,
    tx: Queue<OutboundFrame>,
    rx: Queue<InboundFrame>,
    pool: BufferPool,
    routes: RouteTable,
    blacklist: BlacklistTable,
    discovery: DiscoveryTables,
    reassembly: ReassemblyTable,
    fragmenter: Fragmenter,
    /// Discoveries this node originated: `(target, seq_no)`.
    active_discoveries: Vec<(ShortAddress, u16)>,
    next_tag: u16,
    next_seq: u16,
    stats: AdpStats,
}

impl Adp {
    pub fn new(cfg: AdpConfig) -> Self {
        Self {
            tx: Queue::new(cfg.tx_queue_capacity, QueueMode::Priority),
            rx: Queue::new(cfg.rx_queue_capacity, QueueMode::Fifo),
            pool: BufferPool::new(&cfg.pool),
            routes: RouteTable::new(cfg.route_table_size),
            blacklist: BlacklistTable::new(cfg.blacklist_size),
            discovery: DiscoveryTables::new(
                cfg.pending_request_size,
                cfg.reply_generation_size,
                cfg.request_forward_size,
                cfg.discovery_size,
                cfg.discovery_timeout_ms,
            ),
            reassembly: ReassemblyTable::new(cfg.reassembly.clone()),
            fragmenter: Fragmenter::new(cfg.fragment_size),
            active_discoveries: Vec::new(),
            next_tag: 0,
            next_seq: 0,
            stats: AdpStats::default(),
            cfg,
        }
    }

    pub fn stats(&self) -> AdpStats {
        self.stats
    }

    pub fn short_address(&self) -> ShortAddress {
        self.cfg.short_address
    }

    /// Route decision for a destination, honoring the blacklist.
    pub fn route_decision(&self, destination: ShortAddress, now_ms: u64) -> RouteDecision {
        next_hop(&self.routes, &self.blacklist, destination, now_ms)
    }

    /// Mark a neighbor unreachable for the configured blacklist TTL.
    pub fn blacklist_neighbor(&mut self, neighbor: ShortAddress, now_ms: u64) -> Result<()> {
        self.blacklist
            .mark(neighbor, self.cfg.blacklist_ttl_ms, now_ms)?;
        Ok(())
    }

    /// Seed or refresh a route directly (e.g. from a neighbor beacon).
    pub fn learn_route(
        &mut self,
        destination: ShortAddress,
        via: ShortAddress,
        hop_count: u8,
        now_ms: u64,
    ) -> Result<()> {
        self.routes.insert_or_refresh(
            RouteEntry::new(destination, via, hop_count, self.next_seq),
            self.cfg.route_ttl_ms,
            now_ms,
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Outbound path
    // ------------------------------------------------------------------

    /// Queue a datagram for transmission.
    ///
    /// The payload is fragmented when it exceeds the configured fragment
    /// size; each fragment becomes one TX frame at the given priority
    /// (lower value = sooner). With no live route the call starts a
    /// discovery and reports `NoRoute`; the caller retries once
    /// [`AdpEvent::RouteEstablished`] arrives.
    pub fn queue_tx(
        &mut self,
        destination: ShortAddress,
        payload: &[u8],
        priority: u8,
        now_ms: u64,
    ) -> Result<()> {
        let hop = match self.route_decision(destination, now_ms) {
            RouteDecision::Forward(hop) => hop,
            RouteDecision::Blacklisted => return Err(AdpError::Blacklisted),
            RouteDecision::NoRoute => {
                self.start_discovery(destination, now_ms);
                return Err(AdpError::NoRoute);
            }
        };

        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        let fragments = self.fragmenter.fragment(tag, payload)?;

        // All-or-nothing: a datagram with some fragments dropped is
        // useless, so reject up front instead of enqueueing a torso.
        let room = (self.tx.capacity() as usize).saturating_sub(self.tx.len());
        if fragments.len() > room {
            self.stats.frames_tx_dropped += fragments.len() as u64;
            return Err(AdpError::Qmm(crate::qmm::QmmError::QueueFull));
        }

        for (header, chunk) in fragments {
            let mut bytes = vec![0u8; 1 + FRAG_HEADER_LEN + chunk.len()];
            bytes[0] = FRAME_KIND_DATA;
            header
                .encode(&mut bytes[1..1 + FRAG_HEADER_LEN])
                .map_err(AdpError::Frag)?;
            bytes[1 + FRAG_HEADER_LEN..].copy_from_slice(&chunk);
            self.tx
                .append_with_priority(priority, OutboundFrame { dest: hop, bytes })?;
            self.stats.frames_tx_queued += 1;
        }
        self.stats.datagrams_queued += 1;
        Ok(())
    }

    /// Queue an already-encoded LBP frame (from the codec) to a peer.
    pub fn queue_lbp(&mut self, destination: ShortAddress, encoded: &[u8]) -> Result<()> {
        let mut bytes = vec![0u8; 1 + encoded.len()];
        bytes[0] = FRAME_KIND_LBP;
        bytes[1..].copy_from_slice(encoded);
        self.tx.append_with_priority(
            PRIO_CONTROL,
            OutboundFrame {
                dest: destination,
                bytes,
            },
        )?;
        self.stats.frames_tx_queued += 1;
        Ok(())
    }

    /// Next `(destination, frame)` for the MAC layer, highest priority
    /// first.
    pub fn next_tx(&mut self) -> Option<(ShortAddress, Vec<u8>)> {
        let frame = self.tx.pop(Position::Head).ok()?;
        Some((frame.dest, frame.bytes))
    }

    /// Number of frames waiting for transmission.
    pub fn tx_pending(&self) -> usize {
        self.tx.len()
    }

    fn start_discovery(&mut self, destination: ShortAddress, now_ms: u64) {
        let originator = self.cfg.short_address;
        let already = self
            .active_discoveries
            .iter()
            .any(|&(dest, seq)| dest == destination && self.discovery.is_pending(originator, seq));
        if already {
            return;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        if !self.discovery.begin(originator, seq, now_ms) {
            return;
        }
        self.active_discoveries.push((destination, seq));
        let request = RouteControl {
            kind: RouteControlKind::Request,
            originator,
            target: destination,
            seq_no: seq,
            hop_count: 0,
        };
        log::debug!(
            "[adp] route discovery start target=0x{:04x} seq={}",
            destination,
            seq
        );
        if self
            .tx
            .append_with_priority(
                PRIO_CONTROL,
                OutboundFrame {
                    dest: ADDR_BROADCAST,
                    bytes: request.to_frame(),
                },
            )
            .is_err()
        {
            // TX congestion; the pending entry times out on its own.
            self.stats.frames_tx_dropped += 1;
        }
    }

    // ------------------------------------------------------------------
    // Inbound path
    // ------------------------------------------------------------------

    /// Stage a frame received from the MAC layer.
    ///
    /// The frame is copied into a pool buffer and held on the RX queue
    /// until [`Adp::process`] runs. Pool exhaustion and a full RX queue
    /// are backpressure: the frame is dropped and reported.
    pub fn on_frame(&mut self, source: ShortAddress, bytes: &[u8], _now_ms: u64) -> Result<()> {
        self.stats.frames_rx += 1;
        // Check the queue before touching the pool: a failed append would
        // consume the buffer and leak its class budget.
        if self.rx.len() >= self.rx.capacity() as usize {
            self.stats.frames_rx_dropped += 1;
            return Err(AdpError::Qmm(crate::qmm::QmmError::QueueFull));
        }
        let Some(mut buffer) = self.pool.acquire(bytes.len()) else {
            self.stats.frames_rx_dropped += 1;
            return Err(AdpError::PoolExhausted);
        };
        buffer.data.extend_from_slice(bytes);
        self.rx.append(InboundFrame { source, buffer })?;
        Ok(())
    }

    /// Drain the RX queue, advancing all table state. Per-frame errors are
    /// counted, possibly answered (bootstrap declines), and never abort
    /// the batch.
    pub fn process(&mut self, now_ms: u64) -> Vec<AdpEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.pop(Position::Head) {
            let InboundFrame { source, buffer } = frame;
            if let Err(e) = self.handle_frame(source, &buffer.data, now_ms, &mut events) {
                self.stats.frame_errors += 1;
                log::debug!("[adp] frame from 0x{:04x} rejected: {}", source, e);
            }
            self.pool.release(buffer);
        }
        events
    }

    fn handle_frame(
        &mut self,
        source: ShortAddress,
        bytes: &[u8],
        now_ms: u64,
        events: &mut Vec<AdpEvent>,
    ) -> Result<()> {
        let (&kind, body) = bytes.split_first().ok_or(AdpError::TruncatedFrame)?;
        match kind {
            FRAME_KIND_DATA => self.handle_data(source, body, now_ms, events),
            FRAME_KIND_LBP => self.handle_lbp(source, body, events),
            FRAME_KIND_ROUTE => self.handle_route(source, body, now_ms, events),
            other => Err(AdpError::UnknownFrameKind(other)),
        }
    }

    fn handle_data(
        &mut self,
        source: ShortAddress,
        body: &[u8],
        now_ms: u64,
        events: &mut Vec<AdpEvent>,
    ) -> Result<()> {
        let (header, consumed) = FragHeader::decode(body)?;
        let payload = &body[consumed..];

        // Valid traffic keeps the sender's route alive.
        self.routes.refresh(source, self.cfg.route_ttl_ms, now_ms);

        if let Some(data) = self
            .reassembly
            .on_fragment(source, &header, payload, now_ms)?
        {
            self.stats.datagrams_reassembled += 1;
            events.push(AdpEvent::DatagramReady {
                origin: source,
                data,
            });
        }
        Ok(())
    }

    fn handle_lbp(
        &mut self,
        source: ShortAddress,
        body: &[u8],
        events: &mut Vec<AdpEvent>,
    ) -> Result<()> {
        match lbp::decode(body) {
            Ok(frame) => {
                self.stats.lbp_rx += 1;
                events.push(AdpEvent::LbpIndication {
                    msg_type: frame.msg_type,
                    device_addr: frame.device_addr,
                    media: frame.media,
                    eap_identifier: frame.eap_identifier,
                    payload: frame.payload.to_vec(),
                });
                Ok(())
            }
            Err(e) => {
                self.stats.lbp_decode_errors += 1;
                // Policy: answer malformed bootstrap traffic with a Decline
                // when the device address survived, drop silently otherwise.
                if self.cfg.decline_on_decode_error && body.len() >= lbp::HEADER_LEN {
                    let device_addr = u64::from_be_bytes([
                        body[1], body[2], body[3], body[4], body[5], body[6], body[7], body[8],
                    ]);
                    let mut buf = [0u8; 16];
                    let n = lbp::encode_decline(
                        &mut buf,
                        device_addr,
                        MediaType::Powerline,
                        false,
                        0,
                    )?;
                    self.queue_lbp(source, &buf[..n])?;
                    self.stats.declines_queued += 1;
                    events.push(AdpEvent::DeclineQueued { device_addr });
                }
                Err(e.into())
            }
        }
    }

    fn handle_route(
        &mut self,
        source: ShortAddress,
        body: &[u8],
        now_ms: u64,
        events: &mut Vec<AdpEvent>,
    ) -> Result<()> {
        let control = RouteControl::decode(body)?;
        self.stats.route_rx += 1;
        match control.kind {
            RouteControlKind::Request => self.handle_route_request(source, control, now_ms),
            RouteControlKind::Reply => self.handle_route_reply(source, control, now_ms, events),
            RouteControlKind::Error => {
                // The reporter lost its next hop toward the target: stop
                // using it and forget the route.
                self.blacklist
                    .mark(source, self.cfg.blacklist_ttl_ms, now_ms)?;
                self.routes.invalidate(control.target);
                events.push(AdpEvent::RouteError {
                    reporter: source,
                    destination: control.target,
                });
                Ok(())
            }
        }
    }

    fn handle_route_request(
        &mut self,
        source: ShortAddress,
        request: RouteControl,
        now_ms: u64,
    ) -> Result<()> {
        // Learn/refresh the reverse route toward the originator; replies
        // travel back along it.
        self.routes.insert_or_refresh(
            RouteEntry::new(
                request.originator,
                source,
                request.hop_count.saturating_add(1),
                request.seq_no,
            ),
            self.cfg.route_ttl_ms,
            now_ms,
        )?;

        if request.target == self.cfg.short_address {
            // We are the target: owe the originator a reply, once per
            // discovery no matter how many flood copies arrive.
            if self
                .discovery
                .note_request_seen(request.originator, request.seq_no, now_ms)
                && self
                    .discovery
                    .note_reply_owed(request.originator, request.seq_no, now_ms)
            {
                let reply = RouteControl {
                    kind: RouteControlKind::Reply,
                    originator: request.originator,
                    target: self.cfg.short_address,
                    seq_no: request.seq_no,
                    hop_count: 0,
                };
                self.tx.append_with_priority(
                    PRIO_CONTROL,
                    OutboundFrame {
                        dest: source,
                        bytes: reply.to_frame(),
                    },
                )?;
                self.discovery.reply_sent(request.originator, request.seq_no);
            }
            return Ok(());
        }

        // Relay the flood, once per (originator, seq) and within the hop
        // budget.
        let hops = request.hop_count.saturating_add(1);
        if hops > self.cfg.max_hops {
            log::debug!(
                "[adp] dropping route request originator=0x{:04x} seq={} (hop limit)",
                request.originator,
                request.seq_no
            );
            return Ok(());
        }
        if self
            .discovery
            .note_forwarded(request.originator, request.seq_no, now_ms)
        {
            let relay = RouteControl {
                hop_count: hops,
                ..request
            };
            self.tx.append_with_priority(
                PRIO_CONTROL,
                OutboundFrame {
                    dest: ADDR_BROADCAST,
                    bytes: relay.to_frame(),
                },
            )?;
            self.stats.requests_relayed += 1;
        }
        Ok(())
    }

    fn handle_route_reply(
        &mut self,
        source: ShortAddress,
        reply: RouteControl,
        now_ms: u64,
        events: &mut Vec<AdpEvent>,
    ) -> Result<()> {
        let hops = reply.hop_count.saturating_add(1);
        // Forward route to the reply's target (the discovered node).
        self.routes.insert_or_refresh(
            RouteEntry::new(reply.target, source, hops, reply.seq_no),
            self.cfg.route_ttl_ms,
            now_ms,
        )?;

        if reply.originator == self.cfg.short_address {
            if self.discovery.route_found(reply.originator, reply.seq_no) {
                self.active_discoveries
                    .retain(|&(_, seq)| seq != reply.seq_no);
                events.push(AdpEvent::RouteEstablished {
                    destination: reply.target,
                    next_hop: source,
                    hop_count: hops,
                });
            }
            return Ok(());
        }

        // Relay toward the originator along the reverse route learned
        // while the request flooded through.
        if self.discovery.is_forwarding(reply.originator, reply.seq_no) {
            let Some(entry) = self.routes.lookup(reply.originator, now_ms) else {
                log::debug!(
                    "[adp] dropping route reply originator=0x{:04x}: reverse route lost",
                    reply.originator
                );
                return Ok(());
            };
            let via = entry.next_hop;
            let relay = RouteControl {
                hop_count: hops,
                ..reply
            };
            self.tx.append_with_priority(
                PRIO_CONTROL,
                OutboundFrame {
                    dest: via,
                    bytes: relay.to_frame(),
                },
            )?;
            self.discovery.reply_relayed(reply.originator, reply.seq_no);
            self.stats.replies_relayed += 1;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Periodic maintenance: expire all tables and purge stale transfers.
    pub fn tick(&mut self, now_ms: u64) {
        self.routes.expire(now_ms);
        self.blacklist.expire(now_ms);
        self.discovery.expire(now_ms);
        self.reassembly.expire(now_ms);
        let originator = self.cfg.short_address;
        let discovery = &self.discovery;
        self.active_discoveries
            .retain(|&(_, seq)| discovery.is_pending(originator, seq));
    }
}
