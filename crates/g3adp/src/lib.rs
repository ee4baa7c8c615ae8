// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # g3adp - Mesh Adaptation Layer for PLC Smart-Grid Networks
//!
//! The adaptation layer that sits between 6LoWPAN-style applications and a
//! low-bandwidth mesh MAC (powerline or sub-GHz radio): datagram
//! fragmentation and reassembly, LOADng route discovery with blacklist
//! handling, bounded frame queues, and the LBP network-admission codec.
//!
//! ## Design Constraints
//!
//! - **Deterministic memory**: every table, queue, and buffer pool is
//!   fixed-capacity; saturation is backpressure, never allocation
//! - **No internal clock**: all expiry is driven by caller-supplied
//!   monotonic `now_ms` values, so the whole layer is testable without
//!   sleeping
//! - **Single owner**: one logical task drives each [`Adp`]; nothing is
//!   synchronized internally
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------+
//! |  Application (datagrams, bootstrap)     |
//! +-----------------------------------------+
//!           v                    ^
//! +-----------------------------------------+
//! |  Adp dispatcher (events, routing)       |
//! +-----------------------------------------+
//!     v         v          v          v
//! +-------+ +--------+ +--------+ +-------+
//! | QMM   | | Routes | | Frag   | | LBP   |
//! | queues| | tables | | reasm  | | codec |
//! +-------+ +--------+ +--------+ +-------+
//!           v                    ^
//! +-----------------------------------------+
//! |  Mesh MAC (PLC PHY / RF PHY)            |
//! +-----------------------------------------+
//! ```
//!
//! ## Usage
//!
//! ```
//! use g3adp::{Adp, AdpConfig, AdpEvent};
//!
//! let mut adp = Adp::new(AdpConfig::default().with_short_address(0x0001));
//!
//! // Frames from the MAC go in; completed datagrams come out as events.
//! adp.on_frame(0x0002, &[0x01, 0, 7, 0, 5, 0, 0, 0x01, 1, 2, 3, 4, 5], 0)
//!     .unwrap();
//! for event in adp.process(0) {
//!     if let AdpEvent::DatagramReady { origin, data } = event {
//!         println!("datagram from 0x{origin:04x}: {data:?}");
//!     }
//! }
//! ```

#![deny(unsafe_code)]

/// Adaptation layer configuration (table sizes, TTLs, queue capacities)
pub mod config;

/// Dispatcher tying queues, tables, reassembly, and the LBP codec together
pub mod dispatcher;

/// Crate-level error type
pub mod error;

/// Datagram fragmentation and reassembly
pub mod fragment;

/// LBP bootstrap protocol codec
pub mod lbp;

/// Size-class frame buffer pool
pub mod pool;

/// Queue Management Module (bounded FIFO/priority queues)
pub mod qmm;

/// Route, blacklist, and route-discovery tables
pub mod routing;

// Re-exports for convenience
pub use crate::config::AdpConfig;
pub use crate::dispatcher::{Adp, AdpEvent, AdpStats};
pub use crate::error::{AdpError, Result};
pub use crate::fragment::{FragHeader, Fragmenter, ReassemblyConfig, ReassemblyTable};
pub use crate::qmm::{ElementId, Queue, QueueMode};
pub use crate::routing::{RouteDecision, ShortAddress, ADDR_BROADCAST};

/// Version of g3adp
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
