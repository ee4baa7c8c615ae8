// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-level error type.
//!
//! Each component keeps its own error enum (`QmmError`, `TableError`,
//! `FragError`, `LbpError`); `AdpError` wraps them at the dispatcher
//! boundary so callers see one result type. All variants are recoverable
//! from the caller's point of view; the usual reaction is to drop the
//! frame or retry later.

use std::fmt;

use crate::fragment::FragError;
use crate::lbp::LbpError;
use crate::qmm::QmmError;
use crate::routing::TableError;

/// Result alias for dispatcher operations.
pub type Result<T> = std::result::Result<T, AdpError>;

/// Adaptation layer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdpError {
    /// Queue manager failure (full/empty/mode).
    Qmm(QmmError),
    /// Bounded table rejected an insertion.
    Table(TableError),
    /// Fragmentation/reassembly failure.
    Frag(FragError),
    /// Bootstrap codec failure.
    Lbp(LbpError),
    /// No live route to the destination; discovery was started.
    NoRoute,
    /// The route's next hop is currently blacklisted.
    Blacklisted,
    /// Inbound frame with an unrecognized kind tag.
    UnknownFrameKind(u8),
    /// Inbound frame too short for its declared kind.
    TruncatedFrame,
    /// No frame buffer available for the inbound frame.
    PoolExhausted,
}

impl fmt::Display for AdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qmm(e) => write!(f, "queue error: {e}"),
            Self::Table(e) => write!(f, "table error: {e}"),
            Self::Frag(e) => write!(f, "fragment error: {e}"),
            Self::Lbp(e) => write!(f, "bootstrap error: {e}"),
            Self::NoRoute => write!(f, "no route to destination"),
            Self::Blacklisted => write!(f, "next hop is blacklisted"),
            Self::UnknownFrameKind(k) => write!(f, "unknown frame kind 0x{k:02x}"),
            Self::TruncatedFrame => write!(f, "truncated frame"),
            Self::PoolExhausted => write!(f, "frame buffer pool exhausted"),
        }
    }
}

impl std::error::Error for AdpError {}

impl From<QmmError> for AdpError {
    fn from(e: QmmError) -> Self {
        Self::Qmm(e)
    }
}

impl From<TableError> for AdpError {
    fn from(e: TableError) -> Self {
        Self::Table(e)
    }
}

impl From<FragError> for AdpError {
    fn from(e: FragError) -> Self {
        Self::Frag(e)
    }
}

impl From<LbpError> for AdpError {
    fn from(e: LbpError) -> Self {
        Self::Lbp(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapping_and_display() {
        let e: AdpError = QmmError::QueueFull.into();
        assert_eq!(e, AdpError::Qmm(QmmError::QueueFull));
        assert_eq!(e.to_string(), "queue error: queue full");

        let e: AdpError = LbpError::Truncated.into();
        assert_eq!(e.to_string(), "bootstrap error: truncated LBP frame");
    }
}
