// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LBP bootstrap protocol codec.
//!
//! Stateless encode/decode for the network-admission exchange between a
//! joining device (LBD) and the coordinator (LBS). Five message kinds plus
//! the device-side kick:
//!
//! ```text
//! frame = code(1) | extended_address(8, BE) | [media(1)] | payload
//! ```
//!
//! - `Joining`/`Challenge`/`Accepted` carry the media byte and an opaque
//!   authentication payload (EAP-PSK bytes, never interpreted here)
//! - `Decline` carries the media byte and a 1-byte EAP identifier
//! - `Kick*` carry only the header
//!
//! `Accepted`/`Challenge` payloads embed TLV configuration parameters
//! (short address, GMK material, result code); see [`params`]. The wire
//! layout is the one bit-exact external contract of this crate: interop
//! with peer coordinators/devices depends on exact field order and TLV
//! identifiers.

mod decode;
mod encode;
pub mod params;

pub use decode::decode;
pub use encode::{
    encode_accepted, encode_challenge, encode_decline, encode_joining, encode_kick_from_device,
    encode_kick_to_device,
};
pub use params::{decode_params, Gmk, LbpParams, ParamWriter};

use std::fmt;

/// EUI-64 extended device address.
pub type ExtendedAddress = u64;

/// Message codes. Bit 3 set means coordinator-to-device direction.
pub const CODE_JOINING: u8 = 0x01;
pub const CODE_KICK_FROM_DEVICE: u8 = 0x04;
pub const CODE_ACCEPTED: u8 = 0x09;
pub const CODE_CHALLENGE: u8 = 0x0A;
pub const CODE_DECLINE: u8 = 0x0B;
pub const CODE_KICK_TO_DEVICE: u8 = 0x0C;

/// Fixed header: code + extended address.
pub const HEADER_LEN: usize = 9;

/// LBP message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbpMessageType {
    Joining,
    Challenge,
    Accepted,
    Decline,
    KickFromDevice,
    KickToDevice,
}

impl LbpMessageType {
    pub fn code(self) -> u8 {
        match self {
            Self::Joining => CODE_JOINING,
            Self::KickFromDevice => CODE_KICK_FROM_DEVICE,
            Self::Accepted => CODE_ACCEPTED,
            Self::Challenge => CODE_CHALLENGE,
            Self::Decline => CODE_DECLINE,
            Self::KickToDevice => CODE_KICK_TO_DEVICE,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            CODE_JOINING => Some(Self::Joining),
            CODE_KICK_FROM_DEVICE => Some(Self::KickFromDevice),
            CODE_ACCEPTED => Some(Self::Accepted),
            CODE_CHALLENGE => Some(Self::Challenge),
            CODE_DECLINE => Some(Self::Decline),
            CODE_KICK_TO_DEVICE => Some(Self::KickToDevice),
            _ => None,
        }
    }

    /// True for messages carrying the media/flags byte.
    pub fn has_media_byte(self) -> bool {
        matches!(
            self,
            Self::Joining | Self::Challenge | Self::Accepted | Self::Decline
        )
    }
}

/// Physical medium the bootstrap runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Powerline,
    Radio,
}

const MEDIA_RADIO: u8 = 0x01;
const MEDIA_DISABLE_BACKUP: u8 = 0x02;

/// Decoded media/flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaOptions {
    pub media_type: MediaType,
    pub disable_backup_medium: bool,
}

impl MediaOptions {
    pub fn to_byte(self) -> u8 {
        let mut b = match self.media_type {
            MediaType::Powerline => 0,
            MediaType::Radio => MEDIA_RADIO,
        };
        if self.disable_backup_medium {
            b |= MEDIA_DISABLE_BACKUP;
        }
        b
    }

    pub fn from_byte(b: u8) -> Result<Self, LbpError> {
        if b & !(MEDIA_RADIO | MEDIA_DISABLE_BACKUP) != 0 {
            return Err(LbpError::InvalidParameterValue);
        }
        Ok(Self {
            media_type: if b & MEDIA_RADIO != 0 {
                MediaType::Radio
            } else {
                MediaType::Powerline
            },
            disable_backup_medium: b & MEDIA_DISABLE_BACKUP != 0,
        })
    }
}

/// A decoded LBP frame. `payload` borrows from the input buffer and is
/// opaque authentication material except for the TLV parameters of
/// `Accepted`/`Challenge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbpFrame<'a> {
    pub msg_type: LbpMessageType,
    pub device_addr: ExtendedAddress,
    pub media: Option<MediaOptions>,
    /// `Decline` only.
    pub eap_identifier: Option<u8>,
    pub payload: &'a [u8],
}

/// Result code carried in the `Result` TLV. Mirrors the decode error
/// taxonomy one-to-one so an LBS can echo a recipient's decode failure
/// back inside `Accepted`/`Decline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success = 0x00,
    MissingRequiredParameter = 0x01,
    InvalidParameterValue = 0x02,
    UnknownParameterId = 0x03,
}

impl ResultCode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::MissingRequiredParameter),
            0x02 => Some(Self::InvalidParameterValue),
            0x03 => Some(Self::UnknownParameterId),
            _ => None,
        }
    }
}

/// LBP codec errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbpError {
    /// Buffer shorter than the fixed header, or a TLV length overruns it.
    Truncated,
    /// Unrecognized message code.
    UnknownMessageType,
    /// The mandatory-parameter bitmask was incomplete after TLV decode.
    MissingRequiredParameter,
    /// A known TLV carried a wrong length or out-of-range value.
    InvalidParameterValue,
    /// Caller-provided output buffer cannot hold the encoded frame.
    BufferTooSmall,
}

impl fmt::Display for LbpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated LBP frame"),
            Self::UnknownMessageType => write!(f, "unknown LBP message code"),
            Self::MissingRequiredParameter => write!(f, "missing required parameter"),
            Self::InvalidParameterValue => write!(f, "invalid parameter value"),
            Self::BufferTooSmall => write!(f, "output buffer too small"),
        }
    }
}

impl std::error::Error for LbpError {}

impl From<LbpError> for ResultCode {
    fn from(e: LbpError) -> Self {
        match e {
            LbpError::MissingRequiredParameter => Self::MissingRequiredParameter,
            LbpError::InvalidParameterValue => Self::InvalidParameterValue,
            // Truncation and framing failures are reported as invalid value;
            // unknown ids never abort a decode on their own.
            _ => Self::InvalidParameterValue,
        }
    }
}
