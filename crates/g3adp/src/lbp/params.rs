// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration parameter TLVs embedded in `Accepted`/`Challenge`
//! payloads.
//!
//! Each parameter is `id(1) | len(1) | value(len)` with a fixed length per
//! identifier. Decode walks the list, accumulating a bitmask of the
//! mandatory parameters seen; unknown identifiers are skipped and recorded
//! without aborting the remaining known TLVs.

use super::{LbpError, ResultCode};

/// TLV identifiers.
pub const PARAM_SHORT_ADDRESS: u8 = 0x1D;
pub const PARAM_GMK: u8 = 0x27;
pub const PARAM_GMK_ACTIVATION: u8 = 0x2B;
pub const PARAM_GMK_REMOVAL: u8 = 0x2F;
pub const PARAM_RESULT: u8 = 0x31;

const LEN_SHORT_ADDRESS: usize = 2;
const LEN_GMK: usize = 17; // key index + 16 key bytes
const LEN_GMK_ACTIVATION: usize = 1;
const LEN_GMK_REMOVAL: usize = 1;
const LEN_RESULT: usize = 1;

/// Presence bitmask bits.
pub const MASK_SHORT_ADDRESS: u8 = 1 << 0;
pub const MASK_GMK: u8 = 1 << 1;
pub const MASK_GMK_ACTIVATION: u8 = 1 << 2;
pub const MASK_GMK_REMOVAL: u8 = 1 << 3;
pub const MASK_RESULT: u8 = 1 << 4;

/// Mandatory set for an `Accepted` that admits the device: it must assign
/// a short address and deliver the group master key.
pub const MANDATORY_ACCEPTED: u8 = MASK_SHORT_ADDRESS | MASK_GMK;

/// `Challenge` parameters are all optional.
pub const MANDATORY_CHALLENGE: u8 = 0;

/// Group master key material. Opaque to this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gmk {
    pub key_index: u8,
    pub key: [u8; 16],
}

/// Decoded parameter set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LbpParams {
    pub short_address: Option<u16>,
    pub gmk: Option<Gmk>,
    pub gmk_activation: Option<u8>,
    pub gmk_removal: Option<u8>,
    pub result: Option<ResultCode>,
    /// Identifiers that were skipped as unknown, in order of appearance.
    pub unknown_ids: Vec<u8>,
}

impl LbpParams {
    /// Bitmask of the known parameters present.
    pub fn present_mask(&self) -> u8 {
        let mut mask = 0;
        if self.short_address.is_some() {
            mask |= MASK_SHORT_ADDRESS;
        }
        if self.gmk.is_some() {
            mask |= MASK_GMK;
        }
        if self.gmk_activation.is_some() {
            mask |= MASK_GMK_ACTIVATION;
        }
        if self.gmk_removal.is_some() {
            mask |= MASK_GMK_REMOVAL;
        }
        if self.result.is_some() {
            mask |= MASK_RESULT;
        }
        mask
    }
}

/// Decode a TLV parameter list.
///
/// `mandatory` is the bitmask the final presence set must cover (see
/// [`MANDATORY_ACCEPTED`]). Unknown identifiers are skipped, not fatal.
///
/// # Errors
/// - `Truncated` when a TLV header or declared value overruns the buffer
/// - `InvalidParameterValue` when a known id carries the wrong length or
///   an out-of-range value
/// - `MissingRequiredParameter` when the mandatory set is incomplete
pub fn decode_params(buf: &[u8], mandatory: u8) -> Result<LbpParams, LbpError> {
    let mut params = LbpParams::default();
    let mut seen = 0u8;
    let mut offset = 0usize;

    while offset < buf.len() {
        if offset + 2 > buf.len() {
            return Err(LbpError::Truncated);
        }
        let id = buf[offset];
        let len = buf[offset + 1] as usize;
        offset += 2;
        if offset + len > buf.len() {
            return Err(LbpError::Truncated);
        }
        let value = &buf[offset..offset + len];
        offset += len;

        match id {
            PARAM_SHORT_ADDRESS => {
                if len != LEN_SHORT_ADDRESS {
                    return Err(LbpError::InvalidParameterValue);
                }
                params.short_address = Some(u16::from_be_bytes([value[0], value[1]]));
                seen |= MASK_SHORT_ADDRESS;
            }
            PARAM_GMK => {
                if len != LEN_GMK {
                    return Err(LbpError::InvalidParameterValue);
                }
                let mut key = [0u8; 16];
                key.copy_from_slice(&value[1..]);
                params.gmk = Some(Gmk {
                    key_index: value[0],
                    key,
                });
                seen |= MASK_GMK;
            }
            PARAM_GMK_ACTIVATION => {
                if len != LEN_GMK_ACTIVATION {
                    return Err(LbpError::InvalidParameterValue);
                }
                params.gmk_activation = Some(value[0]);
                seen |= MASK_GMK_ACTIVATION;
            }
            PARAM_GMK_REMOVAL => {
                if len != LEN_GMK_REMOVAL {
                    return Err(LbpError::InvalidParameterValue);
                }
                params.gmk_removal = Some(value[0]);
                seen |= MASK_GMK_REMOVAL;
            }
            PARAM_RESULT => {
                if len != LEN_RESULT {
                    return Err(LbpError::InvalidParameterValue);
                }
                params.result =
                    Some(ResultCode::from_byte(value[0]).ok_or(LbpError::InvalidParameterValue)?);
                seen |= MASK_RESULT;
            }
            other => {
                log::debug!("[lbp] skipping unknown parameter id=0x{:02x}", other);
                params.unknown_ids.push(other);
            }
        }
    }

    if seen & mandatory != mandatory {
        return Err(LbpError::MissingRequiredParameter);
    }
    Ok(params)
}

/// Appends TLV parameters into a caller-provided buffer.
#[derive(Debug)]
pub struct ParamWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> ParamWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Bytes written so far.
    pub fn finish(self) -> usize {
        self.len
    }

    pub fn short_address(&mut self, addr: u16) -> Result<&mut Self, LbpError> {
        self.put(PARAM_SHORT_ADDRESS, &addr.to_be_bytes())
    }

    pub fn gmk(&mut self, gmk: &Gmk) -> Result<&mut Self, LbpError> {
        let mut value = [0u8; LEN_GMK];
        value[0] = gmk.key_index;
        value[1..].copy_from_slice(&gmk.key);
        self.put(PARAM_GMK, &value)
    }

    pub fn gmk_activation(&mut self, key_index: u8) -> Result<&mut Self, LbpError> {
        self.put(PARAM_GMK_ACTIVATION, &[key_index])
    }

    pub fn gmk_removal(&mut self, key_index: u8) -> Result<&mut Self, LbpError> {
        self.put(PARAM_GMK_REMOVAL, &[key_index])
    }

    pub fn result(&mut self, code: ResultCode) -> Result<&mut Self, LbpError> {
        self.put(PARAM_RESULT, &[code as u8])
    }

    fn put(&mut self, id: u8, value: &[u8]) -> Result<&mut Self, LbpError> {
        let needed = 2 + value.len();
        if self.buf.len() < self.len + needed {
            return Err(LbpError::BufferTooSmall);
        }
        self.buf[self.len] = id;
        self.buf[self.len + 1] = value.len() as u8;
        self.buf[self.len + 2..self.len + needed].copy_from_slice(value);
        self.len += needed;
        Ok(self)
    }
}
