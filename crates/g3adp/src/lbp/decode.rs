// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LBP frame decoder.

use super::{LbpError, LbpFrame, LbpMessageType, MediaOptions, HEADER_LEN};

/// Decode one LBP frame.
///
/// # Errors
/// - `Truncated` if the buffer is shorter than the fixed header, or a
///   `Decline` is missing its EAP identifier
/// - `UnknownMessageType` for an unrecognized code
/// - `InvalidParameterValue` for reserved media-flag bits
///
/// The opaque payload of `Joining`/`Challenge`/`Accepted` is returned
/// as-is; embedded TLVs are decoded separately via
/// [`super::params::decode_params`].
pub fn decode(buf: &[u8]) -> Result<LbpFrame<'_>, LbpError> {
    if buf.len() < HEADER_LEN {
        return Err(LbpError::Truncated);
    }
    let msg_type = LbpMessageType::from_code(buf[0]).ok_or(LbpError::UnknownMessageType)?;
    let device_addr = u64::from_be_bytes([
        buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8],
    ]);

    if !msg_type.has_media_byte() {
        // Kick frames end at the header; trailing bytes are ignored.
        return Ok(LbpFrame {
            msg_type,
            device_addr,
            media: None,
            eap_identifier: None,
            payload: &[],
        });
    }

    if buf.len() < HEADER_LEN + 1 {
        return Err(LbpError::Truncated);
    }
    let media = MediaOptions::from_byte(buf[HEADER_LEN])?;
    let rest = &buf[HEADER_LEN + 1..];

    if msg_type == LbpMessageType::Decline {
        let Some(&eap_identifier) = rest.first() else {
            return Err(LbpError::Truncated);
        };
        return Ok(LbpFrame {
            msg_type,
            device_addr,
            media: Some(media),
            eap_identifier: Some(eap_identifier),
            payload: &[],
        });
    }

    Ok(LbpFrame {
        msg_type,
        device_addr,
        media: Some(media),
        eap_identifier: None,
        payload: rest,
    })
}
