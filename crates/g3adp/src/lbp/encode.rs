// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LBP frame encoders.
//!
//! All encoders write into a caller-provided buffer and return the number
//! of bytes written, failing only with `BufferTooSmall`. The caller owns
//! buffer placement (frame pool), this module never allocates.

use super::{ExtendedAddress, LbpError, MediaOptions, MediaType, HEADER_LEN};
use super::{
    CODE_ACCEPTED, CODE_CHALLENGE, CODE_DECLINE, CODE_JOINING, CODE_KICK_FROM_DEVICE,
    CODE_KICK_TO_DEVICE,
};

fn put_header(buf: &mut [u8], code: u8, device_addr: ExtendedAddress) -> Result<usize, LbpError> {
    if buf.len() < HEADER_LEN {
        return Err(LbpError::BufferTooSmall);
    }
    buf[0] = code;
    buf[1..9].copy_from_slice(&device_addr.to_be_bytes());
    Ok(HEADER_LEN)
}

fn put_media_and_payload(
    buf: &mut [u8],
    mut offset: usize,
    media_type: MediaType,
    disable_backup_medium: bool,
    payload: &[u8],
) -> Result<usize, LbpError> {
    if buf.len() < offset + 1 + payload.len() {
        return Err(LbpError::BufferTooSmall);
    }
    buf[offset] = MediaOptions {
        media_type,
        disable_backup_medium,
    }
    .to_byte();
    offset += 1;
    buf[offset..offset + payload.len()].copy_from_slice(payload);
    Ok(offset + payload.len())
}

/// Encode a `Joining` request (device -> coordinator).
pub fn encode_joining(
    buf: &mut [u8],
    device_addr: ExtendedAddress,
    media_type: MediaType,
    disable_backup_medium: bool,
    payload: &[u8],
) -> Result<usize, LbpError> {
    let offset = put_header(buf, CODE_JOINING, device_addr)?;
    put_media_and_payload(buf, offset, media_type, disable_backup_medium, payload)
}

/// Encode a `Challenge` (coordinator -> device, carries the EAP exchange).
pub fn encode_challenge(
    buf: &mut [u8],
    device_addr: ExtendedAddress,
    media_type: MediaType,
    disable_backup_medium: bool,
    payload: &[u8],
) -> Result<usize, LbpError> {
    let offset = put_header(buf, CODE_CHALLENGE, device_addr)?;
    put_media_and_payload(buf, offset, media_type, disable_backup_medium, payload)
}

/// Encode an `Accepted` (coordinator -> device; payload embeds the
/// configuration TLVs, see [`super::params::ParamWriter`]).
pub fn encode_accepted(
    buf: &mut [u8],
    device_addr: ExtendedAddress,
    media_type: MediaType,
    disable_backup_medium: bool,
    payload: &[u8],
) -> Result<usize, LbpError> {
    let offset = put_header(buf, CODE_ACCEPTED, device_addr)?;
    put_media_and_payload(buf, offset, media_type, disable_backup_medium, payload)
}

/// Encode a `Decline` (coordinator -> device) carrying the EAP identifier
/// of the rejected exchange.
pub fn encode_decline(
    buf: &mut [u8],
    device_addr: ExtendedAddress,
    media_type: MediaType,
    disable_backup_medium: bool,
    eap_identifier: u8,
) -> Result<usize, LbpError> {
    let offset = put_header(buf, CODE_DECLINE, device_addr)?;
    let end = put_media_and_payload(
        buf,
        offset,
        media_type,
        disable_backup_medium,
        &[eap_identifier],
    )?;
    Ok(end)
}

/// Encode a `KickFromDevice` (device leaves the network).
pub fn encode_kick_from_device(
    buf: &mut [u8],
    device_addr: ExtendedAddress,
) -> Result<usize, LbpError> {
    put_header(buf, CODE_KICK_FROM_DEVICE, device_addr)
}

/// Encode a `KickToDevice` (coordinator expels the device).
pub fn encode_kick_to_device(
    buf: &mut [u8],
    device_addr: ExtendedAddress,
) -> Result<usize, LbpError> {
    put_header(buf, CODE_KICK_TO_DEVICE, device_addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joining_layout() {
        let mut buf = [0u8; 64];
        let n = encode_joining(
            &mut buf,
            0x1122_3344_5566_7788,
            MediaType::Powerline,
            false,
            b"eap",
        )
        .unwrap();
        assert_eq!(n, HEADER_LEN + 1 + 3);
        assert_eq!(buf[0], CODE_JOINING);
        assert_eq!(&buf[1..9], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        assert_eq!(buf[9], 0x00);
        assert_eq!(&buf[10..13], b"eap");
    }

    #[test]
    fn test_decline_layout() {
        let mut buf = [0u8; 16];
        let n = encode_decline(&mut buf, 0x01, MediaType::Radio, true, 0x42).unwrap();
        assert_eq!(n, HEADER_LEN + 2);
        assert_eq!(buf[0], CODE_DECLINE);
        assert_eq!(buf[9], 0x03); // radio + disable backup
        assert_eq!(buf[10], 0x42);
    }

    #[test]
    fn test_kick_layout() {
        let mut buf = [0u8; 16];
        let n = encode_kick_to_device(&mut buf, 0xAABB).unwrap();
        assert_eq!(n, HEADER_LEN);
        assert_eq!(buf[0], CODE_KICK_TO_DEVICE);
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buf = [0u8; 8];
        assert_eq!(
            encode_kick_from_device(&mut buf, 0x01),
            Err(LbpError::BufferTooSmall)
        );
        let mut buf = [0u8; 10];
        assert_eq!(
            encode_joining(&mut buf, 0x01, MediaType::Powerline, false, b"xx"),
            Err(LbpError::BufferTooSmall)
        );
    }
}
