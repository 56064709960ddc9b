// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tuya 3.3 framing and payload encryption.
//!
//! ```text
//! 000055AA | seq u32 | cmd u32 | len u32 | [retcode u32] payload | crc32 u32 | 0000AA55
//! ```
//!
//! All integers are big endian. `len` counts everything after the length
//! field. The CRC covers every byte before it.

use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};

use crate::error::ProtocolError;

/// Frame start marker.
pub const PREFIX: u32 = 0x0000_55AA;

/// Frame end marker.
pub const SUFFIX: u32 = 0x0000_AA55;

/// Header bytes before the payload: prefix, seq, cmd, len.
pub const HEADER_LEN: usize = 16;

/// Trailer bytes after the payload: crc, suffix.
pub const TRAILER_LEN: usize = 8;

/// Largest `len` accepted from a device.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Protocol version header put in front of encrypted `CONTROL` payloads.
pub const VERSION_HEADER: [u8; 15] = *b"3.3\0\0\0\0\0\0\0\0\0\0\0\0";

/// Tuya command codes used by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandCode {
    /// Write data points.
    Control = 0x07,
    /// Unsolicited status push.
    Status = 0x08,
    /// Keep-alive.
    HeartBeat = 0x09,
    /// Request the full point map.
    DpQuery = 0x0a,
}

impl CommandCode {
    /// Wire value.
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a wire value.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x07 => Some(Self::Control),
            0x08 => Some(Self::Status),
            0x09 => Some(Self::HeartBeat),
            0x0a => Some(Self::DpQuery),
            _ => None,
        }
    }

    /// Whether payloads of this command carry the version header.
    #[must_use]
    pub fn has_version_header(self) -> bool {
        self == Self::Control
    }
}

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number.
    pub seq: u32,
    /// Raw command code.
    pub command: u32,
    /// Return code, present on device replies.
    pub retcode: Option<u32>,
    /// Payload bytes, still encrypted.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a client request frame.
    #[must_use]
    pub fn request(seq: u32, command: CommandCode, payload: Vec<u8>) -> Self {
        Self {
            seq,
            command: command.code(),
            retcode: None,
            payload,
        }
    }

    /// Typed command code, if known.
    #[must_use]
    pub fn command_code(&self) -> Option<CommandCode> {
        CommandCode::from_code(self.command)
    }

    /// Serializes the frame.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is too large for the length field.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let body_len = self.payload.len() + self.retcode.map_or(0, |_| 4) + TRAILER_LEN;
        let len = u32::try_from(body_len)
            .map_err(|_| ProtocolError::Frame(format!("payload too large: {body_len} bytes")))?;

        let mut out = Vec::with_capacity(HEADER_LEN + body_len);
        out.extend_from_slice(&PREFIX.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.command.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        if let Some(retcode) = self.retcode {
            out.extend_from_slice(&retcode.to_be_bytes());
        }
        out.extend_from_slice(&self.payload);
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out.extend_from_slice(&SUFFIX.to_be_bytes());
        Ok(out)
    }

    /// Parses one frame from the front of `buf`.
    ///
    /// Returns `None` if `buf` does not yet hold a whole frame, otherwise the
    /// frame and the number of bytes it used.
    ///
    /// A reply's return code is recognized by its upper three bytes being
    /// zero, which neither a version header nor a JSON payload can produce.
    ///
    /// # Errors
    ///
    /// Returns error on a bad marker, an out-of-range length, or a CRC
    /// mismatch.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let prefix = read_u32(buf, 0);
        if prefix != PREFIX {
            return Err(ProtocolError::Frame(format!("bad prefix {prefix:#010x}")));
        }
        let seq = read_u32(buf, 4);
        let command = read_u32(buf, 8);
        let len = read_u32(buf, 12) as usize;
        if !(TRAILER_LEN..=MAX_FRAME_LEN).contains(&len) {
            return Err(ProtocolError::Frame(format!("bad length {len}")));
        }

        let total = HEADER_LEN + len;
        if buf.len() < total {
            return Ok(None);
        }

        let suffix = read_u32(buf, total - 4);
        if suffix != SUFFIX {
            return Err(ProtocolError::Frame(format!("bad suffix {suffix:#010x}")));
        }
        let crc = read_u32(buf, total - TRAILER_LEN);
        let expected = crc32fast::hash(&buf[..total - TRAILER_LEN]);
        if crc != expected {
            return Err(ProtocolError::Frame(format!(
                "crc mismatch: got {crc:#010x}, expected {expected:#010x}"
            )));
        }

        let mut body = &buf[HEADER_LEN..total - TRAILER_LEN];
        let mut retcode = None;
        if body.len() >= 4 && read_u32(body, 0) & 0xFFFF_FF00 == 0 {
            retcode = Some(read_u32(body, 0));
            body = &body[4..];
        }

        Ok(Some((
            Self {
                seq,
                command,
                retcode,
                payload: body.to_vec(),
            },
            total,
        )))
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// AES-128-ECB with PKCS#7 padding, keyed by the device's local key.
#[derive(Clone)]
pub struct TuyaCipher {
    key: [u8; 16],
}

impl TuyaCipher {
    /// Creates a cipher from a 16-character local key.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not exactly 16 bytes.
    pub fn new(local_key: &str) -> Result<Self, ProtocolError> {
        let key: [u8; 16] = local_key.as_bytes().try_into().map_err(|_| {
            ProtocolError::Cipher(format!(
                "local key must be 16 bytes, got {}",
                local_key.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Encrypts `plain`.
    #[must_use]
    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        ecb::Encryptor::<Aes128>::new(&self.key.into()).encrypt_padded_vec_mut::<Pkcs7>(plain)
    }

    /// Decrypts `data`.
    ///
    /// # Errors
    ///
    /// Returns error if the data is not a whole number of blocks or the
    /// padding is invalid.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        ecb::Decryptor::<Aes128>::new(&self.key.into())
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|_| ProtocolError::Cipher("cannot decrypt payload".to_string()))
    }

    /// Encrypts a request payload, adding the version header when the
    /// command needs one.
    #[must_use]
    pub fn seal(&self, command: CommandCode, plain: &[u8]) -> Vec<u8> {
        let encrypted = self.encrypt(plain);
        if command.has_version_header() {
            let mut out = Vec::with_capacity(VERSION_HEADER.len() + encrypted.len());
            out.extend_from_slice(&VERSION_HEADER);
            out.extend_from_slice(&encrypted);
            out
        } else {
            encrypted
        }
    }

    /// Recovers the plaintext of a device payload.
    ///
    /// Strips a version header if present. Plain JSON payloads, which some
    /// firmware sends for errors, pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns error if decryption fails.
    pub fn open(&self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if payload.first() == Some(&b'{') {
            return Ok(payload.to_vec());
        }
        let encrypted = if payload.starts_with(b"3.3") && payload.len() >= VERSION_HEADER.len() {
            &payload[VERSION_HEADER.len()..]
        } else {
            payload
        };
        self.decrypt(encrypted)
    }
}

impl std::fmt::Debug for TuyaCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuyaCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef";

    fn reply(seq: u32, command: CommandCode, payload: Vec<u8>) -> Frame {
        Frame {
            seq,
            command: command.code(),
            retcode: Some(0),
            payload,
        }
    }

    #[test]
    fn request_layout() {
        let bytes = Frame::request(1, CommandCode::HeartBeat, vec![0xAB; 3])
            .encode()
            .unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 3 + TRAILER_LEN);
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x55, 0xAA]);
        assert_eq!(&bytes[4..8], &1u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &9u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &11u32.to_be_bytes());
        assert_eq!(&bytes[bytes.len() - 4..], &[0x00, 0x00, 0xAA, 0x55]);
    }

    #[test]
    fn decode_reply_with_retcode() {
        let cipher = TuyaCipher::new(KEY).unwrap();
        let frame = reply(7, CommandCode::Status, cipher.seal(CommandCode::Control, b"{}"));
        let mut bytes = frame.encode().unwrap();
        bytes.extend_from_slice(&[0x00, 0x00]);

        let (decoded, used) = Frame::decode(&bytes).unwrap().unwrap();

        assert_eq!(decoded, frame);
        assert_eq!(used, bytes.len() - 2);
        assert_eq!(decoded.command_code(), Some(CommandCode::Status));
    }

    #[test]
    fn decode_partial_frame() {
        let bytes = Frame::request(1, CommandCode::DpQuery, vec![1; 32])
            .encode()
            .unwrap();

        assert_eq!(Frame::decode(&bytes[..10]).unwrap(), None);
        assert_eq!(Frame::decode(&bytes[..bytes.len() - 1]).unwrap(), None);
    }

    #[test]
    fn decode_rejects_corruption() {
        let mut bytes = Frame::request(1, CommandCode::DpQuery, vec![0x7B; 16])
            .encode()
            .unwrap();
        bytes[HEADER_LEN] ^= 0xFF;
        assert!(matches!(Frame::decode(&bytes), Err(ProtocolError::Frame(_))));

        let mut bytes = Frame::request(1, CommandCode::DpQuery, Vec::new())
            .encode()
            .unwrap();
        bytes[0] = 0x01;
        assert!(Frame::decode(&bytes).is_err());
    }

    #[test]
    fn cipher_requires_16_byte_key() {
        assert!(TuyaCipher::new("short").is_err());
        assert!(TuyaCipher::new(KEY).is_ok());
    }

    #[test]
    fn cipher_pads_to_block() {
        let cipher = TuyaCipher::new(KEY).unwrap();
        assert_eq!(cipher.encrypt(b"").len(), 16);
        assert_eq!(cipher.encrypt(&[0; 16]).len(), 32);

        let sealed = cipher.encrypt(br#"{"dps":{"1":true}}"#);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), br#"{"dps":{"1":true}}"#);
    }

    #[test]
    fn version_header_only_on_control() {
        let cipher = TuyaCipher::new(KEY).unwrap();
        let control = cipher.seal(CommandCode::Control, b"{}");
        let query = cipher.seal(CommandCode::DpQuery, b"{}");

        assert!(control.starts_with(&VERSION_HEADER));
        assert_eq!(control.len(), VERSION_HEADER.len() + query.len());
        assert_eq!(cipher.open(&control).unwrap(), b"{}");
        assert_eq!(cipher.open(&query).unwrap(), b"{}");
    }

    #[test]
    fn open_passes_plain_json() {
        let cipher = TuyaCipher::new(KEY).unwrap();
        assert_eq!(
            cipher.open(br#"{"Error":"bad"}"#).unwrap(),
            br#"{"Error":"bad"}"#
        );
        assert!(cipher.open(&[1, 2, 3]).is_err());
    }
}
