//! Dogecoin P2P codec for message framing.
//!
//! Every message on the wire has the following layout:
//!
//! ```text
//! +----------+-------------+----------+----------+
//! |  Magic   |   Command   |  Length  | Checksum |
//! | 4 bytes  |  12 bytes   | 4 bytes  | 4 bytes  |
//! +----------+-------------+----------+----------+
//! |                   Payload                    |
//! |                (Length bytes)                |
//! +----------------------------------------------+
//! ```
//!
//! - Magic: Network identifier (mainnet/testnet)
//! - Command: ASCII name, zero padded
//! - Length: Payload length in bytes (little-endian)
//! - Checksum: First 4 bytes of SHA256(SHA256(payload))
//! - Payload: Message-specific data

use crate::{Message, NetworkError, NetworkResult, MAINNET_MAGIC, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use sha2::{Digest, Sha256};
use tokio_util::codec::{Decoder, Encoder};

/// Header size: magic (4) + command (12) + length (4) + checksum (4) = 24 bytes
pub const HEADER_SIZE: usize = 24;

/// Width of the zero-padded command field.
pub const COMMAND_SIZE: usize = 12;

/// SHA256 applied twice.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Payload checksum (first 4 bytes of double SHA256).
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = double_sha256(payload);
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&hash[0..4]);
    checksum
}

/// Read a compact-size integer (the protocol's variable length count).
pub fn read_compact_size<B: Buf>(buf: &mut B) -> NetworkResult<u64> {
    if !buf.has_remaining() {
        return Err(NetworkError::InvalidMessage(
            "Truncated compact size".to_string(),
        ));
    }
    let (value, width) = match buf.get_u8() {
        0xfd => (None, 2),
        0xfe => (None, 4),
        0xff => (None, 8),
        n => (Some(n as u64), 0),
    };
    if let Some(value) = value {
        return Ok(value);
    }
    if buf.remaining() < width {
        return Err(NetworkError::InvalidMessage(
            "Truncated compact size".to_string(),
        ));
    }
    Ok(match width {
        2 => buf.get_u16_le() as u64,
        4 => buf.get_u32_le() as u64,
        _ => buf.get_u64_le(),
    })
}

/// Write a compact-size integer.
pub fn put_compact_size<B: BufMut>(buf: &mut B, value: u64) {
    match value {
        0..=0xfc => buf.put_u8(value as u8),
        0xfd..=0xffff => {
            buf.put_u8(0xfd);
            buf.put_u16_le(value as u16);
        }
        0x1_0000..=0xffff_ffff => {
            buf.put_u8(0xfe);
            buf.put_u32_le(value as u32);
        }
        _ => {
            buf.put_u8(0xff);
            buf.put_u64_le(value);
        }
    }
}

/// Encode a command name into its fixed-width header field.
fn encode_command(command: &str) -> NetworkResult<[u8; COMMAND_SIZE]> {
    let bytes = command.as_bytes();
    if bytes.len() > COMMAND_SIZE || !command.is_ascii() {
        return Err(NetworkError::InvalidMessage(format!(
            "Bad command name '{}'",
            command
        )));
    }
    let mut field = [0u8; COMMAND_SIZE];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Decode the fixed-width command field.
fn decode_command(field: &[u8]) -> NetworkResult<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    if field[end..].iter().any(|&b| b != 0) {
        return Err(NetworkError::InvalidMessage(
            "Command has bytes after padding".to_string(),
        ));
    }
    let name = &field[..end];
    if !name.iter().all(|b| b.is_ascii_graphic()) {
        return Err(NetworkError::InvalidMessage(
            "Command is not printable ASCII".to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(name).into_owned())
}

/// Message codec for the Dogecoin P2P protocol.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    /// Network magic bytes.
    magic: [u8; 4],
    /// Maximum allowed payload size.
    max_size: usize,
}

impl MessageCodec {
    /// Create a new codec with mainnet magic.
    pub fn new() -> Self {
        Self::with_magic(MAINNET_MAGIC)
    }

    /// Create a codec with custom magic bytes.
    pub fn with_magic(magic: [u8; 4]) -> Self {
        Self {
            magic,
            max_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Override the maximum payload size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn magic(&self) -> [u8; 4] {
        self.magic
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Parse header without consuming
        let magic = &src[0..4];
        if magic != self.magic {
            return Err(NetworkError::MagicMismatch {
                expected: hex::encode(self.magic),
                got: hex::encode(magic),
            });
        }

        let command = decode_command(&src[4..16])?;
        let length = u32::from_le_bytes([src[16], src[17], src[18], src[19]]) as usize;
        let checksum_field: [u8; 4] = [src[20], src[21], src[22], src[23]];

        if length > self.max_size {
            return Err(NetworkError::MessageTooLarge {
                size: length,
                max: self.max_size,
            });
        }

        let total_size = HEADER_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(length).freeze();

        if checksum(&payload) != checksum_field {
            return Err(NetworkError::ChecksumMismatch { command });
        }

        Message::decode(&command, payload).map(Some)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = NetworkError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let command = encode_command(item.command())?;
        let payload = item.encode_payload();
        let length = payload.len();

        if length > self.max_size {
            return Err(NetworkError::MessageTooLarge {
                size: length,
                max: self.max_size,
            });
        }

        dst.reserve(HEADER_SIZE + length);
        dst.put_slice(&self.magic);
        dst.put_slice(&command);
        dst.put_u32_le(length as u32);
        dst.put_slice(&checksum(&payload));
        dst.put_slice(&payload);

        Ok(())
    }
}
