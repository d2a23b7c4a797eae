//! Wire format of the init (handshake) packet and the check-result data
//! packet.
//!
//! The data packet is fixed length: all string fields are NUL-terminated
//! inside their fixed-size slots, and everything after the terminator is
//! left as pseudo-random padding supplied by the caller.

use crate::crc32::crc32;

/// Size of the IV transmitted in the init packet.
pub const TRANSMITTED_IV_LENGTH: usize = 128;

pub const DATA_PACKET_VERSION: i16 = 3;

pub const MAX_HOST_LENGTH: usize = 64;
pub const MAX_SERVICE_LENGTH: usize = 128;
pub const DEFAULT_PAYLOAD_LENGTH: usize = 512;

const VERSION_OFFSET: usize = 0;
const CRC_OFFSET: usize = 2;
const TIMESTAMP_OFFSET: usize = 6;
const RETURN_CODE_OFFSET: usize = 10;
const HOST_OFFSET: usize = 12;
const SERVICE_OFFSET: usize = HOST_OFFSET + MAX_HOST_LENGTH;
const OUTPUT_OFFSET: usize = SERVICE_OFFSET + MAX_SERVICE_LENGTH;

/// Total length of a data packet carrying a plugin output slot of
/// `payload_length` bytes.
pub fn data_packet_length(payload_length: usize) -> usize {
    OUTPUT_OFFSET + payload_length
}

/// The server-pushed initialization message: transmitted IV followed by a
/// big-endian unix timestamp.
#[derive(Debug, Clone)]
pub struct InitPacket {
    pub iv: [u8; TRANSMITTED_IV_LENGTH],
    pub timestamp: u32,
}

impl InitPacket {
    pub const LENGTH: usize = TRANSMITTED_IV_LENGTH + 4;

    pub fn decode(buf: &[u8]) -> std::io::Result<Self> {
        if buf.len() < Self::LENGTH {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("short init packet: {} bytes", buf.len()),
            ));
        }
        let mut iv = [0u8; TRANSMITTED_IV_LENGTH];
        iv.copy_from_slice(&buf[..TRANSMITTED_IV_LENGTH]);
        let timestamp = u32::from_be_bytes(
            buf[TRANSMITTED_IV_LENGTH..Self::LENGTH]
                .try_into()
                .unwrap(),
        );
        Ok(Self { iv, timestamp })
    }

    pub fn encode(&self) -> [u8; Self::LENGTH] {
        let mut buf = [0u8; Self::LENGTH];
        buf[..TRANSMITTED_IV_LENGTH].copy_from_slice(&self.iv);
        buf[TRANSMITTED_IV_LENGTH..].copy_from_slice(&self.timestamp.to_be_bytes());
        buf
    }
}

/// A single check result to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub host: String,
    /// Empty for a host check.
    pub service: String,
    pub code: u8,
    pub output: String,
}

impl CheckResult {
    /// Serializes into `buf`, which must already be sized with
    /// [`data_packet_length`] and filled with the random pad. `timestamp`
    /// is the value echoed from the server's init packet.
    pub fn encode_into(&self, buf: &mut [u8], timestamp: u32) -> std::io::Result<()> {
        if buf.len() <= OUTPUT_OFFSET {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("data packet buffer too small: {} bytes", buf.len()),
            ));
        }

        buf[VERSION_OFFSET..VERSION_OFFSET + 2]
            .copy_from_slice(&DATA_PACKET_VERSION.to_be_bytes());
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&[0u8; 4]);
        buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&timestamp.to_be_bytes());
        buf[RETURN_CODE_OFFSET..RETURN_CODE_OFFSET + 2]
            .copy_from_slice(&(self.code as i16).to_be_bytes());

        write_str_field(
            &mut buf[HOST_OFFSET..HOST_OFFSET + MAX_HOST_LENGTH],
            &self.host,
        );
        write_str_field(
            &mut buf[SERVICE_OFFSET..SERVICE_OFFSET + MAX_SERVICE_LENGTH],
            &self.service,
        );
        write_str_field(&mut buf[OUTPUT_OFFSET..], &self.output);

        let crc = crc32(buf);
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());
        Ok(())
    }

    /// Parses a decrypted data packet, validating version and checksum.
    /// Returns the check result and the echoed timestamp.
    pub fn decode(buf: &[u8]) -> std::io::Result<(Self, u32)> {
        if buf.len() <= OUTPUT_OFFSET {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("short data packet: {} bytes", buf.len()),
            ));
        }

        let version = i16::from_be_bytes(buf[VERSION_OFFSET..VERSION_OFFSET + 2].try_into().unwrap());
        if version != DATA_PACKET_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unexpected data packet version: {version}"),
            ));
        }

        let packet_crc = u32::from_be_bytes(buf[CRC_OFFSET..CRC_OFFSET + 4].try_into().unwrap());
        let mut scratch = buf.to_vec();
        scratch[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&[0u8; 4]);
        let computed_crc = crc32(&scratch);
        if packet_crc != computed_crc {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("data packet crc mismatch: {packet_crc:#x} != {computed_crc:#x}"),
            ));
        }

        let timestamp =
            u32::from_be_bytes(buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].try_into().unwrap());
        let code =
            i16::from_be_bytes(buf[RETURN_CODE_OFFSET..RETURN_CODE_OFFSET + 2].try_into().unwrap())
                as u8;

        let host = read_str_field(&buf[HOST_OFFSET..HOST_OFFSET + MAX_HOST_LENGTH])?;
        let service = read_str_field(&buf[SERVICE_OFFSET..SERVICE_OFFSET + MAX_SERVICE_LENGTH])?;
        let output = read_str_field(&buf[OUTPUT_OFFSET..])?;

        Ok((
            Self {
                host,
                service,
                code,
                output,
            },
            timestamp,
        ))
    }
}

fn write_str_field(field: &mut [u8], value: &str) {
    // Truncate to leave room for the terminator; the rest of the field
    // keeps its random pad.
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    field[..len].copy_from_slice(&bytes[..len]);
    field[len] = 0;
}

fn read_str_field(field: &[u8]) -> std::io::Result<String> {
    let end = field.iter().position(|&b| b == 0).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "unterminated string field in data packet",
        )
    })?;
    String::from_utf8(field[..end].to_vec()).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid utf8 in data packet field: {e}"),
        )
    })
}
