use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{error::FrameError, error::FrameResult, *};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    TransmitRequest = 0x10,
    ReceivePacket = 0x90,
}

impl FrameType {
    pub fn header_size(self) -> usize {
        match self {
            FrameType::TransmitRequest => TRANSMIT_HEADER_SIZE,
            FrameType::ReceivePacket => RECEIVE_HEADER_SIZE,
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(FrameType::TransmitRequest),
            0x90 => Ok(FrameType::ReceivePacket),
            _ => Err(FrameError::UnsupportedFrameType(value)),
        }
    }
}

/// 64-bit radio address, most significant byte first as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address64(pub [u8; 8]);

impl Address64 {
    pub const COORDINATOR: Address64 = Address64([0; 8]);
    pub const BROADCAST: Address64 = Address64([0, 0, 0, 0, 0, 0, 0xFF, 0xFF]);

    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_u64(self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    fn from_slice(bytes: &[u8]) -> Self {
        let mut addr = [0u8; 8];
        addr.copy_from_slice(&bytes[..8]);
        Self(addr)
    }
}

impl fmt::Display for Address64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.as_u64())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid 64-bit address {0:?}: expected 16 hex digits")]
pub struct InvalidAddress(String);

impl FromStr for Address64 {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        if digits.len() != 16 {
            return Err(InvalidAddress(s.to_owned()));
        }
        u64::from_str_radix(digits, 16)
            .map(Address64::from_u64)
            .map_err(|_| InvalidAddress(s.to_owned()))
    }
}

impl TryFrom<String> for Address64 {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address64> for String {
    fn from(addr: Address64) -> Self {
        addr.to_string()
    }
}

/// A decoded API frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    /// Present on transmit requests only.
    pub frame_id: Option<u8>,
    /// Destination for transmit requests, source for receive packets.
    pub address: Address64,
    pub payload: String,
}

impl Frame {
    /// Interpret `frame_data` (everything between the length field and the
    /// checksum) according to its frame type.
    pub fn from_frame_data(data: &[u8]) -> FrameResult<Self> {
        let Some(&type_byte) = data.first() else {
            return Err(FrameError::ShortFrame {
                length: 0,
                header: 1,
            });
        };

        let frame_type = FrameType::try_from(type_byte)?;
        let header = frame_type.header_size();
        if data.len() < header {
            return Err(FrameError::ShortFrame {
                length: data.len(),
                header,
            });
        }

        let (frame_id, address) = match frame_type {
            FrameType::TransmitRequest => (Some(data[1]), Address64::from_slice(&data[2..10])),
            FrameType::ReceivePacket => (None, Address64::from_slice(&data[1..9])),
        };

        Ok(Self {
            frame_type,
            frame_id,
            address,
            payload: utf8(&data[header..])?,
        })
    }
}

pub fn checksum(frame_data: &[u8]) -> u8 {
    let sum = frame_data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0xFF - sum
}

/// Build a transmit request frame carrying `payload` to `dest`.
pub fn encode(payload: &[u8], dest: Address64) -> FrameResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let length = TRANSMIT_HEADER_SIZE + payload.len();
    let mut bytes = Vec::with_capacity(FRAME_OVERHEAD + length);

    bytes.push(START_DELIMITER);
    bytes.extend_from_slice(&(length as u16).to_be_bytes());
    bytes.push(FrameType::TransmitRequest as u8);
    bytes.push(FRAME_ID);
    bytes.extend_from_slice(&dest.0);
    bytes.extend_from_slice(&DEST16_UNKNOWN.to_be_bytes());
    bytes.push(BROADCAST_RADIUS);
    bytes.push(TRANSMIT_OPTIONS);
    bytes.extend_from_slice(payload);

    let sum = checksum(&bytes[1 + LENGTH_SIZE..]);
    bytes.push(sum);

    Ok(bytes)
}

/// Decode the first API frame in `raw`, returning it with the unread tail.
///
/// Bytes before the first start delimiter are skipped. When the buffer ends
/// before the frame does, `FrameError::Incomplete` is returned and nothing
/// should be discarded by the caller.
pub fn decode(raw: &[u8]) -> FrameResult<(Frame, &[u8])> {
    let start = raw
        .iter()
        .position(|&b| b == START_DELIMITER)
        .ok_or(FrameError::Incomplete {
            needed: 1,
            available: 0,
        })?;
    let raw = &raw[start..];

    if raw.len() < 1 + LENGTH_SIZE {
        return Err(FrameError::Incomplete {
            needed: 1 + LENGTH_SIZE,
            available: raw.len(),
        });
    }

    let length = u16::from_be_bytes([raw[1], raw[2]]) as usize;
    let total = FRAME_OVERHEAD + length;
    if raw.len() < total {
        return Err(FrameError::Incomplete {
            needed: total,
            available: raw.len(),
        });
    }

    let frame_data = &raw[1 + LENGTH_SIZE..1 + LENGTH_SIZE + length];
    let actual = raw[total - 1];
    let expected = checksum(frame_data);
    if actual != expected {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    let frame = Frame::from_frame_data(frame_data)?;
    Ok((frame, &raw[total..]))
}

/// Decode one newline-terminated line from a transparent-mode link.
pub fn decode_line(raw: &[u8]) -> FrameResult<(String, &[u8])> {
    let Some(end) = raw.iter().position(|&b| b == b'\n') else {
        return Err(FrameError::Incomplete {
            needed: raw.len() + 1,
            available: raw.len(),
        });
    };

    let line = &raw[..end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    Ok((utf8(line)?, &raw[end + 1..]))
}

fn utf8(bytes: &[u8]) -> FrameResult<String> {
    core::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| FrameError::InvalidEncoding {
            raw: bytes.into(),
            valid_up_to: e.valid_up_to(),
        })
}
