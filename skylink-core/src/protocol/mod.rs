mod decoder;
mod error;
mod frame;

pub use decoder::{Decoded, LinkMode, StreamDecoder};
pub use error::{FrameError, FrameResult, Hex};
pub use frame::{Address64, Frame, FrameType, checksum, decode, decode_line, encode};

// frame structure : delimiter(1) + length(2) + frame_data + checksum(1)

pub const START_DELIMITER: u8 = 0x7E;
pub const LENGTH_SIZE: usize = 2;
pub const CHECKSUM_SIZE: usize = 1;
/// Bytes surrounding `frame_data` on the wire.
pub const FRAME_OVERHEAD: usize = 1 + LENGTH_SIZE + CHECKSUM_SIZE;
pub const MAX_FRAME_DATA_SIZE: usize = u16::MAX as usize;

// transmit request : type(1) + id(1) + dest64(8) + dest16(2) + radius(1) + options(1)
pub const TRANSMIT_HEADER_SIZE: usize = 14;
// receive packet : type(1) + src64(8) + src16(2) + options(1)
pub const RECEIVE_HEADER_SIZE: usize = 12;

pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_DATA_SIZE - TRANSMIT_HEADER_SIZE;
/// Largest complete frame the decoder will ever buffer.
pub const MAX_FRAME_SIZE: usize = FRAME_OVERHEAD + MAX_FRAME_DATA_SIZE;

pub const FRAME_ID: u8 = 0x01;
pub const DEST16_UNKNOWN: u16 = 0xFFFE;
pub const BROADCAST_RADIUS: u8 = 0x00;
pub const TRANSMIT_OPTIONS: u8 = 0x00;
