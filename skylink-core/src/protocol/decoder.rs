use serde::Deserialize;

use super::{
    error::{FrameError, FrameResult},
    frame::{self, Address64},
    *,
};

/// Default cap for a single transparent-mode line.
pub const MAX_LINE_SIZE: usize = 1024;

/// How the radio presents received data on the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Binary API frames (AP=1).
    #[default]
    Api,
    /// Raw bytes, one payload per line (AP=0).
    Transparent,
}

/// A payload pulled out of the link stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub payload: String,
    /// Address carried by the frame, if the link mode has one.
    pub address: Option<Address64>,
}

/// Incremental decoder for a byte stream read from the radio.
///
/// Bytes are pushed as they arrive; complete frames are pulled with
/// [`StreamDecoder::next_frame`]. Partial input stays buffered until the rest
/// arrives. A frame that fails validation is dropped as a unit and reported,
/// and decoding carries on with the bytes after it.
#[derive(Debug)]
pub struct StreamDecoder {
    mode: LinkMode,
    buf: Vec<u8>,
    max_line: usize,
}

impl StreamDecoder {
    pub fn new(mode: LinkMode) -> Self {
        Self {
            mode,
            buf: Vec::with_capacity(256),
            max_line: MAX_LINE_SIZE,
        }
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete item, `None` when more input is needed.
    pub fn next_frame(&mut self) -> Option<FrameResult<Decoded>> {
        match self.mode {
            LinkMode::Api => self.next_api_frame(),
            LinkMode::Transparent => self.next_line(),
        }
    }

    fn next_api_frame(&mut self) -> Option<FrameResult<Decoded>> {
        // resync: anything before the delimiter can never become a frame
        match self.buf.iter().position(|&b| b == START_DELIMITER) {
            Some(0) => {}
            Some(start) => {
                self.buf.drain(..start);
            }
            None => {
                self.buf.clear();
                return None;
            }
        }

        match frame::decode(&self.buf) {
            Ok((frame, rest)) => {
                let consumed = self.buf.len() - rest.len();
                self.buf.drain(..consumed);
                Some(Ok(Decoded {
                    payload: frame.payload,
                    address: Some(frame.address),
                }))
            }
            Err(FrameError::Incomplete { .. }) => None,
            Err(e @ (FrameError::ChecksumMismatch { .. } | FrameError::ShortFrame { .. })) => {
                // The delimiter may have been line noise, so its length field
                // can't be trusted. Skip just the delimiter and rescan.
                self.buf.drain(..1);
                Some(Err(e))
            }
            Err(e) => {
                // checksum passed, so the frame span is known
                let length = u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize;
                let span = (FRAME_OVERHEAD + length).min(self.buf.len());
                self.buf.drain(..span);
                Some(Err(e))
            }
        }
    }

    fn next_line(&mut self) -> Option<FrameResult<Decoded>> {
        loop {
            match frame::decode_line(&self.buf) {
                Ok((line, rest)) => {
                    let consumed = self.buf.len() - rest.len();
                    self.buf.drain(..consumed);
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(Ok(Decoded {
                        payload: line,
                        address: None,
                    }));
                }
                Err(FrameError::Incomplete { available, .. }) => {
                    if available > self.max_line {
                        self.buf.clear();
                        return Some(Err(FrameError::Overflow {
                            size: available,
                            max: self.max_line,
                        }));
                    }
                    return None;
                }
                Err(e) => {
                    let end = self
                        .buf
                        .iter()
                        .position(|&b| b == b'\n')
                        .map_or(self.buf.len(), |i| i + 1);
                    self.buf.drain(..end);
                    return Some(Err(e));
                }
            }
        }
    }
}
